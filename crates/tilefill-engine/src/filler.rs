//! Per-tile scanline kernel and the round-based fill driver.
//!
//! The fill is organized in *rounds*. Every round runs one concurrent job
//! per tile that currently has pending spans; each job executes the
//! four-connected scanline fill strictly inside its tile and collects the
//! spans that crossed a tile edge, addressed to the neighbor. A sequential
//! coordinator job then merges those per-job propagation maps by tile and
//! enqueues the next round; an empty merge ends the fill.
//!
//! Termination: the mask memo lets every pixel transition 0 → nonzero at
//! most once, and a round either sets at least one fresh mask pixel or
//! propagates nothing, so the number of rounds is bounded by the tile
//! diameter of the reached region.
//!
//! Within one round no two jobs ever touch the same tile, which is the
//! entire synchronization story: pixel data needs no locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tilefill_core::{Point, TileId, tile_for_pixel};
use tracing::{debug, trace};

use crate::executor::{Job, JobExecutor};
use crate::tile_policy::{BuildTilePolicy, FillContext, TilePolicy};

/// A run of horizontally adjacent pixels scheduled for processing.
///
/// `x1..=x2` are inclusive column bounds on row `y`; `dy` is the vertical
/// direction this span was propagated from, used to alternate the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub x1: i32,
    pub x2: i32,
    pub y: i32,
    pub dy: i32,
}

/// Spans produced during one round, grouped by destination tile.
pub(crate) type PropagationInfo = HashMap<TileId, Vec<Span>>;

type ResultSlot = Arc<Mutex<PropagationInfo>>;

/// Everything a tile job needs, shared across the whole fill invocation.
pub(crate) struct FillSharedData<F: BuildTilePolicy> {
    pub ctx: FillContext,
    pub factory: F,
    pub executor: Arc<dyn JobExecutor>,
}

/// Runs the tile-local scanline fill for one packet of seed spans.
///
/// Returns the spans that left the tile, keyed by the neighbor they enter.
pub(crate) fn process_tile<P: TilePolicy>(
    ctx: &FillContext,
    policy: &mut P,
    tile_id: TileId,
    seed_spans: &[Span],
) -> PropagationInfo {
    let mut propagation = PropagationInfo::new();

    policy.begin_processing(ctx, tile_id);

    let working_rect = ctx.working_rect;
    let sub = policy.tile_sub_rect();
    let mut spans: Vec<Span> = seed_spans.to_vec();

    while let Some(span) = spans.pop() {
        debug_assert!(span.x1 >= sub.left() && span.x1 < sub.right());
        debug_assert!(span.x2 >= sub.left() && span.x2 < sub.right());
        debug_assert!(span.y >= sub.top() && span.y < sub.bottom());

        policy.set_working_row(span.y);

        let mut x1 = span.x1;
        let mut x2 = span.x1;

        // Expand to the left if possible. This finds the left extreme of
        // the first subspan, filling on the way.
        if !policy.is_already_set(span.x1) && policy.is_inside_boundary(span.x1) {
            let mut opacity = policy.calculate_opacity(span.x1);
            if opacity > 0 {
                x2 += 1;
                policy.set_value(span.x1, opacity);
                loop {
                    let x = x1 - 1;
                    if x < working_rect.left() {
                        break;
                    }
                    if x < sub.left() {
                        propagation
                            .entry(tile_id.offset_x(-1))
                            .or_default()
                            .push(Span {
                                x1: x,
                                x2: x,
                                y: span.y,
                                dy: 1,
                            });
                        break;
                    }
                    if policy.is_already_set(x) || !policy.is_inside_boundary(x) {
                        break;
                    }
                    opacity = policy.calculate_opacity(x);
                    if opacity == 0 {
                        break;
                    }
                    policy.set_value(x, opacity);
                    x1 -= 1;
                }
            }
        }

        // Sweep to the right, finding the fillable subspans and
        // propagating each to the rows above and below.
        loop {
            // Find the right extreme of the current subspan, filling on
            // the way.
            loop {
                if x2 >= working_rect.right() {
                    break;
                }
                if x2 >= sub.right() {
                    propagation
                        .entry(tile_id.offset_x(1))
                        .or_default()
                        .push(Span {
                            x1: x2,
                            x2,
                            y: span.y,
                            dy: 1,
                        });
                    break;
                }
                if policy.is_already_set(x2) || !policy.is_inside_boundary(x2) {
                    break;
                }
                let opacity = policy.calculate_opacity(x2);
                if opacity == 0 {
                    break;
                }
                policy.set_value(x2, opacity);
                x2 += 1;
            }

            // Propagate the subspan vertically. Spans leaving the tile are
            // re-examined by the neighbor starting from their own row, so
            // their dy is normalized.
            if x2 > x1 {
                for (y_next, local_dy) in [(span.y - span.dy, -span.dy), (span.y + span.dy, span.dy)]
                {
                    if y_next < working_rect.top() || y_next >= working_rect.bottom() {
                        continue;
                    }
                    if y_next < sub.top() {
                        propagation
                            .entry(tile_id.offset_y(-1))
                            .or_default()
                            .push(Span {
                                x1,
                                x2: x2 - 1,
                                y: y_next,
                                dy: 1,
                            });
                    } else if y_next >= sub.bottom() {
                        propagation
                            .entry(tile_id.offset_y(1))
                            .or_default()
                            .push(Span {
                                x1,
                                x2: x2 - 1,
                                y: y_next,
                                dy: -1,
                            });
                    } else {
                        spans.push(Span {
                            x1,
                            x2: x2 - 1,
                            y: y_next,
                            dy: local_dy,
                        });
                    }
                }
            }

            x2 += 1;
            // Skip pixels known to be non-selectable.
            while x2 <= span.x2 {
                if !policy.is_already_set(x2) || !policy.is_inside_boundary(x2) {
                    break;
                }
                if policy.calculate_opacity(x2) > 0 {
                    break;
                }
                x2 += 1;
            }
            x1 = x2;
            if x2 > span.x2 {
                break;
            }
        }
    }

    policy.end_processing();

    propagation
}

/// Seeds the fill and enqueues the first coordinator step. The caller is
/// expected to drain the executor afterwards.
pub(crate) fn start_fill<F: BuildTilePolicy>(shared: Arc<FillSharedData<F>>, seed: Point) {
    let seed_tile = tile_for_pixel(shared.ctx.reference.offset(), seed);
    debug!(
        %seed_tile,
        working_rect = %shared.ctx.working_rect,
        "starting scanline fill"
    );

    let mut initial = PropagationInfo::new();
    initial.insert(
        seed_tile,
        vec![Span {
            x1: seed.x,
            x2: seed.x,
            y: seed.y,
            dy: 1,
        }],
    );

    let executor = shared.executor.clone();
    executor.add_job(coordinator_job(shared, vec![Arc::new(Mutex::new(initial))]));
}

/// The sequential step closing one round: merges the per-job propagation
/// maps and, if anything is left, enqueues the next round's tile jobs plus
/// the next coordinator. Re-submission instead of iteration keeps the
/// executor free to interleave unrelated work between rounds.
fn coordinator_job<F: BuildTilePolicy>(
    shared: Arc<FillSharedData<F>>,
    results: Vec<ResultSlot>,
) -> Job {
    Job::sequential(move || {
        let mut merged = PropagationInfo::new();
        for slot in results {
            let info = std::mem::take(&mut *slot.lock().unwrap());
            for (tile_id, spans) in info {
                merged.entry(tile_id).or_default().extend(spans);
            }
        }

        if merged.is_empty() {
            trace!("fill complete, no pending spans");
            return;
        }
        trace!(tiles = merged.len(), "enqueueing fill round");

        let mut jobs = Vec::with_capacity(merged.len() + 1);
        let mut slots = Vec::with_capacity(merged.len());
        for (tile_id, spans) in merged {
            let slot: ResultSlot = Arc::default();
            slots.push(slot.clone());
            let shared = shared.clone();
            jobs.push(Job::concurrent(move || {
                let mut policy = shared.factory.build();
                let result = process_tile(&shared.ctx, &mut policy, tile_id, &spans);
                *slot.lock().unwrap() = result;
            }));
        }
        jobs.push(coordinator_job(shared.clone(), slots));
        shared.executor.add_jobs(jobs);
    })
}
