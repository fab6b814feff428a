//! Public fill facade and the per-mode fill entry points.
//!
//! [`ScanlineFill`] is configured once (reference device, seed, working
//! rectangle, executor) and then run in one of several modes: fill the
//! reference with a color, fill an external device, produce a selection
//! mask (hard or soft, optionally bounded), clear the connected non-zero
//! component, or split off a contiguous group into a watershed group map.
//!
//! The facade inspects the reference's pixel byte width and the tile-grid
//! alignment of every destination once, then selects a fully monomorphized
//! combination of difference policy × selection policy × tile policy ×
//! access adapter. Nothing in the per-pixel path is dynamically dispatched.

use std::sync::Arc;

use tilefill_core::{
    Color, Gray8, Point, Rect, TiledDevice, grids_aligned,
};

use crate::access::{AlignedRead, AlignedWrite, UnalignedRead, UnalignedWrite};
use crate::error::{FillError, FillResult};
use crate::executor::{JobExecutor, SerialJobExecutor};
use crate::filler::{FillSharedData, start_fill};
use crate::select::{
    ColorOrTransparentOptimizedDiff, ColorOrTransparentSlowDiff, GroupSplitSelect, HardSelect,
    NonNullDiff, OptimizedDiff, SelectionPolicy, SlowDiff, SoftSelect, UntilColorHardSelect,
    UntilColorSoftSelect,
};
use crate::tile_policy::{
    BuildTilePolicy, FillContext, GroupSplitPolicyFactory, GroupSplitTilePolicy, TilePolicyFactory,
    WriteToExternalPolicy, WriteToMaskPolicy, WriteToMaskWithBoundaryPolicy,
    WriteToReferencePolicy,
};

/// Picks the difference-policy type for the reference's pixel byte width:
/// small integer pixels get the memoized policy keyed on their raw value,
/// everything else goes through the color space every time.
macro_rules! dispatch_difference {
    ($pixel_size:expr, $D:ident => $body:expr) => {
        match $pixel_size {
            1 => {
                type $D = OptimizedDiff<u8>;
                $body
            }
            2 => {
                type $D = OptimizedDiff<u16>;
                $body
            }
            4 => {
                type $D = OptimizedDiff<u32>;
                $body
            }
            8 => {
                type $D = OptimizedDiff<u64>;
                $body
            }
            _ => {
                type $D = SlowDiff;
                $body
            }
        }
    };
}

/// Same as [`dispatch_difference`] for the color-or-transparent policies.
macro_rules! dispatch_color_or_transparent {
    ($pixel_size:expr, $D:ident => $body:expr) => {
        match $pixel_size {
            1 => {
                type $D = ColorOrTransparentOptimizedDiff<u8>;
                $body
            }
            2 => {
                type $D = ColorOrTransparentOptimizedDiff<u16>;
                $body
            }
            4 => {
                type $D = ColorOrTransparentOptimizedDiff<u32>;
                $body
            }
            8 => {
                type $D = ColorOrTransparentOptimizedDiff<u64>;
                $body
            }
            _ => {
                type $D = ColorOrTransparentSlowDiff;
                $body
            }
        }
    };
}

/// Multi-threaded tile-parallel scanline flood fill.
///
/// Every operation runs synchronously: it seeds the fill, lets the
/// executor process rounds of per-tile jobs, and returns once the executor
/// drains.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tilefill_core::{Color, Gray8, Point, Rect, TiledDevice};
/// use tilefill_engine::{ScanlineFill, ThreadedJobExecutor};
///
/// let canvas = TiledDevice::new(Arc::new(Gray8), Point::new(0, 0));
/// canvas.fill_rect(Rect::new(0, 0, 128, 128), &Color::gray(10)).unwrap();
///
/// let executor = Arc::new(ThreadedJobExecutor::new());
/// let mut fill = ScanlineFill::new(
///     canvas.clone(),
///     Point::new(5, 5),
///     Rect::new(0, 0, 128, 128),
///     executor,
/// );
/// fill.set_threshold(5);
/// fill.set_opacity_spread(100);
/// fill.fill(&Color::gray(99)).unwrap();
///
/// assert_eq!(canvas.pixel_color(Point::new(100, 100)).as_bytes(), &[99]);
/// ```
pub struct ScanlineFill {
    reference: Arc<TiledDevice>,
    seed: Point,
    working_rect: Rect,
    executor: Arc<dyn JobExecutor>,
    threshold: u8,
    opacity_spread: u8,
}

impl ScanlineFill {
    /// Creates a fill over `reference`, seeded at `seed`, writing only
    /// inside `working_rect`, scheduling jobs on `executor`.
    pub fn new(
        reference: Arc<TiledDevice>,
        seed: Point,
        working_rect: Rect,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            reference,
            seed,
            working_rect,
            executor,
            threshold: 0,
            opacity_spread: 0,
        }
    }

    /// Like [`ScanlineFill::new`] with a private single-threaded executor.
    pub fn with_serial_executor(
        reference: Arc<TiledDevice>,
        seed: Point,
        working_rect: Rect,
    ) -> Self {
        Self::new(
            reference,
            seed,
            working_rect,
            Arc::new(SerialJobExecutor::new()),
        )
    }

    /// Sets the similarity threshold, silently clamped to 0..=255.
    pub fn set_threshold(&mut self, threshold: i32) {
        self.threshold = threshold.clamp(0, 255) as u8;
    }

    /// Sets the opacity spread, silently clamped to 0..=100.
    ///
    /// Spread 100 produces hard-edged fills; lower values soften the edge
    /// (softness is `100 - spread`). Only meaningful for mask outputs.
    pub fn set_opacity_spread(&mut self, opacity_spread: i32) {
        self.opacity_spread = opacity_spread.clamp(0, 100) as u8;
    }

    fn softness(&self) -> u8 {
        100 - self.opacity_spread
    }

    fn check_seed(&self) -> FillResult<()> {
        if self.working_rect.contains_point(self.seed) {
            Ok(())
        } else {
            Err(FillError::SeedOutsideWorkingRect {
                seed: self.seed,
                rect: self.working_rect,
            })
        }
    }

    fn check_color(&self, role: &'static str, color: &Color) -> FillResult<()> {
        if color.len() == self.reference.pixel_size() {
            Ok(())
        } else {
            Err(FillError::pixel_size(
                role,
                self.reference.pixel_size(),
                color.len(),
            ))
        }
    }

    fn check_single_byte(role: &'static str, device: &TiledDevice) -> FillResult<()> {
        if device.pixel_size() == 1 {
            Ok(())
        } else {
            Err(FillError::pixel_size(role, 1, device.pixel_size()))
        }
    }

    /// Fills the connected region similar to the seed pixel with
    /// `fill_color`, writing into the reference device itself.
    pub fn fill(&self, fill_color: &Color) -> FillResult<()> {
        self.check_seed()?;
        self.check_color("fill color", fill_color)?;

        let src = self.reference.pixel_color(self.seed);
        let colorspace = self.reference.color_space().clone();
        dispatch_difference!(self.reference.pixel_size(), D => {
            let selection = HardSelect::<D>::new(colorspace, src, self.threshold);
            self.run_reference_fill(fill_color.clone(), selection)
        })
    }

    /// Fills with `fill_color` until pixels similar to `boundary_color`
    /// are reached: the region grows through everything *not* similar to
    /// the boundary color.
    pub fn fill_until_color(&self, fill_color: &Color, boundary_color: &Color) -> FillResult<()> {
        self.check_seed()?;
        self.check_color("fill color", fill_color)?;
        self.check_color("boundary color", boundary_color)?;

        let colorspace = self.reference.color_space().clone();
        dispatch_difference!(self.reference.pixel_size(), D => {
            let selection =
                UntilColorHardSelect::<D>::new(colorspace, boundary_color.clone(), self.threshold);
            self.run_reference_fill(fill_color.clone(), selection)
        })
    }

    /// Fills the region defined by the reference into `external`, leaving
    /// the reference untouched. Handles grid-aligned and misaligned
    /// external devices.
    pub fn fill_into(&self, fill_color: &Color, external: &Arc<TiledDevice>) -> FillResult<()> {
        self.check_seed()?;
        self.check_color("fill color", fill_color)?;
        if external.pixel_size() != self.reference.pixel_size() {
            return Err(FillError::pixel_size(
                "external device",
                self.reference.pixel_size(),
                external.pixel_size(),
            ));
        }

        let src = self.reference.pixel_color(self.seed);
        let colorspace = self.reference.color_space().clone();
        dispatch_difference!(self.reference.pixel_size(), D => {
            let selection = HardSelect::<D>::new(colorspace, src, self.threshold);
            self.run_external_fill(fill_color.clone(), external, selection)
        })
    }

    /// [`ScanlineFill::fill_until_color`] writing into an external device.
    pub fn fill_until_color_into(
        &self,
        fill_color: &Color,
        boundary_color: &Color,
        external: &Arc<TiledDevice>,
    ) -> FillResult<()> {
        self.check_seed()?;
        self.check_color("fill color", fill_color)?;
        self.check_color("boundary color", boundary_color)?;
        if external.pixel_size() != self.reference.pixel_size() {
            return Err(FillError::pixel_size(
                "external device",
                self.reference.pixel_size(),
                external.pixel_size(),
            ));
        }

        let colorspace = self.reference.color_space().clone();
        dispatch_difference!(self.reference.pixel_size(), D => {
            let selection =
                UntilColorHardSelect::<D>::new(colorspace, boundary_color.clone(), self.threshold);
            self.run_external_fill(fill_color.clone(), external, selection)
        })
    }

    /// Writes the selection opacity of the region into `mask` (a 1-byte
    /// device). Hard or soft depending on the opacity spread.
    pub fn fill_selection(&self, mask: &Arc<TiledDevice>) -> FillResult<()> {
        self.fill_selection_impl(mask, None)
    }

    /// [`ScanlineFill::fill_selection`] restricted to pixels whose
    /// `boundary` value is nonzero.
    pub fn fill_selection_with_boundary(
        &self,
        mask: &Arc<TiledDevice>,
        boundary: &Arc<TiledDevice>,
    ) -> FillResult<()> {
        self.fill_selection_impl(mask, Some(boundary))
    }

    fn fill_selection_impl(
        &self,
        mask: &Arc<TiledDevice>,
        boundary: Option<&Arc<TiledDevice>>,
    ) -> FillResult<()> {
        self.check_seed()?;
        Self::check_single_byte("selection mask device", mask)?;
        if let Some(boundary) = boundary {
            Self::check_single_byte("boundary selection device", boundary)?;
        }

        let src = self.reference.pixel_color(self.seed);
        let colorspace = self.reference.color_space().clone();
        let softness = self.softness();
        dispatch_difference!(self.reference.pixel_size(), D => {
            if softness == 0 {
                let selection = HardSelect::<D>::new(colorspace, src, self.threshold);
                self.run_mask_fill(mask, boundary, selection)
            } else {
                let selection = SoftSelect::<D>::new(colorspace, src, self.threshold, softness);
                self.run_mask_fill(mask, boundary, selection)
            }
        })
    }

    /// Writes opacity into `mask` for the region bounded by pixels similar
    /// to `reference_color`.
    pub fn fill_selection_until_color(
        &self,
        mask: &Arc<TiledDevice>,
        reference_color: &Color,
        boundary: Option<&Arc<TiledDevice>>,
    ) -> FillResult<()> {
        self.check_seed()?;
        self.check_color("reference color", reference_color)?;
        Self::check_single_byte("selection mask device", mask)?;
        if let Some(boundary) = boundary {
            Self::check_single_byte("boundary selection device", boundary)?;
        }

        let colorspace = self.reference.color_space().clone();
        let softness = self.softness();
        dispatch_difference!(self.reference.pixel_size(), D => {
            if softness == 0 {
                let selection = UntilColorHardSelect::<D>::new(
                    colorspace,
                    reference_color.clone(),
                    self.threshold,
                );
                self.run_mask_fill(mask, boundary, selection)
            } else {
                let selection = UntilColorSoftSelect::<D>::new(
                    colorspace,
                    reference_color.clone(),
                    self.threshold,
                    softness,
                );
                self.run_mask_fill(mask, boundary, selection)
            }
        })
    }

    /// [`ScanlineFill::fill_selection_until_color`] where a fully
    /// transparent pixel also counts as boundary.
    pub fn fill_selection_until_color_or_transparent(
        &self,
        mask: &Arc<TiledDevice>,
        reference_color: &Color,
        boundary: Option<&Arc<TiledDevice>>,
    ) -> FillResult<()> {
        self.check_seed()?;
        self.check_color("reference color", reference_color)?;
        Self::check_single_byte("selection mask device", mask)?;
        if let Some(boundary) = boundary {
            Self::check_single_byte("boundary selection device", boundary)?;
        }

        let colorspace = self.reference.color_space().clone();
        let softness = self.softness();
        dispatch_color_or_transparent!(self.reference.pixel_size(), D => {
            if softness == 0 {
                let selection = UntilColorHardSelect::<D>::new(
                    colorspace,
                    reference_color.clone(),
                    self.threshold,
                );
                self.run_mask_fill(mask, boundary, selection)
            } else {
                let selection = UntilColorSoftSelect::<D>::new(
                    colorspace,
                    reference_color.clone(),
                    self.threshold,
                    softness,
                );
                self.run_mask_fill(mask, boundary, selection)
            }
        })
    }

    /// Sets every pixel of the connected non-zero region containing the
    /// seed to all-zero. The threshold is ignored.
    pub fn clear_non_zero(&self) -> FillResult<()> {
        self.check_seed()?;

        // Threshold 0 regardless of configuration: any non-zero pixel is
        // "similar", the all-zero pixel never is.
        let zero = Color::zero(self.reference.pixel_size());
        let colorspace = self.reference.color_space().clone();
        let selection = HardSelect::<NonNullDiff>::new(colorspace, zero.clone(), 0);
        self.run_reference_fill(zero, selection)
    }

    /// Watershed initialization: selects the contiguous group of pixels
    /// whose 1-byte value is within the threshold of the seed's, clears
    /// them in the reference, and writes `group_index` into the 4-byte
    /// `group_map`.
    pub fn fill_contiguous_group(
        &self,
        group_map: &Arc<TiledDevice>,
        group_index: i32,
    ) -> FillResult<()> {
        self.check_seed()?;
        Self::check_single_byte("group split reference device", &self.reference)?;
        if group_map.pixel_size() != 4 {
            return Err(FillError::pixel_size(
                "group map device",
                4,
                group_map.pixel_size(),
            ));
        }

        let reference_value = self.reference.pixel_color(self.seed).as_bytes()[0];
        let selection = GroupSplitSelect::new(reference_value, self.threshold);

        let mask = TiledDevice::new(Arc::new(Gray8), self.reference.offset());
        let ctx = FillContext {
            reference: self.reference.clone(),
            external: Some(group_map.clone()),
            mask,
            boundary: None,
            working_rect: self.working_rect,
        };

        if grids_aligned(self.reference.offset(), group_map.offset()) {
            let factory = GroupSplitPolicyFactory::<
                GroupSplitTilePolicy<GroupSplitSelect, AlignedWrite>,
            >::new(selection, group_index);
            self.run(ctx, factory)
        } else {
            let factory = GroupSplitPolicyFactory::<
                GroupSplitTilePolicy<GroupSplitSelect, UnalignedWrite>,
            >::new(selection, group_index);
            self.run(ctx, factory)
        }
    }

    fn run_reference_fill<S: SelectionPolicy + 'static>(
        &self,
        fill_color: Color,
        selection: S,
    ) -> FillResult<()> {
        let mask = TiledDevice::new(Arc::new(Gray8), self.reference.offset());
        let ctx = FillContext {
            reference: self.reference.clone(),
            external: None,
            mask,
            boundary: None,
            working_rect: self.working_rect,
        };
        let factory =
            TilePolicyFactory::<WriteToReferencePolicy<S>>::new(fill_color, selection);
        self.run(ctx, factory)
    }

    fn run_external_fill<S: SelectionPolicy + 'static>(
        &self,
        fill_color: Color,
        external: &Arc<TiledDevice>,
        selection: S,
    ) -> FillResult<()> {
        let mask = TiledDevice::new(Arc::new(Gray8), self.reference.offset());
        let ctx = FillContext {
            reference: self.reference.clone(),
            external: Some(external.clone()),
            mask,
            boundary: None,
            working_rect: self.working_rect,
        };

        if grids_aligned(self.reference.offset(), external.offset()) {
            let factory = TilePolicyFactory::<WriteToExternalPolicy<S, AlignedWrite>>::new(
                fill_color, selection,
            );
            self.run(ctx, factory)
        } else {
            let factory = TilePolicyFactory::<WriteToExternalPolicy<S, UnalignedWrite>>::new(
                fill_color, selection,
            );
            self.run(ctx, factory)
        }
    }

    fn run_mask_fill<S: SelectionPolicy + 'static>(
        &self,
        mask: &Arc<TiledDevice>,
        boundary: Option<&Arc<TiledDevice>>,
        selection: S,
    ) -> FillResult<()> {
        let reference_offset = self.reference.offset();
        let mask_aligned = grids_aligned(reference_offset, mask.offset());
        let ctx = FillContext {
            reference: self.reference.clone(),
            external: None,
            mask: mask.clone(),
            boundary: boundary.cloned(),
            working_rect: self.working_rect,
        };

        match boundary {
            None => {
                if mask_aligned {
                    let factory = TilePolicyFactory::<WriteToMaskPolicy<S, AlignedWrite>>::new(
                        Color::zero(0),
                        selection,
                    );
                    self.run(ctx, factory)
                } else {
                    let factory = TilePolicyFactory::<WriteToMaskPolicy<S, UnalignedWrite>>::new(
                        Color::zero(0),
                        selection,
                    );
                    self.run(ctx, factory)
                }
            }
            Some(boundary) => {
                let boundary_aligned = grids_aligned(reference_offset, boundary.offset());
                match (mask_aligned, boundary_aligned) {
                    (true, true) => {
                        let factory = TilePolicyFactory::<
                            WriteToMaskWithBoundaryPolicy<S, AlignedWrite, AlignedRead>,
                        >::new(Color::zero(0), selection);
                        self.run(ctx, factory)
                    }
                    (true, false) => {
                        let factory = TilePolicyFactory::<
                            WriteToMaskWithBoundaryPolicy<S, AlignedWrite, UnalignedRead>,
                        >::new(Color::zero(0), selection);
                        self.run(ctx, factory)
                    }
                    (false, true) => {
                        let factory = TilePolicyFactory::<
                            WriteToMaskWithBoundaryPolicy<S, UnalignedWrite, AlignedRead>,
                        >::new(Color::zero(0), selection);
                        self.run(ctx, factory)
                    }
                    (false, false) => {
                        let factory = TilePolicyFactory::<
                            WriteToMaskWithBoundaryPolicy<S, UnalignedWrite, UnalignedRead>,
                        >::new(Color::zero(0), selection);
                        self.run(ctx, factory)
                    }
                }
            }
        }
    }

    fn run<F: BuildTilePolicy>(&self, ctx: FillContext, factory: F) -> FillResult<()> {
        let shared = Arc::new(FillSharedData {
            ctx,
            factory,
            executor: self.executor.clone(),
        });
        start_fill(shared, self.seed);
        self.executor.drain();
        Ok(())
    }
}
