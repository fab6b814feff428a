//! # tilefill-engine
//!
//! Multi-threaded, tile-parallel scanline flood fill for tiled rasters.
//!
//! Given a seed pixel in a reference [`tilefill_core::TiledDevice`], a
//! similarity criterion and optional boundary constraints, the engine
//! computes the 4-connected region of pixels similar enough to the seed
//! and writes the result as a solid color fill, a (hard or soft) selection
//! mask, or a watershed group id.
//!
//! # Architecture
//!
//! ```text
//! ScanlineFill (facade)
//!     │  picks difference × selection × tile policy × access adapter
//!     │  from pixel width, mode and grid alignment (all monomorphized)
//!     ▼
//! round driver ──► per-tile concurrent jobs ──► scanline kernel
//!     ▲                                              │
//!     └── sequential coordinator ◄── propagated spans┘
//! ```
//!
//! Work is partitioned by tile: within one round no two jobs touch the
//! same tile, so pixel data needs no locking. A mask device memoizes
//! filled pixels, which both prevents rework and bounds the number of
//! rounds.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tilefill_core::{Color, Gray8, Point, Rect, TiledDevice};
//! use tilefill_engine::{ScanlineFill, ThreadedJobExecutor};
//!
//! let canvas = TiledDevice::new(Arc::new(Gray8), Point::new(0, 0));
//! canvas.fill_rect(Rect::new(0, 0, 256, 256), &Color::gray(7)).unwrap();
//!
//! let mut fill = ScanlineFill::new(
//!     canvas.clone(),
//!     Point::new(128, 128),
//!     Rect::new(0, 0, 256, 256),
//!     Arc::new(ThreadedJobExecutor::new()),
//! );
//! fill.set_opacity_spread(100);
//! fill.fill(&Color::gray(200)).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod access;
mod error;
mod executor;
mod fill;
mod filler;
mod select;
mod tile_policy;

pub use error::{FillError, FillResult};
pub use executor::{Job, JobExecutor, JobKind, SerialJobExecutor, ThreadedJobExecutor};
pub use fill::ScanlineFill;
