//! # tilefill-core
//!
//! Core types for tile-based raster fill operations.
//!
//! This crate provides the storage and color primitives consumed by the
//! `tilefill-engine` flood-fill engine:
//!
//! - [`Rect`], [`Point`] - signed device-space geometry
//! - [`TileId`] and the 64×64 tile-grid math
//! - [`ColorSpace`] implementations and the owned [`Color`] pixel value
//! - [`TiledDevice`] - a sparse, copy-on-write tiled raster with random
//!   accessors
//!
//! ## Design
//!
//! The device is deliberately narrow: random access by pixel with
//! tile-local pointer arithmetic, a committed-state snapshot, and nothing
//! else. Sequential iteration, compositing and undo live elsewhere. The
//! concurrency contract (distinct tiles, distinct threads) is documented in
//! [`device`] and is what makes lock-free per-tile parallel fills possible.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod color;
pub mod device;
pub mod error;
pub mod rect;
pub mod tile;

pub use color::{Color, ColorSpace, ColorSpaceRef, Gray8, GrayAlpha8, Rgba8, Rgba16, RgbaF32};
pub use color::{OPACITY_OPAQUE, OPACITY_TRANSPARENT};
pub use device::{
    DeviceSnapshot, PixelCursor, PixelCursorMut, RandomAccessor, RandomAccessorMut, TiledDevice,
};
pub use error::{CoreError, CoreResult};
pub use rect::{Point, Rect};
pub use tile::{TILE_HEIGHT, TILE_WIDTH, TileId, grids_aligned, tile_for_pixel, tile_rect};
