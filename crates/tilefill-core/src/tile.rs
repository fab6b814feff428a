//! Tile-grid geometry.
//!
//! A tiled device presents its pixel grid as a mosaic of fixed-size tiles.
//! Tile boundaries are anchored to the device offset: a pixel (x, y) on a
//! device with offset (ox, oy) belongs to the tile
//! `((x - ox) div 64, (y - oy) div 64)` with flooring division, so tile
//! coordinates are well defined for negative positions too.
//!
//! Two devices share a tile grid ("are aligned") when their offsets agree
//! modulo the tile size on both axes. Alignment is decided once per fill,
//! never per pixel.

use crate::rect::{Point, Rect};

/// Tile width in pixels.
pub const TILE_WIDTH: u32 = 64;
/// Tile height in pixels.
pub const TILE_HEIGHT: u32 = 64;

/// Identifier of one tile on a device's tile grid.
///
/// Coordinates are signed: devices extend in every direction from their
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    /// Tile column.
    pub tx: i32,
    /// Tile row.
    pub ty: i32,
}

impl TileId {
    /// Creates a new tile id.
    #[inline]
    pub const fn new(tx: i32, ty: i32) -> Self {
        Self { tx, ty }
    }

    /// The horizontally adjacent tile.
    #[inline]
    pub const fn offset_x(&self, d: i32) -> Self {
        Self::new(self.tx + d, self.ty)
    }

    /// The vertically adjacent tile.
    #[inline]
    pub const fn offset_y(&self, d: i32) -> Self {
        Self::new(self.tx, self.ty + d)
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile({}, {})", self.tx, self.ty)
    }
}

/// Returns the tile containing the given pixel on a grid anchored at
/// `device_offset`.
#[inline]
pub fn tile_for_pixel(device_offset: Point, p: Point) -> TileId {
    TileId::new(
        (p.x - device_offset.x).div_euclid(TILE_WIDTH as i32),
        (p.y - device_offset.y).div_euclid(TILE_HEIGHT as i32),
    )
}

/// Returns the pixel rectangle covered by a tile on a grid anchored at
/// `device_offset`.
#[inline]
pub fn tile_rect(device_offset: Point, id: TileId) -> Rect {
    Rect::new(
        device_offset.x + id.tx * TILE_WIDTH as i32,
        device_offset.y + id.ty * TILE_HEIGHT as i32,
        TILE_WIDTH,
        TILE_HEIGHT,
    )
}

/// Returns `true` if two device offsets produce the same tile grid.
#[inline]
pub fn grids_aligned(a: Point, b: Point) -> bool {
    a.x.rem_euclid(TILE_WIDTH as i32) == b.x.rem_euclid(TILE_WIDTH as i32)
        && a.y.rem_euclid(TILE_HEIGHT as i32) == b.y.rem_euclid(TILE_HEIGHT as i32)
}
