//! Tile-local access adapters over device random accessors.
//!
//! The kernel addresses pixels by coordinates relative to the reference
//! tile it is processing. These adapters translate that relative addressing
//! into pointer arithmetic against a destination device, in two flavors:
//!
//! - [`AlignedAccess`]: the destination tile grid coincides with the
//!   reference grid, so the whole reference tile maps onto exactly one
//!   destination tile. One accessor, one cached base pointer.
//! - [`UnalignedAccess`]: the destination grid is shifted, so the reference
//!   tile rectangle overlaps up to four destination tiles (a 2×2
//!   quadrant). Four accessors pin the quadrant corners; each access checks
//!   whether the relative row/column crossed a quadrant edge and retargets
//!   the cached base pointer. The checks branch predictably, so the
//!   accept/reject test in the scanline loop stays hot.
//!
//! Both adapters are bound to exactly one tile rectangle for their
//! lifetime; the kernel never addresses outside it.

use std::sync::Arc;

use tilefill_core::{PixelCursor, PixelCursorMut, RandomAccessor, RandomAccessorMut, Rect, TiledDevice};

/// Opens a positioned cursor on a device. Lets the adapters be generic
/// over read-only vs copy-on-write-reserving access.
pub(crate) trait DeviceCursor: PixelCursor {
    /// Creates a cursor positioned at the device offset.
    fn open(device: Arc<TiledDevice>) -> Self;
}

impl DeviceCursor for RandomAccessor {
    fn open(device: Arc<TiledDevice>) -> Self {
        RandomAccessor::new(device)
    }
}

impl DeviceCursor for RandomAccessorMut {
    fn open(device: Arc<TiledDevice>) -> Self {
        RandomAccessorMut::new(device)
    }
}

/// Relative row/column access into one bound tile rectangle.
pub(crate) trait TileAccess: Sized {
    /// Binds the adapter to the destination region matching `tile_rect`.
    fn bind(device: Arc<TiledDevice>, tile_rect: Rect) -> Self;

    /// Selects the working row (relative to the tile top).
    fn set_row(&mut self, rel_row: i32);

    /// The pixel at `rel_col` in the working row.
    fn pixel(&mut self, rel_col: i32) -> &[u8];
}

/// [`TileAccess`] over a writable destination.
pub(crate) trait TileAccessMut: TileAccess {
    /// Overwrites the pixel at `rel_col` in the working row.
    fn write_pixel(&mut self, rel_col: i32, value: &[u8]);
}

/// Adapter for a destination whose tile grid matches the reference grid.
pub(crate) struct AlignedAccess<C: DeviceCursor> {
    // Keeps the tile reserved; pointers below point into it.
    _cursor: C,
    base: *mut u8,
    row: *mut u8,
    pixel_size: usize,
    row_stride: usize,
}

impl<C: DeviceCursor> TileAccess for AlignedAccess<C> {
    fn bind(device: Arc<TiledDevice>, tile_rect: Rect) -> Self {
        let mut cursor = C::open(device);
        cursor.move_to(tile_rect.x, tile_rect.y);
        debug_assert_eq!(cursor.num_contiguous_columns(), tile_rect.width);
        debug_assert_eq!(cursor.num_contiguous_rows(), tile_rect.height);
        let base = cursor.raw_data() as *mut u8;
        Self {
            pixel_size: cursor.pixel_size(),
            row_stride: cursor.row_stride(),
            _cursor: cursor,
            base,
            row: base,
        }
    }

    #[inline]
    fn set_row(&mut self, rel_row: i32) {
        debug_assert!(rel_row >= 0);
        self.row = unsafe { self.base.add(rel_row as usize * self.row_stride) };
    }

    #[inline]
    fn pixel(&mut self, rel_col: i32) -> &[u8] {
        debug_assert!(rel_col >= 0);
        unsafe {
            std::slice::from_raw_parts(
                self.row.add(rel_col as usize * self.pixel_size),
                self.pixel_size,
            )
        }
    }
}

impl<C: DeviceCursor + PixelCursorMut> TileAccessMut for AlignedAccess<C> {
    #[inline]
    fn write_pixel(&mut self, rel_col: i32, value: &[u8]) {
        debug_assert!(rel_col >= 0);
        debug_assert_eq!(value.len(), self.pixel_size);
        unsafe {
            std::ptr::copy_nonoverlapping(
                value.as_ptr(),
                self.row.add(rel_col as usize * self.pixel_size),
                self.pixel_size,
            );
        }
    }
}

/// Adapter for a destination whose tile grid is shifted against the
/// reference grid.
pub(crate) struct UnalignedAccess<C: DeviceCursor> {
    // One cursor per quadrant: [top-left, top-right, bottom-left,
    // bottom-right]. They keep the four tiles reserved.
    _cursors: [C; 4],
    quadrants: [*mut u8; 4],
    num_contiguous_columns: i32,
    num_contiguous_rows: i32,
    pixel_size: usize,
    row_stride: usize,
    column_offset: i32,
    row_offset: i32,
    current_rel_row_offset: i32,
    base: *mut u8,
    row: *mut u8,
}

impl<C: DeviceCursor> UnalignedAccess<C> {
    #[inline]
    fn adjust_column(&mut self, rel_col: i32) {
        if rel_col >= self.num_contiguous_columns {
            if self.column_offset == 0 {
                self.column_offset = self.num_contiguous_columns;
                self.base = self.quadrants[((self.row_offset > 0) as usize) * 2 + 1];
                self.row = unsafe {
                    self.base
                        .add(self.current_rel_row_offset as usize * self.row_stride)
                };
            }
        } else if self.column_offset > 0 {
            self.column_offset = 0;
            self.base = self.quadrants[((self.row_offset > 0) as usize) * 2];
            self.row = unsafe {
                self.base
                    .add(self.current_rel_row_offset as usize * self.row_stride)
            };
        }
    }

    #[inline]
    fn adjust_row(&mut self, rel_row: i32) {
        if rel_row >= self.num_contiguous_rows {
            if self.row_offset == 0 {
                self.row_offset = self.num_contiguous_rows;
                self.base = self.quadrants[2 + (self.column_offset > 0) as usize];
            }
            self.current_rel_row_offset = rel_row - self.row_offset;
        } else {
            if self.row_offset > 0 {
                self.row_offset = 0;
                self.base = self.quadrants[(self.column_offset > 0) as usize];
            }
            self.current_rel_row_offset = rel_row;
        }
        self.row = unsafe {
            self.base
                .add(self.current_rel_row_offset as usize * self.row_stride)
        };
    }

    #[inline]
    fn pixel_ptr(&mut self, rel_col: i32) -> *mut u8 {
        self.adjust_column(rel_col);
        unsafe {
            self.row
                .add((rel_col - self.column_offset) as usize * self.pixel_size)
        }
    }
}

impl<C: DeviceCursor> TileAccess for UnalignedAccess<C> {
    fn bind(device: Arc<TiledDevice>, tile_rect: Rect) -> Self {
        let mut cursors = [
            C::open(device.clone()),
            C::open(device.clone()),
            C::open(device.clone()),
            C::open(device),
        ];

        cursors[0].move_to(tile_rect.x, tile_rect.y);
        let num_contiguous_columns = cursors[0].num_contiguous_columns() as i32;
        let num_contiguous_rows = cursors[0].num_contiguous_rows() as i32;
        let pixel_size = cursors[0].pixel_size();
        let row_stride = cursors[0].row_stride();

        cursors[1].move_to(tile_rect.x + num_contiguous_columns, tile_rect.y);
        cursors[2].move_to(tile_rect.x, tile_rect.y + num_contiguous_rows);
        cursors[3].move_to(
            tile_rect.x + num_contiguous_columns,
            tile_rect.y + num_contiguous_rows,
        );

        let quadrants = [
            cursors[0].raw_data() as *mut u8,
            cursors[1].raw_data() as *mut u8,
            cursors[2].raw_data() as *mut u8,
            cursors[3].raw_data() as *mut u8,
        ];

        Self {
            _cursors: cursors,
            quadrants,
            num_contiguous_columns,
            num_contiguous_rows,
            pixel_size,
            row_stride,
            column_offset: 0,
            row_offset: 0,
            current_rel_row_offset: 0,
            base: quadrants[0],
            row: quadrants[0],
        }
    }

    #[inline]
    fn set_row(&mut self, rel_row: i32) {
        debug_assert!(rel_row >= 0);
        self.adjust_row(rel_row);
    }

    #[inline]
    fn pixel(&mut self, rel_col: i32) -> &[u8] {
        debug_assert!(rel_col >= 0);
        let ptr = self.pixel_ptr(rel_col);
        unsafe { std::slice::from_raw_parts(ptr, self.pixel_size) }
    }
}

impl<C: DeviceCursor + PixelCursorMut> TileAccessMut for UnalignedAccess<C> {
    #[inline]
    fn write_pixel(&mut self, rel_col: i32, value: &[u8]) {
        debug_assert!(rel_col >= 0);
        debug_assert_eq!(value.len(), self.pixel_size);
        let ptr = self.pixel_ptr(rel_col);
        unsafe {
            std::ptr::copy_nonoverlapping(value.as_ptr(), ptr, self.pixel_size);
        }
    }
}

/// Aligned read-only adapter.
pub(crate) type AlignedRead = AlignedAccess<RandomAccessor>;
/// Aligned writable adapter.
pub(crate) type AlignedWrite = AlignedAccess<RandomAccessorMut>;
/// Unaligned read-only adapter.
pub(crate) type UnalignedRead = UnalignedAccess<RandomAccessor>;
/// Unaligned writable adapter.
pub(crate) type UnalignedWrite = UnalignedAccess<RandomAccessorMut>;
