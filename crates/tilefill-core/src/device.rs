//! The tiled raster device and its random accessors.
//!
//! A [`TiledDevice`] presents a conceptually unbounded pixel grid as a
//! sparse mosaic of 64×64 tiles. Tiles materialize on first write; absent
//! tiles read as the device's default pixel. Pixel bytes sit contiguously
//! row-major inside each tile, so within one tile a pixel address is plain
//! pointer arithmetic from the tile base.
//!
//! # Copy-on-write
//!
//! [`TiledDevice::snapshot`] captures the committed state of the device by
//! cloning the tile table and marking every tile shared. The next mutable
//! acquisition of a shared tile duplicates its bytes first, so a snapshot
//! never observes later writes. Read-only accessors always see the current
//! committed tiles and never materialize anything.
//!
//! # Concurrency contract
//!
//! The tile table itself is protected by a lock, but pixel bytes are not:
//! distinct tiles may be written from distinct threads concurrently, while
//! concurrent mutable access to a single tile must be excluded by the
//! caller. The fill engine guarantees this by partitioning each round of
//! work by tile.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::color::{Color, ColorSpaceRef};
use crate::error::{CoreError, CoreResult};
use crate::rect::{Point, Rect};
use crate::tile::{TILE_HEIGHT, TILE_WIDTH, TileId, tile_for_pixel};

const TILE_AREA: usize = (TILE_WIDTH * TILE_HEIGHT) as usize;

/// One tile's pixel bytes.
///
/// `shared` is raised when a snapshot starts referencing the buffer; the
/// next mutable reservation then duplicates the bytes instead of writing
/// through.
struct TileBuf {
    data: UnsafeCell<Box<[u8]>>,
    shared: AtomicBool,
}

// Pixel bytes are handed out as raw pointers; exclusion of concurrent
// writers to one tile is the caller's obligation (see module docs).
unsafe impl Send for TileBuf {}
unsafe impl Sync for TileBuf {}

impl TileBuf {
    fn filled(pixel: &[u8]) -> Arc<Self> {
        let mut data = vec![0u8; TILE_AREA * pixel.len()];
        if !pixel.iter().all(|&b| b == 0) {
            for chunk in data.chunks_exact_mut(pixel.len()) {
                chunk.copy_from_slice(pixel);
            }
        }
        Arc::new(Self {
            data: UnsafeCell::new(data.into_boxed_slice()),
            shared: AtomicBool::new(false),
        })
    }

    fn duplicate(&self) -> Arc<Self> {
        let bytes = unsafe { (*self.data.get()).clone() };
        Arc::new(Self {
            data: UnsafeCell::new(bytes),
            shared: AtomicBool::new(false),
        })
    }

    #[inline]
    fn as_mut_ptr(&self) -> *mut u8 {
        unsafe { (*self.data.get()).as_mut_ptr() }
    }

    #[inline]
    fn as_ptr(&self) -> *const u8 {
        self.as_mut_ptr()
    }
}

/// A tiled raster device with copy-on-write tiles.
pub struct TiledDevice {
    colorspace: ColorSpaceRef,
    offset: Point,
    default_pixel: Box<[u8]>,
    default_tile: Arc<TileBuf>,
    tiles: RwLock<HashMap<TileId, Arc<TileBuf>>>,
}

impl std::fmt::Debug for TiledDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledDevice")
            .field("colorspace", &self.colorspace.name())
            .field("offset", &self.offset)
            .field("tiles", &self.tiles.read().unwrap().len())
            .finish()
    }
}

impl TiledDevice {
    /// Creates an empty device whose default pixel is all-zero.
    pub fn new(colorspace: ColorSpaceRef, offset: Point) -> Arc<Self> {
        let default_pixel = vec![0u8; colorspace.pixel_size()].into_boxed_slice();
        let default_tile = TileBuf::filled(&default_pixel);
        Arc::new(Self {
            colorspace,
            offset,
            default_pixel,
            default_tile,
            tiles: RwLock::new(HashMap::new()),
        })
    }

    /// Creates an empty device with a custom default pixel.
    pub fn with_default_pixel(
        colorspace: ColorSpaceRef,
        offset: Point,
        default: &Color,
    ) -> CoreResult<Arc<Self>> {
        if default.len() != colorspace.pixel_size() {
            return Err(CoreError::pixel_size_mismatch(
                colorspace.pixel_size(),
                default.len(),
            ));
        }
        let default_pixel: Box<[u8]> = default.as_bytes().into();
        let default_tile = TileBuf::filled(&default_pixel);
        Ok(Arc::new(Self {
            colorspace,
            offset,
            default_pixel,
            default_tile,
            tiles: RwLock::new(HashMap::new()),
        }))
    }

    /// The device's color space.
    #[inline]
    pub fn color_space(&self) -> &ColorSpaceRef {
        &self.colorspace
    }

    /// Pixel width in bytes.
    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.colorspace.pixel_size()
    }

    /// The device's global offset; tile boundaries are anchored to it.
    #[inline]
    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Number of materialized tiles. Diagnostic only.
    pub fn tile_count(&self) -> usize {
        self.tiles.read().unwrap().len()
    }

    /// The committed buffer for a tile; the shared default tile if absent.
    fn committed_tile(&self, id: TileId) -> Arc<TileBuf> {
        self.tiles
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.default_tile.clone())
    }

    /// Reserves a tile for writing, materializing it and breaking snapshot
    /// sharing if needed.
    fn reserve_tile(&self, id: TileId) -> Arc<TileBuf> {
        let mut tiles = self.tiles.write().unwrap();
        let slot = tiles
            .entry(id)
            .or_insert_with(|| TileBuf::filled(&self.default_pixel));
        if slot.shared.load(Ordering::Acquire) {
            *slot = slot.duplicate();
        }
        slot.clone()
    }

    /// Captures the committed state of the device.
    ///
    /// The snapshot shares tile buffers with the device until a writer
    /// reserves one of them, at which point the writer gets a private copy.
    pub fn snapshot(&self) -> DeviceSnapshot {
        let tiles = self.tiles.read().unwrap();
        for tile in tiles.values() {
            tile.shared.store(true, Ordering::Release);
        }
        DeviceSnapshot {
            tiles: tiles.clone(),
            default_tile: self.default_tile.clone(),
            pixel_size: self.pixel_size(),
            offset: self.offset,
        }
    }

    /// Reads one pixel as an owned [`Color`].
    pub fn pixel_color(&self, p: Point) -> Color {
        let ps = self.pixel_size();
        let tile = self.committed_tile(tile_for_pixel(self.offset, p));
        let off = in_tile_offset(self.offset, p, ps);
        let bytes = unsafe { std::slice::from_raw_parts(tile.as_ptr().add(off), ps) };
        Color::from_bytes(bytes)
    }

    /// Writes one pixel.
    pub fn set_pixel_color(&self, p: Point, color: &Color) -> CoreResult<()> {
        let ps = self.pixel_size();
        if color.len() != ps {
            return Err(CoreError::pixel_size_mismatch(ps, color.len()));
        }
        let tile = self.reserve_tile(tile_for_pixel(self.offset, p));
        let off = in_tile_offset(self.offset, p, ps);
        unsafe {
            std::ptr::copy_nonoverlapping(color.as_bytes().as_ptr(), tile.as_mut_ptr().add(off), ps)
        };
        Ok(())
    }

    /// Fills a rectangle with one color. Test and setup helper; not a fast
    /// path.
    pub fn fill_rect(&self, rect: Rect, color: &Color) -> CoreResult<()> {
        let ps = self.pixel_size();
        if color.len() != ps {
            return Err(CoreError::pixel_size_mismatch(ps, color.len()));
        }
        let mut cursor = DetachedCursor::new(self);
        for y in rect.top()..rect.bottom() {
            let mut x = rect.left();
            while x < rect.right() {
                cursor.move_to(x, y);
                let run = (cursor.num_contiguous_columns() as i32).min(rect.right() - x);
                let mut ptr = cursor.raw_data_mut();
                for _ in 0..run {
                    unsafe {
                        std::ptr::copy_nonoverlapping(color.as_bytes().as_ptr(), ptr, ps);
                        ptr = ptr.add(ps);
                    }
                }
                x += run;
            }
        }
        Ok(())
    }
}

#[inline]
fn in_tile_coords(offset: Point, p: Point) -> (usize, usize) {
    (
        (p.x - offset.x).rem_euclid(TILE_WIDTH as i32) as usize,
        (p.y - offset.y).rem_euclid(TILE_HEIGHT as i32) as usize,
    )
}

#[inline]
fn in_tile_offset(offset: Point, p: Point, pixel_size: usize) -> usize {
    let (ix, iy) = in_tile_coords(offset, p);
    (iy * TILE_WIDTH as usize + ix) * pixel_size
}

/// A read-only view of a device's committed tiles, taken by
/// [`TiledDevice::snapshot`].
pub struct DeviceSnapshot {
    tiles: HashMap<TileId, Arc<TileBuf>>,
    default_tile: Arc<TileBuf>,
    pixel_size: usize,
    offset: Point,
}

impl DeviceSnapshot {
    /// Reads one pixel from the snapshot.
    pub fn pixel_color(&self, p: Point) -> Color {
        let tile = self
            .tiles
            .get(&tile_for_pixel(self.offset, p))
            .unwrap_or(&self.default_tile);
        let off = in_tile_offset(self.offset, p, self.pixel_size);
        let bytes =
            unsafe { std::slice::from_raw_parts(tile.as_ptr().add(off), self.pixel_size) };
        Color::from_bytes(bytes)
    }
}

/// Positioned read access into a device's tiles.
///
/// After [`PixelCursor::move_to`] the cursor exposes a raw pointer to the
/// pixel, the row stride valid inside the current tile, and the distance to
/// the nearest tile edge. Pointers stay valid while the cursor holds the
/// tile, i.e. until the next `move_to` that changes tiles or the cursor is
/// dropped.
pub trait PixelCursor {
    /// Repositions the cursor onto the given pixel.
    fn move_to(&mut self, x: i32, y: i32);
    /// Pointer to the current pixel's bytes.
    fn raw_data(&self) -> *const u8;
    /// Byte distance between vertically adjacent pixels of the current
    /// tile.
    fn row_stride(&self) -> usize;
    /// Pixel width in bytes.
    fn pixel_size(&self) -> usize;
    /// Columns from the current position to the tile's right edge.
    fn num_contiguous_columns(&self) -> u32;
    /// Rows from the current position to the tile's bottom edge.
    fn num_contiguous_rows(&self) -> u32;
}

/// Positioned write access; reserves copy-on-write tiles as it moves.
pub trait PixelCursorMut: PixelCursor {
    /// Mutable pointer to the current pixel's bytes.
    fn raw_data_mut(&mut self) -> *mut u8;
}

/// Read-only random accessor over the committed state of a device.
///
/// Never materializes tiles: absent tiles resolve to the shared default
/// tile, which must not be written (and cannot be, through this type).
pub struct RandomAccessor {
    device: Arc<TiledDevice>,
    tile: Arc<TileBuf>,
    tile_id: TileId,
    in_tile_x: usize,
    in_tile_y: usize,
}

impl RandomAccessor {
    /// Creates an accessor positioned at the device offset.
    pub fn new(device: Arc<TiledDevice>) -> Self {
        let origin = device.offset();
        let tile_id = tile_for_pixel(origin, origin);
        let tile = device.committed_tile(tile_id);
        Self {
            device,
            tile,
            tile_id,
            in_tile_x: 0,
            in_tile_y: 0,
        }
    }
}

impl PixelCursor for RandomAccessor {
    fn move_to(&mut self, x: i32, y: i32) {
        let p = Point::new(x, y);
        let id = tile_for_pixel(self.device.offset(), p);
        if id != self.tile_id {
            self.tile = self.device.committed_tile(id);
            self.tile_id = id;
        }
        let (ix, iy) = in_tile_coords(self.device.offset(), p);
        self.in_tile_x = ix;
        self.in_tile_y = iy;
    }

    #[inline]
    fn raw_data(&self) -> *const u8 {
        let off =
            (self.in_tile_y * TILE_WIDTH as usize + self.in_tile_x) * self.device.pixel_size();
        unsafe { self.tile.as_ptr().add(off) }
    }

    #[inline]
    fn row_stride(&self) -> usize {
        TILE_WIDTH as usize * self.device.pixel_size()
    }

    #[inline]
    fn pixel_size(&self) -> usize {
        self.device.pixel_size()
    }

    #[inline]
    fn num_contiguous_columns(&self) -> u32 {
        TILE_WIDTH - self.in_tile_x as u32
    }

    #[inline]
    fn num_contiguous_rows(&self) -> u32 {
        TILE_HEIGHT - self.in_tile_y as u32
    }
}

/// Mutable random accessor; reserves the copy-on-write tile it points at.
pub struct RandomAccessorMut {
    device: Arc<TiledDevice>,
    tile: Arc<TileBuf>,
    tile_id: TileId,
    in_tile_x: usize,
    in_tile_y: usize,
}

impl RandomAccessorMut {
    /// Creates an accessor positioned at the device offset.
    pub fn new(device: Arc<TiledDevice>) -> Self {
        let origin = device.offset();
        let tile_id = tile_for_pixel(origin, origin);
        let tile = device.reserve_tile(tile_id);
        Self {
            device,
            tile,
            tile_id,
            in_tile_x: 0,
            in_tile_y: 0,
        }
    }

}

impl PixelCursor for RandomAccessorMut {
    fn move_to(&mut self, x: i32, y: i32) {
        let p = Point::new(x, y);
        let id = tile_for_pixel(self.device.offset(), p);
        if id != self.tile_id {
            self.tile = self.device.reserve_tile(id);
            self.tile_id = id;
        }
        let (ix, iy) = in_tile_coords(self.device.offset(), p);
        self.in_tile_x = ix;
        self.in_tile_y = iy;
    }

    #[inline]
    fn raw_data(&self) -> *const u8 {
        let off =
            (self.in_tile_y * TILE_WIDTH as usize + self.in_tile_x) * self.device.pixel_size();
        unsafe { self.tile.as_ptr().add(off) }
    }

    #[inline]
    fn row_stride(&self) -> usize {
        TILE_WIDTH as usize * self.device.pixel_size()
    }

    #[inline]
    fn pixel_size(&self) -> usize {
        self.device.pixel_size()
    }

    #[inline]
    fn num_contiguous_columns(&self) -> u32 {
        TILE_WIDTH - self.in_tile_x as u32
    }

    #[inline]
    fn num_contiguous_rows(&self) -> u32 {
        TILE_HEIGHT - self.in_tile_y as u32
    }
}

impl PixelCursorMut for RandomAccessorMut {
    #[inline]
    fn raw_data_mut(&mut self) -> *mut u8 {
        let off =
            (self.in_tile_y * TILE_WIDTH as usize + self.in_tile_x) * self.device.pixel_size();
        unsafe { self.tile.as_mut_ptr().add(off) }
    }
}

// Borrowed write cursor for device-internal helpers that already hold
// &self.
struct DetachedCursor<'d> {
    device: &'d TiledDevice,
    tile: Arc<TileBuf>,
    tile_id: TileId,
    in_tile_x: usize,
    in_tile_y: usize,
}

impl<'d> DetachedCursor<'d> {
    fn new(device: &'d TiledDevice) -> Self {
        let origin = device.offset();
        let tile_id = tile_for_pixel(origin, origin);
        let tile = device.reserve_tile(tile_id);
        Self {
            device,
            tile,
            tile_id,
            in_tile_x: 0,
            in_tile_y: 0,
        }
    }

    fn move_to(&mut self, x: i32, y: i32) {
        let p = Point::new(x, y);
        let id = tile_for_pixel(self.device.offset(), p);
        if id != self.tile_id {
            self.tile = self.device.reserve_tile(id);
            self.tile_id = id;
        }
        let (ix, iy) = in_tile_coords(self.device.offset(), p);
        self.in_tile_x = ix;
        self.in_tile_y = iy;
    }

    fn num_contiguous_columns(&self) -> u32 {
        TILE_WIDTH - self.in_tile_x as u32
    }

    fn raw_data_mut(&mut self) -> *mut u8 {
        let off =
            (self.in_tile_y * TILE_WIDTH as usize + self.in_tile_x) * self.device.pixel_size();
        unsafe { self.tile.as_mut_ptr().add(off) }
    }
}
