//! Write-target tile policies.
//!
//! A tile policy binds the concrete devices of one fill invocation and
//! answers the four questions the scanline kernel asks per column:
//! is this pixel already set, is it inside the boundary selection, what is
//! its selection opacity, and, on acceptance, where do the writes go.
//!
//! One policy instance serves one tile job. It is built by a cloneable
//! factory (so per-job selection caches stay thread-local), bound to a
//! tile with [`TilePolicy::begin_processing`], used single-threadedly, and
//! released with [`TilePolicy::end_processing`]. The policy owns its
//! selection policy by value; devices are borrowed for the duration of the
//! processing bracket through the access adapters.

use std::marker::PhantomData;
use std::sync::Arc;

use tilefill_core::{Color, Rect, TileId, TiledDevice, tile_rect};
use tracing::warn;

use crate::access::{AlignedRead, AlignedWrite, TileAccess, TileAccessMut};
use crate::select::SelectionPolicy;

const NOT_PROCESSING: &str = "tile policy used outside its processing bracket";

/// The devices and bounds shared by every job of one fill invocation.
pub(crate) struct FillContext {
    pub reference: Arc<TiledDevice>,
    /// External destination, or the group map in group-split mode.
    pub external: Option<Arc<TiledDevice>>,
    pub mask: Arc<TiledDevice>,
    pub boundary: Option<Arc<TiledDevice>>,
    pub working_rect: Rect,
}

/// Per-tile behavior of one fill mode, as seen by the scanline kernel.
///
/// All column/row arguments are absolute device coordinates; between
/// `begin_processing` and `end_processing` they must stay inside
/// [`TilePolicy::tile_sub_rect`].
pub(crate) trait TilePolicy {
    /// Acquires the tile pointers for `tile_id`.
    fn begin_processing(&mut self, ctx: &FillContext, tile_id: TileId);

    /// Releases the tile pointers.
    fn end_processing(&mut self);

    /// The bound tile's rectangle clipped to the working rectangle.
    fn tile_sub_rect(&self) -> Rect;

    /// Selects the row subsequent column queries refer to.
    fn set_working_row(&mut self, row: i32);

    /// Whether the mask already records this pixel.
    fn is_already_set(&mut self, col: i32) -> bool;

    /// Whether the boundary selection permits filling this pixel.
    fn is_inside_boundary(&mut self, col: i32) -> bool;

    /// Selection opacity of this pixel.
    fn calculate_opacity(&mut self, col: i32) -> u8;

    /// Writes the pixel with the given opacity and marks it in the mask.
    fn set_value(&mut self, col: i32, opacity: u8);
}

/// Tile geometry shared by all policies.
#[derive(Default, Clone, Copy)]
struct PolicyBase {
    tile_rect: Rect,
    tile_sub_rect: Rect,
}

impl PolicyBase {
    fn bind(ctx: &FillContext, tile_id: TileId) -> Self {
        let rect = tile_rect(ctx.reference.offset(), tile_id);
        let sub = rect
            .intersect(&ctx.working_rect)
            .expect("processed tile intersects the working rectangle");
        Self {
            tile_rect: rect,
            tile_sub_rect: sub,
        }
    }

    #[inline]
    fn rel_row(&self, row: i32) -> i32 {
        debug_assert!(row >= self.tile_sub_rect.top() && row < self.tile_sub_rect.bottom());
        row - self.tile_rect.top()
    }

    #[inline]
    fn rel_col(&self, col: i32) -> i32 {
        debug_assert!(col >= self.tile_sub_rect.left() && col < self.tile_sub_rect.right());
        col - self.tile_rect.left()
    }
}

/// Uniform constructor used by [`TilePolicyFactory`].
pub(crate) trait NewTilePolicy: TilePolicy {
    /// Selection policy type this policy evaluates.
    type Selection: SelectionPolicy;

    /// Creates an unbound policy.
    fn new(fill_color: Color, selection: Self::Selection) -> Self;
}

/// Builds one fresh policy per tile job.
pub(crate) trait BuildTilePolicy: Send + Sync + 'static {
    /// The policy type produced.
    type Policy: TilePolicy;

    /// Creates a policy primed with this invocation's parameters.
    fn build(&self) -> Self::Policy;
}

/// Factory cloning a fill color and a selection-policy prototype into each
/// job.
pub(crate) struct TilePolicyFactory<P: NewTilePolicy> {
    fill_color: Color,
    selection: P::Selection,
    _policy: PhantomData<fn() -> P>,
}

impl<P: NewTilePolicy> TilePolicyFactory<P> {
    pub(crate) fn new(fill_color: Color, selection: P::Selection) -> Self {
        Self {
            fill_color,
            selection,
            _policy: PhantomData,
        }
    }
}

impl<P: NewTilePolicy + 'static> BuildTilePolicy for TilePolicyFactory<P>
where
    P::Selection: 'static,
{
    type Policy = P;

    fn build(&self) -> P {
        P::new(self.fill_color.clone(), self.selection.clone())
    }
}

/// Factory for the group-split policies; also carries the group index.
pub(crate) struct GroupSplitPolicyFactory<P: NewTilePolicy + GroupIndexed> {
    fill_color: Color,
    selection: P::Selection,
    group_index: i32,
    _policy: PhantomData<fn() -> P>,
}

impl<P: NewTilePolicy + GroupIndexed> GroupSplitPolicyFactory<P> {
    pub(crate) fn new(selection: P::Selection, group_index: i32) -> Self {
        Self {
            fill_color: Color::zero(0),
            selection,
            group_index,
            _policy: PhantomData,
        }
    }
}

impl<P: NewTilePolicy + GroupIndexed + 'static> BuildTilePolicy for GroupSplitPolicyFactory<P>
where
    P::Selection: 'static,
{
    type Policy = P;

    fn build(&self) -> P {
        let mut policy = P::new(self.fill_color.clone(), self.selection.clone());
        policy.set_group_index(self.group_index);
        policy
    }
}

/// Policies that write a group index.
pub(crate) trait GroupIndexed {
    /// Sets the 32-bit value written into the group map.
    fn set_group_index(&mut self, group_index: i32);
}

// ============================================================================
// Write to the reference device
// ============================================================================

/// Reads the reference, writes the fill color back into it, marks the
/// internal mask.
pub(crate) struct WriteToReferencePolicy<S: SelectionPolicy> {
    fill_color: Color,
    selection: S,
    base: PolicyBase,
    reference: Option<AlignedWrite>,
    mask: Option<AlignedWrite>,
}

impl<S: SelectionPolicy> NewTilePolicy for WriteToReferencePolicy<S> {
    type Selection = S;

    fn new(fill_color: Color, selection: S) -> Self {
        Self {
            fill_color,
            selection,
            base: PolicyBase::default(),
            reference: None,
            mask: None,
        }
    }
}

impl<S: SelectionPolicy> TilePolicy for WriteToReferencePolicy<S> {
    fn begin_processing(&mut self, ctx: &FillContext, tile_id: TileId) {
        debug_assert!(self.reference.is_none(), "begin_processing called twice");
        let base = PolicyBase::bind(ctx, tile_id);
        self.reference = Some(AlignedWrite::bind(ctx.reference.clone(), base.tile_rect));
        self.mask = Some(AlignedWrite::bind(ctx.mask.clone(), base.tile_rect));
        self.base = base;
        self.set_working_row(base.tile_sub_rect.top());
    }

    fn end_processing(&mut self) {
        self.reference = None;
        self.mask = None;
    }

    #[inline]
    fn tile_sub_rect(&self) -> Rect {
        self.base.tile_sub_rect
    }

    #[inline]
    fn set_working_row(&mut self, row: i32) {
        let rel = self.base.rel_row(row);
        self.reference.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.mask.as_mut().expect(NOT_PROCESSING).set_row(rel);
    }

    #[inline]
    fn is_already_set(&mut self, col: i32) -> bool {
        let rel = self.base.rel_col(col);
        self.mask.as_mut().expect(NOT_PROCESSING).pixel(rel)[0] > 0
    }

    #[inline]
    fn is_inside_boundary(&mut self, _col: i32) -> bool {
        true
    }

    #[inline]
    fn calculate_opacity(&mut self, col: i32) -> u8 {
        let rel = self.base.rel_col(col);
        let pixel = self.reference.as_mut().expect(NOT_PROCESSING).pixel(rel);
        self.selection.opacity(pixel)
    }

    #[inline]
    fn set_value(&mut self, col: i32, opacity: u8) {
        let rel = self.base.rel_col(col);
        self.reference
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, self.fill_color.as_bytes());
        self.mask
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, &[opacity]);
    }
}

// ============================================================================
// Write to an external device
// ============================================================================

/// Reads the reference read-only, writes the fill color into an external
/// device (aligned or not), marks the internal mask.
pub(crate) struct WriteToExternalPolicy<S: SelectionPolicy, E: TileAccessMut> {
    fill_color: Color,
    selection: S,
    base: PolicyBase,
    reference: Option<AlignedRead>,
    mask: Option<AlignedWrite>,
    external: Option<E>,
}

impl<S: SelectionPolicy, E: TileAccessMut> NewTilePolicy for WriteToExternalPolicy<S, E> {
    type Selection = S;

    fn new(fill_color: Color, selection: S) -> Self {
        Self {
            fill_color,
            selection,
            base: PolicyBase::default(),
            reference: None,
            mask: None,
            external: None,
        }
    }
}

impl<S: SelectionPolicy, E: TileAccessMut> TilePolicy for WriteToExternalPolicy<S, E> {
    fn begin_processing(&mut self, ctx: &FillContext, tile_id: TileId) {
        debug_assert!(self.reference.is_none(), "begin_processing called twice");
        let base = PolicyBase::bind(ctx, tile_id);
        let external = ctx.external.as_ref().expect("external fill needs a device");
        self.reference = Some(AlignedRead::bind(ctx.reference.clone(), base.tile_rect));
        self.mask = Some(AlignedWrite::bind(ctx.mask.clone(), base.tile_rect));
        self.external = Some(E::bind(external.clone(), base.tile_rect));
        self.base = base;
        self.set_working_row(base.tile_sub_rect.top());
    }

    fn end_processing(&mut self) {
        self.reference = None;
        self.mask = None;
        self.external = None;
    }

    #[inline]
    fn tile_sub_rect(&self) -> Rect {
        self.base.tile_sub_rect
    }

    #[inline]
    fn set_working_row(&mut self, row: i32) {
        let rel = self.base.rel_row(row);
        self.reference.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.mask.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.external.as_mut().expect(NOT_PROCESSING).set_row(rel);
    }

    #[inline]
    fn is_already_set(&mut self, col: i32) -> bool {
        let rel = self.base.rel_col(col);
        self.mask.as_mut().expect(NOT_PROCESSING).pixel(rel)[0] > 0
    }

    #[inline]
    fn is_inside_boundary(&mut self, _col: i32) -> bool {
        true
    }

    #[inline]
    fn calculate_opacity(&mut self, col: i32) -> u8 {
        let rel = self.base.rel_col(col);
        let pixel = self.reference.as_mut().expect(NOT_PROCESSING).pixel(rel);
        self.selection.opacity(pixel)
    }

    #[inline]
    fn set_value(&mut self, col: i32, opacity: u8) {
        let rel = self.base.rel_col(col);
        self.external
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, self.fill_color.as_bytes());
        self.mask
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, &[opacity]);
    }
}

// ============================================================================
// Write to a mask device
// ============================================================================

/// Reads the reference read-only and writes the computed opacity into the
/// caller's mask; the mask doubles as the already-set memo.
pub(crate) struct WriteToMaskPolicy<S: SelectionPolicy, M: TileAccessMut> {
    selection: S,
    base: PolicyBase,
    reference: Option<AlignedRead>,
    mask: Option<M>,
}

impl<S: SelectionPolicy, M: TileAccessMut> NewTilePolicy for WriteToMaskPolicy<S, M> {
    type Selection = S;

    fn new(_fill_color: Color, selection: S) -> Self {
        Self {
            selection,
            base: PolicyBase::default(),
            reference: None,
            mask: None,
        }
    }
}

impl<S: SelectionPolicy, M: TileAccessMut> TilePolicy for WriteToMaskPolicy<S, M> {
    fn begin_processing(&mut self, ctx: &FillContext, tile_id: TileId) {
        debug_assert!(self.reference.is_none(), "begin_processing called twice");
        let base = PolicyBase::bind(ctx, tile_id);
        self.reference = Some(AlignedRead::bind(ctx.reference.clone(), base.tile_rect));
        self.mask = Some(M::bind(ctx.mask.clone(), base.tile_rect));
        self.base = base;
        self.set_working_row(base.tile_sub_rect.top());
    }

    fn end_processing(&mut self) {
        self.reference = None;
        self.mask = None;
    }

    #[inline]
    fn tile_sub_rect(&self) -> Rect {
        self.base.tile_sub_rect
    }

    #[inline]
    fn set_working_row(&mut self, row: i32) {
        let rel = self.base.rel_row(row);
        self.reference.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.mask.as_mut().expect(NOT_PROCESSING).set_row(rel);
    }

    #[inline]
    fn is_already_set(&mut self, col: i32) -> bool {
        let rel = self.base.rel_col(col);
        self.mask.as_mut().expect(NOT_PROCESSING).pixel(rel)[0] > 0
    }

    #[inline]
    fn is_inside_boundary(&mut self, _col: i32) -> bool {
        true
    }

    #[inline]
    fn calculate_opacity(&mut self, col: i32) -> u8 {
        let rel = self.base.rel_col(col);
        let pixel = self.reference.as_mut().expect(NOT_PROCESSING).pixel(rel);
        self.selection.opacity(pixel)
    }

    #[inline]
    fn set_value(&mut self, col: i32, opacity: u8) {
        let rel = self.base.rel_col(col);
        self.mask
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, &[opacity]);
    }
}

/// [`WriteToMaskPolicy`] plus a read-only boundary selection consulted per
/// column.
pub(crate) struct WriteToMaskWithBoundaryPolicy<S, M, B>
where
    S: SelectionPolicy,
    M: TileAccessMut,
    B: TileAccess,
{
    selection: S,
    base: PolicyBase,
    reference: Option<AlignedRead>,
    mask: Option<M>,
    boundary: Option<B>,
}

impl<S, M, B> NewTilePolicy for WriteToMaskWithBoundaryPolicy<S, M, B>
where
    S: SelectionPolicy,
    M: TileAccessMut,
    B: TileAccess,
{
    type Selection = S;

    fn new(_fill_color: Color, selection: S) -> Self {
        Self {
            selection,
            base: PolicyBase::default(),
            reference: None,
            mask: None,
            boundary: None,
        }
    }
}

impl<S, M, B> TilePolicy for WriteToMaskWithBoundaryPolicy<S, M, B>
where
    S: SelectionPolicy,
    M: TileAccessMut,
    B: TileAccess,
{
    fn begin_processing(&mut self, ctx: &FillContext, tile_id: TileId) {
        debug_assert!(self.reference.is_none(), "begin_processing called twice");
        let base = PolicyBase::bind(ctx, tile_id);
        let boundary = ctx
            .boundary
            .as_ref()
            .expect("boundary fill needs a boundary selection");
        self.reference = Some(AlignedRead::bind(ctx.reference.clone(), base.tile_rect));
        self.mask = Some(M::bind(ctx.mask.clone(), base.tile_rect));
        self.boundary = Some(B::bind(boundary.clone(), base.tile_rect));
        self.base = base;
        self.set_working_row(base.tile_sub_rect.top());
    }

    fn end_processing(&mut self) {
        self.reference = None;
        self.mask = None;
        self.boundary = None;
    }

    #[inline]
    fn tile_sub_rect(&self) -> Rect {
        self.base.tile_sub_rect
    }

    #[inline]
    fn set_working_row(&mut self, row: i32) {
        let rel = self.base.rel_row(row);
        self.reference.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.mask.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.boundary.as_mut().expect(NOT_PROCESSING).set_row(rel);
    }

    #[inline]
    fn is_already_set(&mut self, col: i32) -> bool {
        let rel = self.base.rel_col(col);
        self.mask.as_mut().expect(NOT_PROCESSING).pixel(rel)[0] > 0
    }

    #[inline]
    fn is_inside_boundary(&mut self, col: i32) -> bool {
        let rel = self.base.rel_col(col);
        self.boundary.as_mut().expect(NOT_PROCESSING).pixel(rel)[0] > 0
    }

    #[inline]
    fn calculate_opacity(&mut self, col: i32) -> u8 {
        let rel = self.base.rel_col(col);
        let pixel = self.reference.as_mut().expect(NOT_PROCESSING).pixel(rel);
        self.selection.opacity(pixel)
    }

    #[inline]
    fn set_value(&mut self, col: i32, opacity: u8) {
        let rel = self.base.rel_col(col);
        self.mask
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, &[opacity]);
    }
}

// ============================================================================
// Group split (watershed initialization)
// ============================================================================

/// Clears accepted pixels in the 1-byte reference while writing the group
/// index into the 4-byte group map.
pub(crate) struct GroupSplitTilePolicy<S: SelectionPolicy, G: TileAccessMut> {
    selection: S,
    base: PolicyBase,
    zero_pixel: Color,
    group_index: i32,
    reference: Option<AlignedWrite>,
    mask: Option<AlignedWrite>,
    group_map: Option<G>,
}

impl<S: SelectionPolicy, G: TileAccessMut> NewTilePolicy for GroupSplitTilePolicy<S, G> {
    type Selection = S;

    fn new(_fill_color: Color, selection: S) -> Self {
        Self {
            selection,
            base: PolicyBase::default(),
            zero_pixel: Color::zero(0),
            group_index: 0,
            reference: None,
            mask: None,
            group_map: None,
        }
    }
}

impl<S: SelectionPolicy, G: TileAccessMut> GroupIndexed for GroupSplitTilePolicy<S, G> {
    fn set_group_index(&mut self, group_index: i32) {
        self.group_index = group_index;
    }
}

impl<S: SelectionPolicy, G: TileAccessMut> TilePolicy for GroupSplitTilePolicy<S, G> {
    fn begin_processing(&mut self, ctx: &FillContext, tile_id: TileId) {
        debug_assert!(self.reference.is_none(), "begin_processing called twice");
        let base = PolicyBase::bind(ctx, tile_id);
        let group_map = ctx.external.as_ref().expect("group split needs a group map");
        self.zero_pixel = Color::zero(ctx.reference.pixel_size());
        self.reference = Some(AlignedWrite::bind(ctx.reference.clone(), base.tile_rect));
        self.mask = Some(AlignedWrite::bind(ctx.mask.clone(), base.tile_rect));
        self.group_map = Some(G::bind(group_map.clone(), base.tile_rect));
        self.base = base;
        self.set_working_row(base.tile_sub_rect.top());
    }

    fn end_processing(&mut self) {
        self.reference = None;
        self.mask = None;
        self.group_map = None;
    }

    #[inline]
    fn tile_sub_rect(&self) -> Rect {
        self.base.tile_sub_rect
    }

    #[inline]
    fn set_working_row(&mut self, row: i32) {
        let rel = self.base.rel_row(row);
        self.reference.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.mask.as_mut().expect(NOT_PROCESSING).set_row(rel);
        self.group_map.as_mut().expect(NOT_PROCESSING).set_row(rel);
    }

    #[inline]
    fn is_already_set(&mut self, col: i32) -> bool {
        let rel = self.base.rel_col(col);
        self.mask.as_mut().expect(NOT_PROCESSING).pixel(rel)[0] > 0
    }

    #[inline]
    fn is_inside_boundary(&mut self, _col: i32) -> bool {
        true
    }

    #[inline]
    fn calculate_opacity(&mut self, col: i32) -> u8 {
        let rel = self.base.rel_col(col);
        let pixel = self.reference.as_mut().expect(NOT_PROCESSING).pixel(rel);
        self.selection.opacity(pixel)
    }

    #[inline]
    fn set_value(&mut self, col: i32, opacity: u8) {
        let rel = self.base.rel_col(col);
        // Erase the scribble.
        self.reference
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, self.zero_pixel.as_bytes());
        self.mask
            .as_mut()
            .expect(NOT_PROCESSING)
            .write_pixel(rel, &[opacity]);

        let group_map = self.group_map.as_mut().expect(NOT_PROCESSING);
        let existing = i32::from_ne_bytes(group_map.pixel(rel).try_into().unwrap());
        if existing != 0 {
            warn!(existing, group_index = self.group_index, "group map pixel overwritten");
        }
        group_map.write_pixel(rel, &self.group_index.to_ne_bytes());
    }
}
