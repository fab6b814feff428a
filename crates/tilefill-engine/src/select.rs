//! Difference and selection policies.
//!
//! A *difference policy* turns a candidate pixel into a 0..=255 scalar
//! distance from a fixed reference color. A *selection policy* wraps a
//! difference policy and turns that scalar into an opacity: how strongly
//! the pixel belongs to the filled region. The scanline kernel only ever
//! sees the selection policy, and every combination is monomorphized, so
//! nothing here is dispatched dynamically in the inner loop.
//!
//! Policies are built once per tile job from a cloneable prototype.
//! Cloning copies the memo cache of the optimized policies, but prototypes
//! never compute anything, so per-job caches start empty and stay
//! thread-local.

use std::collections::HashMap;
use std::hash::Hash;

use tilefill_core::{Color, ColorSpaceRef, OPACITY_OPAQUE, OPACITY_TRANSPARENT};

/// Computes a 0..=255 difference between the reference color and a pixel.
///
/// `difference` takes `&mut self` so optimized implementations can memoize.
pub trait DifferencePolicy: Clone + Send + Sync {
    /// Builds the policy for one fill invocation.
    fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self;

    /// Difference of `pixel` from the reference color.
    fn difference(&mut self, pixel: &[u8]) -> u8;
}

/// Raw pixel values usable as memoization keys.
pub trait PixelKey: Copy + Eq + Hash + Send + Sync {
    /// Key width in bytes.
    const SIZE: usize;

    /// Reads a key from the first `SIZE` bytes of a pixel.
    fn from_pixel(bytes: &[u8]) -> Self;
}

macro_rules! impl_pixel_key {
    ($($t:ty),*) => {$(
        impl PixelKey for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn from_pixel(bytes: &[u8]) -> Self {
                <$t>::from_ne_bytes(bytes[..Self::SIZE].try_into().unwrap())
            }
        }
    )*};
}

impl_pixel_key!(u8, u16, u32, u64);

#[inline]
fn slow_difference(colorspace: &ColorSpaceRef, reference: &Color, threshold: u8, pixel: &[u8]) -> u8 {
    if threshold == 1 {
        if pixel == reference.as_bytes() {
            OPACITY_TRANSPARENT
        } else {
            OPACITY_OPAQUE
        }
    } else {
        colorspace.difference_with_alpha(reference.as_bytes(), pixel)
    }
}

#[inline]
fn color_or_transparent_difference(
    colorspace: &ColorSpaceRef,
    reference: &Color,
    threshold: u8,
    pixel: &[u8],
) -> u8 {
    if threshold == 1 {
        if pixel == reference.as_bytes() || colorspace.opacity_u8(pixel) == 0 {
            OPACITY_TRANSPARENT
        } else {
            OPACITY_OPAQUE
        }
    } else {
        let color = colorspace.difference(reference.as_bytes(), pixel);
        let opacity = (colorspace.opacity_u8(pixel) as u32 * 100 / OPACITY_OPAQUE as u32) as u8;
        color.min(opacity)
    }
}

/// Uncached difference through the color space. Used for pixel widths with
/// no integer key.
#[derive(Clone)]
pub struct SlowDiff {
    colorspace: ColorSpaceRef,
    reference: Color,
    threshold: u8,
}

impl DifferencePolicy for SlowDiff {
    fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self {
        Self {
            colorspace,
            reference,
            threshold,
        }
    }

    #[inline]
    fn difference(&mut self, pixel: &[u8]) -> u8 {
        slow_difference(&self.colorspace, &self.reference, self.threshold, pixel)
    }
}

/// Difference memoized on the raw integer value of the pixel.
#[derive(Clone)]
pub struct OptimizedDiff<K: PixelKey> {
    colorspace: ColorSpaceRef,
    reference: Color,
    threshold: u8,
    cache: HashMap<K, u8>,
}

impl<K: PixelKey> DifferencePolicy for OptimizedDiff<K> {
    fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self {
        debug_assert_eq!(colorspace.pixel_size(), K::SIZE);
        Self {
            colorspace,
            reference,
            threshold,
            cache: HashMap::new(),
        }
    }

    #[inline]
    fn difference(&mut self, pixel: &[u8]) -> u8 {
        let key = K::from_pixel(pixel);
        if let Some(&d) = self.cache.get(&key) {
            return d;
        }
        let d = slow_difference(&self.colorspace, &self.reference, self.threshold, pixel);
        self.cache.insert(key, d);
        d
    }
}

/// Difference that also treats fully transparent pixels as close to the
/// reference, so transparency acts as a fill boundary in the until-color
/// modes.
#[derive(Clone)]
pub struct ColorOrTransparentSlowDiff {
    colorspace: ColorSpaceRef,
    reference: Color,
    threshold: u8,
}

impl DifferencePolicy for ColorOrTransparentSlowDiff {
    fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self {
        Self {
            colorspace,
            reference,
            threshold,
        }
    }

    #[inline]
    fn difference(&mut self, pixel: &[u8]) -> u8 {
        color_or_transparent_difference(&self.colorspace, &self.reference, self.threshold, pixel)
    }
}

/// Memoized variant of [`ColorOrTransparentSlowDiff`].
#[derive(Clone)]
pub struct ColorOrTransparentOptimizedDiff<K: PixelKey> {
    colorspace: ColorSpaceRef,
    reference: Color,
    threshold: u8,
    cache: HashMap<K, u8>,
}

impl<K: PixelKey> DifferencePolicy for ColorOrTransparentOptimizedDiff<K> {
    fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self {
        debug_assert_eq!(colorspace.pixel_size(), K::SIZE);
        Self {
            colorspace,
            reference,
            threshold,
            cache: HashMap::new(),
        }
    }

    #[inline]
    fn difference(&mut self, pixel: &[u8]) -> u8 {
        let key = K::from_pixel(pixel);
        if let Some(&d) = self.cache.get(&key) {
            return d;
        }
        let d =
            color_or_transparent_difference(&self.colorspace, &self.reference, self.threshold, pixel);
        self.cache.insert(key, d);
        d
    }
}

/// Zero difference for any non-zero pixel, full difference for the
/// all-zero pixel. Threshold and reference color are never consulted;
/// paired with [`HardSelect`] at threshold 0 this selects the connected
/// non-zero component.
#[derive(Clone)]
pub struct NonNullDiff {
    pixel_size: usize,
}

impl DifferencePolicy for NonNullDiff {
    fn new(colorspace: ColorSpaceRef, _reference: Color, _threshold: u8) -> Self {
        Self {
            pixel_size: colorspace.pixel_size(),
        }
    }

    #[inline]
    fn difference(&mut self, pixel: &[u8]) -> u8 {
        debug_assert_eq!(pixel.len(), self.pixel_size);
        if pixel.iter().all(|&b| b == 0) {
            OPACITY_OPAQUE
        } else {
            OPACITY_TRANSPARENT
        }
    }
}

/// Maps a difference to a selection opacity.
pub trait SelectionPolicy: Clone + Send + Sync {
    /// Opacity of `pixel` under this policy, 0 = not selected.
    fn opacity(&mut self, pixel: &[u8]) -> u8;
}

/// Select-similar, hard edge: full opacity iff the difference stays within
/// the threshold.
#[derive(Clone)]
pub struct HardSelect<D: DifferencePolicy> {
    diff: D,
    threshold: u8,
}

impl<D: DifferencePolicy> HardSelect<D> {
    /// Builds the policy for one fill invocation.
    pub fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self {
        Self {
            diff: D::new(colorspace, reference, threshold),
            threshold,
        }
    }
}

impl<D: DifferencePolicy> SelectionPolicy for HardSelect<D> {
    #[inline]
    fn opacity(&mut self, pixel: &[u8]) -> u8 {
        if self.diff.difference(pixel) <= self.threshold {
            OPACITY_OPAQUE
        } else {
            OPACITY_TRANSPARENT
        }
    }
}

/// Select-similar with a soft edge: opacity ramps down as the difference
/// approaches the threshold. `softness` is `100 - opacity_spread` and is
/// never 0 here (the facade picks [`HardSelect`] for that case).
#[derive(Clone)]
pub struct SoftSelect<D: DifferencePolicy> {
    diff: D,
    threshold: u8,
    softness: u8,
}

impl<D: DifferencePolicy> SoftSelect<D> {
    /// Builds the policy for one fill invocation.
    pub fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8, softness: u8) -> Self {
        debug_assert!(softness > 0);
        Self {
            diff: D::new(colorspace, reference, threshold),
            threshold,
            softness,
        }
    }
}

impl<D: DifferencePolicy> SelectionPolicy for SoftSelect<D> {
    #[inline]
    fn opacity(&mut self, pixel: &[u8]) -> u8 {
        if self.threshold == 0 {
            return OPACITY_TRANSPARENT;
        }
        let diff = self.diff.difference(pixel) as u32;
        let threshold = self.threshold as u32;
        if diff < threshold {
            let v = (threshold - diff) * OPACITY_OPAQUE as u32 * 100
                / (threshold * self.softness as u32);
            v.min(OPACITY_OPAQUE as u32) as u8
        } else {
            OPACITY_TRANSPARENT
        }
    }
}

/// Select-until-color, hard edge: pixels are selected as long as they are
/// *not* similar to the reference (boundary) color.
#[derive(Clone)]
pub struct UntilColorHardSelect<D: DifferencePolicy> {
    diff: D,
    threshold: u8,
}

impl<D: DifferencePolicy> UntilColorHardSelect<D> {
    /// Builds the policy for one fill invocation.
    pub fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8) -> Self {
        Self {
            diff: D::new(colorspace, reference, threshold),
            threshold,
        }
    }
}

impl<D: DifferencePolicy> SelectionPolicy for UntilColorHardSelect<D> {
    #[inline]
    fn opacity(&mut self, pixel: &[u8]) -> u8 {
        if self.diff.difference(pixel) > self.threshold {
            OPACITY_OPAQUE
        } else {
            OPACITY_TRANSPARENT
        }
    }
}

/// Select-until-color with a soft edge near the boundary color.
#[derive(Clone)]
pub struct UntilColorSoftSelect<D: DifferencePolicy> {
    diff: D,
    threshold: u8,
    softness: u8,
}

impl<D: DifferencePolicy> UntilColorSoftSelect<D> {
    /// Builds the policy for one fill invocation.
    pub fn new(colorspace: ColorSpaceRef, reference: Color, threshold: u8, softness: u8) -> Self {
        debug_assert!(softness > 0);
        Self {
            diff: D::new(colorspace, reference, threshold),
            threshold,
            softness,
        }
    }
}

impl<D: DifferencePolicy> SelectionPolicy for UntilColorSoftSelect<D> {
    #[inline]
    fn opacity(&mut self, pixel: &[u8]) -> u8 {
        if self.threshold == 0 {
            return OPACITY_OPAQUE;
        }
        let diff = self.diff.difference(pixel) as i32;
        let threshold = self.threshold as i32;
        if diff < threshold {
            let v = OPACITY_OPAQUE as i32
                - (threshold - diff) * OPACITY_OPAQUE as i32 * 100
                    / (threshold * self.softness as i32);
            v.max(OPACITY_TRANSPARENT as i32) as u8
        } else {
            OPACITY_OPAQUE
        }
    }
}

/// Selection used by the watershed group-split fill: the reference is a
/// 1-byte scribble raster and similarity is plain value distance.
#[derive(Clone)]
pub struct GroupSplitSelect {
    reference: u8,
    threshold: u8,
}

impl GroupSplitSelect {
    /// Builds the policy from the seed pixel's value.
    pub fn new(reference: u8, threshold: u8) -> Self {
        Self {
            reference,
            threshold,
        }
    }
}

impl SelectionPolicy for GroupSplitSelect {
    #[inline]
    fn opacity(&mut self, pixel: &[u8]) -> u8 {
        if pixel[0].abs_diff(self.reference) <= self.threshold {
            OPACITY_OPAQUE
        } else {
            OPACITY_TRANSPARENT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tilefill_core::{Gray8, Rgba8};

    fn gray_cs() -> ColorSpaceRef {
        Arc::new(Gray8)
    }

    #[test]
    fn test_hard_select_values() {
        let mut sel = HardSelect::<SlowDiff>::new(gray_cs(), Color::gray(100), 10);
        assert_eq!(sel.opacity(&[100]), 255);
        assert_eq!(sel.opacity(&[110]), 255);
        assert_eq!(sel.opacity(&[111]), 0);
        assert_eq!(sel.opacity(&[0]), 0);
    }

    #[test]
    fn test_hard_select_threshold_one_exact_match() {
        let mut sel = HardSelect::<SlowDiff>::new(gray_cs(), Color::gray(100), 1);
        // The short-circuit compares raw bytes: value 101 differs by 1 but
        // is not byte-identical, so it is rejected.
        assert_eq!(sel.opacity(&[100]), 255);
        assert_eq!(sel.opacity(&[101]), 0);
    }

    #[test]
    fn test_soft_select_ramp() {
        // threshold 100, softness 100: opacity(v) = (100 - v) * 255 / 100
        // for v < 100.
        let mut sel = SoftSelect::<SlowDiff>::new(gray_cs(), Color::gray(0), 100, 100);
        assert_eq!(sel.opacity(&[0]), 255);
        let mut last = 256i32;
        for v in [1u8, 25, 50, 75, 99] {
            let o = sel.opacity(&[v]) as i32;
            let expected = (100 - v as i32) * 255 * 100 / (100 * 100);
            assert_eq!(o, expected.min(255));
            assert!(o < last, "opacity must strictly decrease along the ramp");
            last = o;
        }
        assert_eq!(sel.opacity(&[100]), 0);
        assert_eq!(sel.opacity(&[200]), 0);
    }

    #[test]
    fn test_soft_select_low_softness_clamps() {
        // softness 10 makes the ramp ten times steeper; values close to the
        // reference clamp at full opacity.
        let mut sel = SoftSelect::<SlowDiff>::new(gray_cs(), Color::gray(0), 100, 10);
        assert_eq!(sel.opacity(&[50]), 255);
        assert_eq!(sel.opacity(&[95]), (5 * 255 * 100 / (100 * 10)) as u8);
    }

    #[test]
    fn test_soft_select_zero_threshold() {
        let mut sel = SoftSelect::<SlowDiff>::new(gray_cs(), Color::gray(0), 0, 100);
        assert_eq!(sel.opacity(&[0]), 0);
    }

    #[test]
    fn test_until_color_hard() {
        let mut sel = UntilColorHardSelect::<SlowDiff>::new(gray_cs(), Color::gray(200), 0);
        assert_eq!(sel.opacity(&[10]), 255);
        assert_eq!(sel.opacity(&[200]), 0);
    }

    #[test]
    fn test_until_color_soft_inverts_ramp() {
        let mut sel = UntilColorSoftSelect::<SlowDiff>::new(gray_cs(), Color::gray(0), 100, 100);
        // At the boundary color the pixel is fully excluded.
        assert_eq!(sel.opacity(&[0]), 0);
        // Far from the boundary color the pixel is fully included.
        assert_eq!(sel.opacity(&[200]), 255);
        let near = sel.opacity(&[10]);
        let far = sel.opacity(&[90]);
        assert!(near < far);
    }

    #[test]
    fn test_until_color_soft_zero_threshold() {
        let mut sel = UntilColorSoftSelect::<SlowDiff>::new(gray_cs(), Color::gray(0), 0, 100);
        assert_eq!(sel.opacity(&[0]), 255);
    }

    #[test]
    fn test_optimized_matches_slow() {
        let cs: ColorSpaceRef = Arc::new(Rgba8);
        let reference = Color::rgba8(10, 20, 30, 255);
        let mut slow = SlowDiff::new(cs.clone(), reference.clone(), 40);
        let mut fast = OptimizedDiff::<u32>::new(cs, reference, 40);
        for pixel in [
            [10u8, 20, 30, 255],
            [15, 20, 30, 255],
            [10, 20, 30, 0],
            [200, 200, 200, 255],
        ] {
            assert_eq!(slow.difference(&pixel), fast.difference(&pixel));
            // Second lookup hits the cache and must agree.
            assert_eq!(slow.difference(&pixel), fast.difference(&pixel));
        }
    }

    #[test]
    fn test_cloned_prototype_has_empty_cache() {
        let cs: ColorSpaceRef = Arc::new(Gray8);
        let prototype = OptimizedDiff::<u8>::new(cs, Color::gray(0), 10);
        let mut a = prototype.clone();
        let mut b = prototype.clone();
        assert_eq!(a.difference(&[5]), b.difference(&[5]));
        assert!(a.cache.len() == 1 && b.cache.len() == 1);
    }

    #[test]
    fn test_color_or_transparent() {
        let cs: ColorSpaceRef = Arc::new(Rgba8);
        let boundary = Color::rgba8(200, 0, 0, 255);
        let mut diff = ColorOrTransparentSlowDiff::new(cs, boundary, 50);
        // A transparent pixel reads as close to the boundary even though
        // its color channels are far away.
        assert_eq!(diff.difference(&[0, 0, 255, 0]), 0);
        assert_eq!(diff.difference(&[200, 0, 0, 255]), 0);
        assert!(diff.difference(&[0, 0, 255, 255]) > 50);
    }

    #[test]
    fn test_non_null_diff() {
        let cs: ColorSpaceRef = Arc::new(Rgba8);
        let mut diff = NonNullDiff::new(cs, Color::zero(4), 0);
        assert_eq!(diff.difference(&[0, 0, 0, 0]), 255);
        assert_eq!(diff.difference(&[0, 0, 0, 1]), 0);
        assert_eq!(diff.difference(&[9, 9, 9, 9]), 0);
    }

    #[test]
    fn test_group_split_select() {
        let mut sel = GroupSplitSelect::new(100, 5);
        assert_eq!(sel.opacity(&[100]), 255);
        assert_eq!(sel.opacity(&[105]), 255);
        assert_eq!(sel.opacity(&[106]), 0);
        assert_eq!(sel.opacity(&[0]), 0);
    }
}
