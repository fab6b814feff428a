//! Error types for fill operations.

use thiserror::Error;
use tilefill_core::{Point, Rect};

/// Result type alias using [`FillError`].
pub type FillResult<T> = std::result::Result<T, FillError>;

/// Contract violations reported by the fill facade.
///
/// These indicate caller bugs, not runtime conditions; a fill that merely
/// selects nothing returns `Ok` and writes nothing. Out-of-range threshold
/// and spread values are clamped by the setters instead of reported.
#[derive(Debug, Error)]
pub enum FillError {
    /// The seed pixel lies outside the working rectangle.
    #[error("seed {seed} outside working rectangle {rect}")]
    SeedOutsideWorkingRect {
        /// The seed point.
        seed: Point,
        /// The working rectangle.
        rect: Rect,
    },

    /// A device or color has the wrong pixel byte width for its role.
    #[error("{role}: expected {expected}-byte pixels, got {got}")]
    PixelSizeMismatch {
        /// Which device or value was wrong.
        role: &'static str,
        /// Expected pixel width in bytes.
        expected: usize,
        /// Actual pixel width in bytes.
        got: usize,
    },
}

impl FillError {
    pub(crate) fn pixel_size(role: &'static str, expected: usize, got: usize) -> Self {
        Self::PixelSizeMismatch {
            role,
            expected,
            got,
        }
    }
}
