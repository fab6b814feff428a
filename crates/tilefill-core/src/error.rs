//! Error types for tilefill-core operations.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors reported by the core raster types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A pixel value's byte width does not match the device's.
    #[error("pixel size mismatch: device expects {expected} bytes, got {got}")]
    PixelSizeMismatch {
        /// Device pixel width in bytes.
        expected: usize,
        /// Provided pixel width in bytes.
        got: usize,
    },
}

impl CoreError {
    /// Creates a [`CoreError::PixelSizeMismatch`].
    #[inline]
    pub fn pixel_size_mismatch(expected: usize, got: usize) -> Self {
        Self::PixelSizeMismatch { expected, got }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size_mismatch_message() {
        let err = CoreError::pixel_size_mismatch(4, 1);
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains('1'));
    }
}
