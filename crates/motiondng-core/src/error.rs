//! Error types for the decode and render pipeline.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// No JSON metadata could be located, or the metadata is missing
    /// required geometry.
    #[error("invalid container: {0}")]
    ContainerInvalid(String),

    /// Every frame detection strategy came up empty.
    #[error("no frames found in container")]
    ParserExhausted,

    #[error("frame {0} out of range ({1} frames planned)")]
    FrameOutOfRange(usize, usize),

    #[error("failed to decompress frame payload: {0}")]
    DecompressionFailed(String),

    /// The unpacked frame does not match any supported layout, even after
    /// resolution inference.
    #[error("frame size mismatch: got {got} bytes, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },

    /// A pixel exceeded the destination white level after clamping. This
    /// indicates a renderer bug; fatal in debug builds.
    #[error("encoded sample {0} exceeds white level {1}")]
    EncodeOverflow(u32, u16),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
    /// Per-frame failures leave the job running; everything else is fatal.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            RenderError::DecompressionFailed(_) | RenderError::SizeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_local_classification() {
        assert!(RenderError::DecompressionFailed("bad magic".into()).is_frame_local());
        assert!(RenderError::SizeMismatch { got: 1, expected: 2 }.is_frame_local());
        assert!(!RenderError::ParserExhausted.is_frame_local());
        assert!(!RenderError::Cancelled.is_frame_local());
    }
}
