//! Typed render option enums.
//!
//! These arrive from host UIs as free-form strings; the string forms are
//! kept for (de)serialization at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::parse_float_prefix;

/// Constant-framerate conversion target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum CfrTarget {
    /// Keep the inferred framerate unchanged
    Disabled,

    /// Snap to the nearest integer broadcast rate
    PreferInteger,

    /// Snap to the nearest NTSC drop-frame rate, falling back to integer
    #[default]
    PreferDropFrame,

    /// Use the median frame interval literally (slow-motion material)
    MedianSlowMotion,

    /// Use the arithmetic mean of the frame intervals
    AverageTesting,

    /// Fixed user-supplied framerate
    Custom(f32),
}

impl CfrTarget {
    pub fn parse(s: &str) -> CfrTarget {
        match s.trim() {
            "" => CfrTarget::Disabled,
            "Prefer Integer" => CfrTarget::PreferInteger,
            "Prefer Drop Frame" => CfrTarget::PreferDropFrame,
            "Median (Slowmotion)" => CfrTarget::MedianSlowMotion,
            "Average (Testing)" => CfrTarget::AverageTesting,
            other => match parse_float_prefix(other) {
                Some(v) if v > 0.0 => CfrTarget::Custom(v),
                _ => CfrTarget::PreferDropFrame,
            },
        }
    }
}

impl fmt::Display for CfrTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfrTarget::Disabled => write!(f, ""),
            CfrTarget::PreferInteger => write!(f, "Prefer Integer"),
            CfrTarget::PreferDropFrame => write!(f, "Prefer Drop Frame"),
            CfrTarget::MedianSlowMotion => write!(f, "Median (Slowmotion)"),
            CfrTarget::AverageTesting => write!(f, "Average (Testing)"),
            CfrTarget::Custom(v) => write!(f, "{}", v),
        }
    }
}

/// Logarithmic transfer encoding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogTransformMode {
    /// No log curve; pixels stay linear
    Disabled,

    /// Log curve at the input bit depth
    #[default]
    KeepInput,

    ReduceBy2Bit,
    ReduceBy4Bit,
    ReduceBy6Bit,
    ReduceBy8Bit,
}

impl LogTransformMode {
    pub fn parse(s: &str) -> LogTransformMode {
        match s.trim() {
            "" => LogTransformMode::Disabled,
            "Keep Input" => LogTransformMode::KeepInput,
            "Reduce by 2bit" => LogTransformMode::ReduceBy2Bit,
            "Reduce by 4bit" => LogTransformMode::ReduceBy4Bit,
            "Reduce by 6bit" => LogTransformMode::ReduceBy6Bit,
            "Reduce by 8bit" => LogTransformMode::ReduceBy8Bit,
            _ => LogTransformMode::KeepInput,
        }
    }

    /// Signed bit-depth adjustment relative to the source white level.
    pub fn bit_reduction(self) -> i32 {
        match self {
            LogTransformMode::Disabled | LogTransformMode::KeepInput => 0,
            LogTransformMode::ReduceBy2Bit => -2,
            LogTransformMode::ReduceBy4Bit => -4,
            LogTransformMode::ReduceBy6Bit => -6,
            LogTransformMode::ReduceBy8Bit => -8,
        }
    }
}

impl fmt::Display for LogTransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTransformMode::Disabled => write!(f, ""),
            LogTransformMode::KeepInput => write!(f, "Keep Input"),
            LogTransformMode::ReduceBy2Bit => write!(f, "Reduce by 2bit"),
            LogTransformMode::ReduceBy4Bit => write!(f, "Reduce by 4bit"),
            LogTransformMode::ReduceBy6Bit => write!(f, "Reduce by 6bit"),
            LogTransformMode::ReduceBy8Bit => write!(f, "Reduce by 8bit"),
        }
    }
}

/// Quad-Bayer handling mode.
///
/// Only the metadata-emission modes are implemented; remosaic selects the
/// plain 2x2 CFA metadata path at full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuadBayerMode {
    #[default]
    Remosaic,

    /// Emit plain 2x2 CFA metadata even though the data is Quad-Bayer
    WrongCfaMetadata,

    /// Emit a correct 4x4 CFA repeat pattern for the Quad-Bayer layout
    CorrectQbCfaMetadata,
}

impl QuadBayerMode {
    pub fn parse(s: &str) -> QuadBayerMode {
        match s.trim() {
            "Remosaic" => QuadBayerMode::Remosaic,
            "Wrong CFA Metadata" => QuadBayerMode::WrongCfaMetadata,
            "Correct QBCFA Metadata" => QuadBayerMode::CorrectQbCfaMetadata,
            _ => QuadBayerMode::Remosaic,
        }
    }
}

impl fmt::Display for QuadBayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuadBayerMode::Remosaic => write!(f, "Remosaic"),
            QuadBayerMode::WrongCfaMetadata => write!(f, "Wrong CFA Metadata"),
            QuadBayerMode::CorrectQbCfaMetadata => write!(f, "Correct QBCFA Metadata"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfr_target_parse_roundtrip() {
        for s in ["", "Prefer Integer", "Prefer Drop Frame", "Median (Slowmotion)", "Average (Testing)"] {
            assert_eq!(CfrTarget::parse(s).to_string(), s);
        }
    }

    #[test]
    fn test_cfr_target_parse_custom() {
        assert_eq!(CfrTarget::parse("47.95"), CfrTarget::Custom(47.95));
        // Garbage falls back to the default mode
        assert_eq!(CfrTarget::parse("whatever"), CfrTarget::PreferDropFrame);
    }

    #[test]
    fn test_log_transform_parse() {
        assert_eq!(LogTransformMode::parse(""), LogTransformMode::Disabled);
        assert_eq!(LogTransformMode::parse("Keep Input"), LogTransformMode::KeepInput);
        assert_eq!(LogTransformMode::parse("Reduce by 6bit"), LogTransformMode::ReduceBy6Bit);
        assert_eq!(LogTransformMode::parse("bogus"), LogTransformMode::KeepInput);
    }

    #[test]
    fn test_log_transform_bit_reduction() {
        assert_eq!(LogTransformMode::KeepInput.bit_reduction(), 0);
        assert_eq!(LogTransformMode::ReduceBy8Bit.bit_reduction(), -8);
    }

    #[test]
    fn test_quad_bayer_parse() {
        assert_eq!(QuadBayerMode::parse("Wrong CFA Metadata"), QuadBayerMode::WrongCfaMetadata);
        assert_eq!(QuadBayerMode::parse("Correct QBCFA Metadata"), QuadBayerMode::CorrectQbCfaMetadata);
        assert_eq!(QuadBayerMode::parse("???"), QuadBayerMode::Remosaic);
    }
}
