//! Render option flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Bitfield of boolean render options. Combine with `|`; test with
/// [`RenderOptions::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RenderOptions(u32);

impl RenderOptions {
    pub const NONE: RenderOptions = RenderOptions(0);

    /// Downscale output by the draft scale factor
    pub const DRAFT: RenderOptions = RenderOptions(1 << 0);

    /// Apply the lens shading map to pixel data
    pub const APPLY_VIGNETTE: RenderOptions = RenderOptions(1 << 1);

    /// Normalize the shading map by its global maximum before applying
    pub const NORMALIZE_SHADING: RenderOptions = RenderOptions(1 << 2);

    /// Render the inverted shading map instead of the image
    pub const DEBUG_SHADING: RenderOptions = RenderOptions(1 << 3);

    /// Reduce the shading map to its color-cast component
    pub const VIGNETTE_ONLY_COLOR: RenderOptions = RenderOptions(1 << 4);

    /// Normalize auto-exposure variation across frames via BaselineExposure
    pub const NORMALIZE_EXPOSURE: RenderOptions = RenderOptions(1 << 5);

    /// Remap variable timestamps to a constant framerate
    pub const FRAMERATE_CONVERSION: RenderOptions = RenderOptions(1 << 6);

    /// Center-crop to the crop target
    pub const CROPPING: RenderOptions = RenderOptions(1 << 7);

    /// Write the camera model override into the DNG
    pub const CAMMODEL_OVERRIDE: RenderOptions = RenderOptions(1 << 8);

    /// Apply the logarithmic transfer curve
    pub const LOG_TRANSFORM: RenderOptions = RenderOptions(1 << 9);

    /// Treat the sensor data as Quad-Bayer
    pub const INTERPRET_AS_QUAD_BAYER: RenderOptions = RenderOptions(1 << 10);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> RenderOptions {
        RenderOptions(bits & 0x7ff)
    }

    pub fn contains(self, other: RenderOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RenderOptions {
    type Output = RenderOptions;

    fn bitor(self, rhs: RenderOptions) -> RenderOptions {
        RenderOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for RenderOptions {
    fn bitor_assign(&mut self, rhs: RenderOptions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RenderOptions {
    type Output = RenderOptions;

    fn bitand(self, rhs: RenderOptions) -> RenderOptions {
        RenderOptions(self.0 & rhs.0)
    }
}

impl BitAndAssign for RenderOptions {
    fn bitand_assign(&mut self, rhs: RenderOptions) {
        self.0 &= rhs.0;
    }
}

impl Not for RenderOptions {
    type Output = RenderOptions;

    fn not(self) -> RenderOptions {
        RenderOptions(!self.0 & 0x7ff)
    }
}

const FLAG_NAMES: &[(RenderOptions, &str)] = &[
    (RenderOptions::DRAFT, "DRAFT"),
    (RenderOptions::APPLY_VIGNETTE, "VIGNETTE_CORRECTION"),
    (RenderOptions::VIGNETTE_ONLY_COLOR, "VIGNETTE_ONLY_COLOR"),
    (RenderOptions::NORMALIZE_SHADING, "NORMALIZE_SHADING_MAP"),
    (RenderOptions::DEBUG_SHADING, "DEBUG_SHADING_MAP"),
    (RenderOptions::NORMALIZE_EXPOSURE, "NORMALIZE_EXPOSURE"),
    (RenderOptions::FRAMERATE_CONVERSION, "FRAMERATE_CONVERSION"),
    (RenderOptions::CROPPING, "CROPPING"),
    (RenderOptions::CAMMODEL_OVERRIDE, "CAMMODEL_OVERRIDE"),
    (RenderOptions::LOG_TRANSFORM, "LOG_TRANSFORM"),
    (RenderOptions::INTERPRET_AS_QUAD_BAYER, "INTERPRET_AS_QUAD_BAYER"),
];

impl fmt::Display for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (flag, name) in FLAG_NAMES {
            if self.contains(*flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}
