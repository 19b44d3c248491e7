//! Render settings for the processing pipeline.

mod enums;
mod options;


use serde::{Deserialize, Serialize};

pub use enums::{CfrTarget, LogTransformMode, QuadBayerMode};
pub use options::RenderOptions;

/// A snapshot of every render option. Value-typed and cheap to clone;
/// the orchestrator captures one per job and never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Enabled render option flags
    pub options: RenderOptions,

    /// Draft mode downscale factor (1, 2, 4 or 8)
    pub draft_scale: u32,

    /// Constant-framerate conversion target
    pub cfr_target: CfrTarget,

    /// Crop target as "WxH", or empty for no crop
    pub crop_target: String,

    /// Camera model override name (used when CAMMODEL_OVERRIDE is set)
    pub camera_model: String,

    /// Level selection: "Dynamic", "Static" or "<white>/<black-list>"
    pub levels: String,

    /// Logarithmic transfer encoding mode
    pub log_transform: LogTransformMode,

    /// Exposure compensation in EV, e.g. "0ev" or "0.5"
    pub exposure_compensation: String,

    /// Quad-Bayer handling mode
    pub quad_bayer_option: QuadBayerMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            options: RenderOptions::NONE,
            draft_scale: 1,
            cfr_target: CfrTarget::PreferDropFrame,
            crop_target: String::new(),
            camera_model: "Panasonic".to_string(),
            levels: "Dynamic".to_string(),
            log_transform: LogTransformMode::KeepInput,
            exposure_compensation: "0ev".to_string(),
            quad_bayer_option: QuadBayerMode::Remosaic,
        }
    }
}

impl RenderSettings {
    /// Content hash over the canonical byte form of every option. Used as
    /// the cache and single-flight key component; two snapshots with the
    /// same fingerprint render identical bytes.
    pub fn fingerprint(&self) -> u64 {
        let mut hash = Fnv1a::new();
        hash.write_u32(self.options.bits());
        hash.write_u32(self.draft_scale);
        hash.write_str(&self.cfr_target.to_string());
        hash.write_str(&self.crop_target);
        hash.write_str(&self.camera_model);
        hash.write_str(&self.levels);
        hash.write_str(&self.log_transform.to_string());
        hash.write_str(&self.exposure_compensation);
        hash.write_str(&self.quad_bayer_option.to_string());
        hash.finish()
    }

    /// Numeric EV parsed from the leading float of `exposure_compensation`
    /// ("0.5ev" -> 0.5). Unparseable values count as 0.
    pub fn exposure_compensation_ev(&self) -> f32 {
        parse_float_prefix(&self.exposure_compensation).unwrap_or(0.0)
    }
}

/// Parse the leading decimal float of a string, ignoring a trailing suffix
/// such as "ev".
pub(crate) fn parse_float_prefix(s: &str) -> Option<f32> {
    let s = s.trim();
    let mut end = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    s[..end].parse::<f32>().ok()
}

/// FNV-1a, 64-bit. Stable across platforms and runs, unlike the std
/// hasher, which is what a persisted cache key requires.
struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Fnv1a(0xcbf2_9ce4_8422_2325)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
        // Separator so that adjacent fields cannot alias
        self.write(&[0xff]);
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
