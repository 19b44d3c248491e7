//! Clip and per-frame metadata.
//!
//! The container embeds one JSON document describing the whole clip, and
//! may annotate individual frames with small JSON fragments carried in
//! type-3 blocks. The raw serde shapes below mirror the recorder's key
//! names; [`ClipMetadata`] is the normalized form the pipeline consumes.

use serde::Deserialize;

use crate::error::{RenderError, Result};
use crate::shading::ShadingMap;

/// Bayer color filter arrangement. Fixed for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CfaPattern {
    #[default]
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

impl CfaPattern {
    pub fn parse(s: &str) -> Result<CfaPattern> {
        match s.to_ascii_lowercase().as_str() {
            "rggb" => Ok(CfaPattern::Rggb),
            "bggr" => Ok(CfaPattern::Bggr),
            "grbg" => Ok(CfaPattern::Grbg),
            "gbrg" => Ok(CfaPattern::Gbrg),
            other => Err(RenderError::ContainerInvalid(format!(
                "invalid sensor arrangement '{}'",
                other
            ))),
        }
    }

    /// Plane colors of the 2x2 repeat pattern (0 = R, 1 = G, 2 = B).
    pub fn color_indices(self) -> [u8; 4] {
        match self {
            CfaPattern::Rggb => [0, 1, 1, 2],
            CfaPattern::Bggr => [2, 1, 1, 0],
            CfaPattern::Grbg => [1, 0, 2, 1],
            CfaPattern::Gbrg => [1, 2, 0, 1],
        }
    }

    /// The 4x4 repeat pattern of the Quad-Bayer layout, where every color
    /// site covers a 2x2 cluster.
    pub fn quad_color_indices(self) -> [u8; 16] {
        match self {
            CfaPattern::Rggb => [0, 0, 1, 1, 0, 0, 1, 1, 1, 1, 2, 2, 1, 1, 2, 2],
            CfaPattern::Bggr => [2, 2, 1, 1, 2, 2, 1, 1, 1, 1, 0, 0, 1, 1, 0, 0],
            CfaPattern::Grbg => [1, 1, 0, 0, 1, 1, 0, 0, 2, 2, 1, 1, 2, 2, 1, 1],
            CfaPattern::Gbrg => [1, 1, 2, 2, 1, 1, 2, 2, 0, 0, 1, 1, 0, 0, 1, 1],
        }
    }
}

/// Device orientation at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    ReversePortrait,
    ReverseLandscape,
    Unknown,
}

impl Orientation {
    pub fn parse(s: &str) -> Orientation {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "landscape" => Orientation::Landscape,
            "portrait" => Orientation::Portrait,
            "reverseportrait" => Orientation::ReversePortrait,
            "reverselandscape" => Orientation::ReverseLandscape,
            _ => Orientation::Unknown,
        }
    }
}

/// How confident the parser is in its frame index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionConfidence {
    Low,
    Medium,
    High,
}

impl DetectionConfidence {
    pub fn from_frame_count(frames: usize) -> DetectionConfidence {
        if frames > 100 {
            DetectionConfidence::High
        } else if frames > 20 {
            DetectionConfidence::Medium
        } else {
            DetectionConfidence::Low
        }
    }
}

fn default_one_f64() -> f64 {
    1.0
}

/// Raw clip metadata as stored in the container JSON.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawClipMeta {
    pub width: u32,
    pub height: u32,

    #[serde(alias = "originalWidth")]
    pub original_width: u32,
    #[serde(alias = "originalHeight")]
    pub original_height: u32,

    #[serde(alias = "bitsPerSample")]
    pub bits_per_sample: u16,

    #[serde(alias = "sensorArrangement", alias = "sensorArrangment")]
    pub sensor_arrangement: String,

    pub iso: f64,
    #[serde(alias = "exposureTime")]
    pub exposure_time: f64,
    #[serde(default = "default_one_f64")]
    pub aperture: f64,
    #[serde(alias = "focalLength")]
    pub focal_length: f64,
    pub orientation: String,

    #[serde(alias = "colorMatrix1")]
    pub color_matrix_1: Vec<f32>,
    #[serde(alias = "colorMatrix2")]
    pub color_matrix_2: Vec<f32>,
    #[serde(alias = "forwardMatrix1")]
    pub forward_matrix_1: Vec<f32>,
    #[serde(alias = "forwardMatrix2")]
    pub forward_matrix_2: Vec<f32>,
    #[serde(alias = "asShotNeutral")]
    pub as_shot_neutral: Vec<f32>,
    #[serde(alias = "colorIlluminant1")]
    pub color_illuminant_1: String,
    #[serde(alias = "colorIlluminant2")]
    pub color_illuminant_2: String,

    #[serde(alias = "blackLevel")]
    pub black_level: Vec<f32>,
    #[serde(alias = "whiteLevel")]
    pub white_level: f32,

    #[serde(alias = "lensShadingMap")]
    pub lens_shading_map: Vec<Vec<f32>>,
    #[serde(alias = "lensShadingMapWidth")]
    pub lens_shading_map_width: u32,
    #[serde(alias = "lensShadingMapHeight")]
    pub lens_shading_map_height: u32,

    #[serde(alias = "needRemosaic")]
    pub need_remosaic: bool,
    #[serde(alias = "quadBayer")]
    pub quad_bayer: bool,

    #[serde(alias = "numSegments")]
    pub num_segments: u32,

    #[serde(alias = "deviceModel", alias = "buildModel")]
    pub device_model: String,

    pub flipped: bool,
    #[serde(alias = "extraData")]
    pub extra_data: Option<RawExtraData>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawExtraData {
    #[serde(alias = "postProcessSettings")]
    pub post_process_settings: RawPostProcessSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawPostProcessSettings {
    pub flipped: bool,
    pub metadata: RawDeviceMetadata,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawDeviceMetadata {
    #[serde(alias = "buildModel")]
    pub build_model: String,
}

/// Per-frame metadata fragment carried in a type-3 block ahead of its
/// frame block.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct FrameMeta {
    pub timestamp: Option<u64>,
    pub iso: Option<f64>,
    #[serde(alias = "exposureTime")]
    pub exposure_time: Option<f64>,
    #[serde(alias = "dynamicBlackLevel")]
    pub dynamic_black_level: Option<Vec<f32>>,
    #[serde(alias = "dynamicWhiteLevel")]
    pub dynamic_white_level: Option<f32>,
}

/// Normalized clip metadata consumed by the render pipeline.
#[derive(Debug, Clone)]
pub struct ClipMetadata {
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub bits_per_sample: u16,
    pub cfa: CfaPattern,

    pub iso: f64,
    /// Exposure time in nanoseconds
    pub exposure_time: f64,
    pub aperture: f64,
    pub focal_length: f64,
    pub orientation: Orientation,
    pub flipped: bool,

    pub color_matrix_1: [f32; 9],
    pub color_matrix_2: [f32; 9],
    pub forward_matrix_1: [f32; 9],
    pub forward_matrix_2: [f32; 9],
    pub as_shot_neutral: [f32; 3],
    pub illuminant_1: String,
    pub illuminant_2: String,

    pub black_level: [f32; 4],
    pub white_level: f32,

    pub shading_map: ShadingMap,

    pub need_remosaic: bool,
    pub has_quad_bayer: bool,
    pub num_segments: u32,
    pub device_model: String,
}

fn matrix9(v: &[f32]) -> [f32; 9] {
    let mut m = [0.0f32; 9];
    for (dst, src) in m.iter_mut().zip(v.iter()) {
        *dst = *src;
    }
    m
}

impl ClipMetadata {
    pub(crate) fn from_raw(raw: RawClipMeta) -> Result<ClipMetadata> {
        if raw.width == 0 || raw.height == 0 {
            return Err(RenderError::ContainerInvalid(
                "metadata is missing frame geometry".to_string(),
            ));
        }

        let cfa = if raw.sensor_arrangement.is_empty() {
            CfaPattern::Rggb
        } else {
            CfaPattern::parse(&raw.sensor_arrangement)?
        };

        let mut black_level = [0.0f32; 4];
        match raw.black_level.len() {
            0 => {}
            1 => black_level = [raw.black_level[0]; 4],
            _ => {
                for (dst, src) in black_level.iter_mut().zip(raw.black_level.iter()) {
                    *dst = *src;
                }
            }
        }

        let mut as_shot_neutral = [1.0f32; 3];
        for (dst, src) in as_shot_neutral.iter_mut().zip(raw.as_shot_neutral.iter()) {
            *dst = *src;
        }

        let shading_map = if raw.lens_shading_map.is_empty()
            || raw.lens_shading_map_width == 0
            || raw.lens_shading_map_height == 0
        {
            ShadingMap::identity()
        } else {
            ShadingMap::new(
                raw.lens_shading_map,
                raw.lens_shading_map_width as usize,
                raw.lens_shading_map_height as usize,
            )
        };

        let (flipped, build_model) = match &raw.extra_data {
            Some(extra) => (
                raw.flipped || extra.post_process_settings.flipped,
                extra.post_process_settings.metadata.build_model.clone(),
            ),
            None => (raw.flipped, String::new()),
        };

        let device_model = if raw.device_model.is_empty() {
            build_model
        } else {
            raw.device_model
        };

        Ok(ClipMetadata {
            width: raw.width,
            height: raw.height,
            original_width: if raw.original_width > 0 { raw.original_width } else { raw.width },
            original_height: if raw.original_height > 0 { raw.original_height } else { raw.height },
            bits_per_sample: if raw.bits_per_sample > 0 { raw.bits_per_sample } else { 16 },
            cfa,
            iso: raw.iso,
            exposure_time: raw.exposure_time,
            aperture: raw.aperture,
            focal_length: raw.focal_length,
            orientation: Orientation::parse(&raw.orientation),
            flipped,
            color_matrix_1: matrix9(&raw.color_matrix_1),
            color_matrix_2: matrix9(&raw.color_matrix_2),
            forward_matrix_1: matrix9(&raw.forward_matrix_1),
            forward_matrix_2: matrix9(&raw.forward_matrix_2),
            as_shot_neutral,
            illuminant_1: raw.color_illuminant_1,
            illuminant_2: raw.color_illuminant_2,
            black_level,
            white_level: if raw.white_level > 0.0 { raw.white_level } else { 65535.0 },
            shading_map,
            need_remosaic: raw.need_remosaic,
            has_quad_bayer: raw.quad_bayer || raw.need_remosaic,
            num_segments: raw.num_segments,
            device_model,
        })
    }
}
