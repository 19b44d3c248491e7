//! Cinema DNG assembly.
//!
//! Wraps a rendered frame strip in a single-image little-endian TIFF with
//! the DNG 1.4 tag set: CFA description, levels, color matrices, the
//! optional linearization table for log-encoded frames, and the lens
//! shading GainMap opcode when shading is not baked into the pixels.

mod ifd;
mod opcodes;
pub mod tags;

#[cfg(test)]
mod tests;

pub use ifd::IfdBuilder;
pub use opcodes::{serialize_opcode_list, GainMapParams};

use crate::container::{ClipMetadata, Orientation};
use crate::models::{QuadBayerMode, RenderOptions, RenderSettings};
use crate::render::RenderedFrame;

const SOFTWARE_NAME: &str = "motiondng";

/// White level advertised alongside a linearization table. The table maps
/// into the full 16-bit range but readers expect one code of headroom.
pub const LINEARIZED_WHITE_LEVEL: u32 = 65534;

/// TIFF orientation from capture orientation and the mirror flag.
pub fn tiff_orientation(orientation: Orientation, flipped: bool) -> u16 {
    match orientation {
        Orientation::Portrait => {
            if flipped {
                7 // mirror + 90 CW
            } else {
                6 // 90 CW
            }
        }
        Orientation::ReversePortrait => {
            if flipped {
                5
            } else {
                8
            }
        }
        Orientation::ReverseLandscape => {
            if flipped {
                4
            } else {
                3
            }
        }
        Orientation::Landscape => {
            if flipped {
                2
            } else {
                1
            }
        }
        Orientation::Unknown => 9,
    }
}

/// DNG CalibrationIlluminant code for a named illuminant.
pub fn illuminant_code(name: &str) -> u16 {
    match name.to_ascii_lowercase().as_str() {
        "standarda" => 17,
        "standardb" => 18,
        "standardc" => 19,
        "d55" => 20,
        "d65" => 21,
        "d75" => 22,
        "d50" => 23,
        _ => 0,
    }
}

/// Linearization table inverting the log2 transfer curve. `dst_white + 1`
/// entries; the endpoints are pinned to 0 and 65535 exactly.
pub fn linearization_table(dst_white: u16) -> Vec<u16> {
    let size = dst_white as usize + 1;
    let log61 = 61.0f64.log2();

    (0..size)
        .map(|i| {
            if i == 0 {
                0
            } else if i == size - 1 {
                65535
            } else {
                let normalized = i as f64 / dst_white as f64;
                let linear = ((2.0f64.powf(normalized * log61) - 1.0) / 60.0).clamp(0.0, 1.0);
                (linear * 65535.0).round() as u16
            }
        })
        .collect()
}

fn to_timecode_byte(value: u32) -> u8 {
    (((value / 10) << 4) | (value % 10)) as u8
}

/// BCD-packed SMPTE timecode for a frame number at the recording rate.
pub fn timecode_bytes(frame_number: u32, fps: f64) -> [u8; 8] {
    let time = frame_number as f64 / fps;

    let hours = (time / 3600.0).floor() as u32;
    let minutes = ((time / 60.0).floor() as u32) % 60;
    let seconds = (time.floor() as u32) % 60;
    let frames = if fps > 1.0 {
        frame_number % (fps.round() as u32)
    } else {
        0
    };

    let mut code = [0u8; 8];
    code[0] = to_timecode_byte(frames) & 0x3f;
    code[1] = to_timecode_byte(seconds) & 0x7f;
    code[2] = to_timecode_byte(minutes) & 0x7f;
    code[3] = to_timecode_byte(hours) & 0x3f;
    code
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Frame rate as a reduced fraction over the NTSC base, giving exact
/// ratios like 30000/1001 for 29.97.
pub fn fps_rational(fps: f64) -> (i32, i32) {
    if fps <= 0.0 {
        return (0, 1);
    }
    let numerator = (fps * 1001.0).round() as i64;
    let denominator = 1001i64;
    let divisor = gcd(numerator, denominator);
    ((numerator / divisor) as i32, (denominator / divisor) as i32)
}

fn rational(value: f64, denominator: u32) -> (u32, u32) {
    ((value * denominator as f64).round().max(0.0) as u32, denominator)
}

fn srational(value: f64, denominator: i32) -> (i32, i32) {
    ((value * denominator as f64).round() as i32, denominator)
}

fn matrix_srationals(matrix: &[f32; 9]) -> Vec<(i32, i32)> {
    matrix.iter().map(|&v| srational(v as f64, 10000)).collect()
}

fn is_zero_matrix(matrix: &[f32; 9]) -> bool {
    matrix.iter().all(|&v| v == 0.0)
}

/// Camera model names written for the override presets.
fn camera_model_tags(settings: &RenderSettings, meta: &ClipMetadata) -> (String, Option<(String, String)>) {
    let override_active = settings.options.contains(RenderOptions::CAMMODEL_OVERRIDE)
        && !settings.camera_model.is_empty();

    if override_active {
        match settings.camera_model.as_str() {
            "Blackmagic" => ("Blackmagic Pocket Cinema Camera 4K".to_string(), None),
            "Panasonic" => ("Panasonic Varicam RAW".to_string(), None),
            "Fujifilm" | "Fujifilm X-T5" => (
                "Fujifilm X-T5".to_string(),
                Some(("Fujifilm".to_string(), "X-T5".to_string())),
            ),
            other => (other.to_string(), None),
        }
    } else {
        (meta.device_model.clone(), None)
    }
}

/// Assemble the DNG byte stream for one rendered frame.
pub fn write_dng(
    frame: &RenderedFrame,
    meta: &ClipMetadata,
    settings: &RenderSettings,
    recording_fps: f64,
    frame_number: u32,
    baseline_value: f64,
) -> Vec<u8> {
    let mut ifd = IfdBuilder::new();

    ifd.put_long(tags::TAG_NEW_SUBFILE_TYPE, &[0]);
    ifd.put_long(tags::TAG_IMAGE_WIDTH, &[frame.width]);
    ifd.put_long(tags::TAG_IMAGE_LENGTH, &[frame.height]);
    ifd.put_short(tags::TAG_BITS_PER_SAMPLE, &[frame.encode_bits]);
    ifd.put_short(tags::TAG_COMPRESSION, &[tags::COMPRESSION_NONE]);
    ifd.put_short(tags::TAG_PHOTOMETRIC_INTERPRETATION, &[tags::PHOTOMETRIC_CFA]);
    ifd.put_short(
        tags::TAG_ORIENTATION,
        &[tiff_orientation(meta.orientation, meta.flipped)],
    );
    ifd.put_short(tags::TAG_SAMPLES_PER_PIXEL, &[1]);
    ifd.put_long(tags::TAG_ROWS_PER_STRIP, &[frame.height]);
    ifd.put_rational(tags::TAG_X_RESOLUTION, &[(300, 1)]);
    ifd.put_rational(tags::TAG_Y_RESOLUTION, &[(300, 1)]);
    ifd.put_short(tags::TAG_PLANAR_CONFIGURATION, &[tags::PLANAR_CONFIG_CHUNKY]);
    ifd.put_short(tags::TAG_RESOLUTION_UNIT, &[2]);
    ifd.put_ascii(tags::TAG_SOFTWARE, SOFTWARE_NAME);

    // CFA description. The correct-metadata Quad-Bayer mode advertises the
    // true 4x4 repeat pattern at full resolution; everything else writes
    // the plain 2x2 pattern.
    let interpret_quad = meta.need_remosaic
        || settings.options.contains(RenderOptions::INTERPRET_AS_QUAD_BAYER);
    if interpret_quad
        && settings.draft_scale == 1
        && settings.quad_bayer_option == QuadBayerMode::CorrectQbCfaMetadata
    {
        ifd.put_short(tags::TAG_CFA_REPEAT_PATTERN_DIM, &[4, 4]);
        ifd.put_byte(tags::TAG_CFA_PATTERN, &meta.cfa.quad_color_indices());
    } else {
        ifd.put_short(tags::TAG_CFA_REPEAT_PATTERN_DIM, &[2, 2]);
        ifd.put_byte(tags::TAG_CFA_PATTERN, &meta.cfa.color_indices());
    }
    ifd.put_byte(tags::TAG_CFA_PLANE_COLOR, &[0, 1, 2]);
    ifd.put_short(tags::TAG_CFA_LAYOUT, &[1]);

    // EXIF capture description
    ifd.put_rational(
        tags::TAG_EXPOSURE_TIME,
        &[rational(frame.exposure_time_ns / 1e9, 1_000_000)],
    );
    ifd.put_rational(tags::TAG_F_NUMBER, &[rational(meta.aperture, 100)]);
    ifd.put_short(tags::TAG_ISO_SPEED_RATINGS, &[frame.iso.round() as u16]);
    ifd.put_rational(tags::TAG_FOCAL_LENGTH, &[rational(meta.focal_length, 100)]);

    ifd.put_byte(tags::TAG_DNG_VERSION, &[1, 4, 0, 0]);
    ifd.put_byte(tags::TAG_DNG_BACKWARD_VERSION, &[1, 1, 0, 0]);

    let (unique_model, make_model) = camera_model_tags(settings, meta);
    ifd.put_ascii(tags::TAG_UNIQUE_CAMERA_MODEL, &unique_model);
    if let Some((make, model)) = make_model {
        ifd.put_ascii(tags::TAG_MAKE, &make);
        ifd.put_ascii(tags::TAG_MODEL, &model);
    }

    // Levels. A log-encoded frame advertises linear semantics through the
    // table; its stored black point is zero.
    ifd.put_short(tags::TAG_BLACK_LEVEL_REPEAT_DIM, &[2, 2]);
    if frame.log_applied {
        ifd.put_short(tags::TAG_LINEARIZATION_TABLE, &linearization_table(frame.white_level));
        ifd.put_short(tags::TAG_BLACK_LEVEL, &[0, 0, 0, 0]);
        ifd.put_long(tags::TAG_WHITE_LEVEL, &[LINEARIZED_WHITE_LEVEL]);
    } else {
        ifd.put_short(tags::TAG_BLACK_LEVEL, &frame.black_level);
        ifd.put_long(tags::TAG_WHITE_LEVEL, &[frame.white_level as u32]);
    }

    // Colorimetry; all-zero matrices are omitted
    if !is_zero_matrix(&meta.color_matrix_1) {
        ifd.put_srational(tags::TAG_COLOR_MATRIX_1, &matrix_srationals(&meta.color_matrix_1));
    }
    if !is_zero_matrix(&meta.color_matrix_2) {
        ifd.put_srational(tags::TAG_COLOR_MATRIX_2, &matrix_srationals(&meta.color_matrix_2));
    }
    if !is_zero_matrix(&meta.forward_matrix_1) {
        ifd.put_srational(tags::TAG_FORWARD_MATRIX_1, &matrix_srationals(&meta.forward_matrix_1));
    }
    if !is_zero_matrix(&meta.forward_matrix_2) {
        ifd.put_srational(tags::TAG_FORWARD_MATRIX_2, &matrix_srationals(&meta.forward_matrix_2));
    }

    let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    ifd.put_srational(tags::TAG_CAMERA_CALIBRATION_1, &matrix_srationals(&identity));
    ifd.put_srational(tags::TAG_CAMERA_CALIBRATION_2, &matrix_srationals(&identity));

    ifd.put_rational(
        tags::TAG_AS_SHOT_NEUTRAL,
        &[
            rational(meta.as_shot_neutral[0] as f64, 1_000_000),
            rational(meta.as_shot_neutral[1] as f64, 1_000_000),
            rational(meta.as_shot_neutral[2] as f64, 1_000_000),
        ],
    );

    ifd.put_short(
        tags::TAG_CALIBRATION_ILLUMINANT_1,
        &[illuminant_code(&meta.illuminant_1)],
    );
    ifd.put_short(
        tags::TAG_CALIBRATION_ILLUMINANT_2,
        &[illuminant_code(&meta.illuminant_2)],
    );

    // Exposure normalization rides on BaselineExposure; the Panasonic
    // preset carries a fixed -2 EV offset on top.
    let mut exposure_offset = if settings.options.contains(RenderOptions::CAMMODEL_OVERRIDE)
        && settings.camera_model == "Panasonic"
    {
        -2.0
    } else {
        0.0
    };
    exposure_offset += settings.exposure_compensation_ev() as f64;

    let baseline = if settings.options.contains(RenderOptions::NORMALIZE_EXPOSURE)
        && frame.iso > 0.0
        && frame.exposure_time_ns > 0.0
        && baseline_value > 0.0
    {
        (baseline_value / (frame.iso * frame.exposure_time_ns)).log2() + exposure_offset
    } else {
        exposure_offset
    };
    ifd.put_srational(tags::TAG_BASELINE_EXPOSURE, &[srational(baseline, 100)]);

    ifd.put_long(tags::TAG_ACTIVE_AREA, &[0, 0, frame.height, frame.width]);

    if let Some(gain_map) = &frame.gain_map {
        ifd.put_undefined(tags::TAG_OPCODE_LIST_2, &serialize_opcode_list(gain_map));
    }

    ifd.put_byte(tags::TAG_TIME_CODES, &timecode_bytes(frame_number, recording_fps));
    ifd.put_srational(tags::TAG_FRAME_RATE, &[fps_rational(recording_fps)]);

    ifd.build(&frame.data)
}
