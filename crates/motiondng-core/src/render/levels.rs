//! Crop and black/white level selection.

use crate::bitpack::bits_needed;
use crate::container::{ClipMetadata, FrameMeta};
use crate::models::{LogTransformMode, RenderOptions};

/// Parse a `"WxH"` crop target. Malformed strings are ignored.
pub fn parse_crop_target(target: &str) -> Option<(u32, u32)> {
    let (w, h) = target.trim().split_once(['x', 'X'])?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Parse a `"<white>/<black>"` levels override, where `<black>` is either a
/// single value or four comma-separated values.
fn parse_levels_override(levels: &str) -> Option<([f32; 4], f32)> {
    let (white_str, black_str) = levels.split_once('/')?;
    let white = white_str.trim().parse::<f32>().ok()?;

    let mut black = [0.0f32; 4];
    if black_str.contains(',') {
        for (slot, part) in black.iter_mut().zip(black_str.split(',')) {
            *slot = part.trim().parse::<f32>().ok()?;
        }
    } else {
        let value = black_str.trim().parse::<f32>().ok()?;
        black = [value; 4];
    }

    Some((black, white))
}

/// Select the source black/white levels per the levels mode string:
/// `"Dynamic"` (per-frame values), `"Static"` (container values) or an
/// explicit `"<white>/<black>"` override.
pub fn select_levels(
    meta: &ClipMetadata,
    frame_meta: &FrameMeta,
    levels: &str,
) -> ([f32; 4], f32) {
    if levels == "Static" {
        return (meta.black_level, meta.white_level);
    }

    if levels != "Dynamic" && !levels.is_empty() {
        if let Some(parsed) = parse_levels_override(levels) {
            return parsed;
        }
    }

    // Dynamic: per-frame levels when present, container levels otherwise
    let mut black = meta.black_level;
    if let Some(dynamic) = &frame_meta.dynamic_black_level {
        for (slot, &v) in black.iter_mut().zip(dynamic.iter()) {
            *slot = v;
        }
    }
    let white = frame_meta.dynamic_white_level.unwrap_or(meta.white_level);

    (black, white)
}

/// Destination levels and implied bit depth.
///
/// Applying the shading map raises the working precision by two bits (the
/// gains push values past the source white point); log modes trade bits
/// for the curve. The normalized-shading path keeps the source white level
/// since the map tops out at 1. The black level is zeroed whenever pixels
/// are rewritten.
pub fn destination_levels(
    src_black: [f32; 4],
    src_white: f32,
    options: RenderOptions,
    log_transform: LogTransformMode,
) -> ([f32; 4], f32) {
    let mut dst_black = src_black;
    let mut dst_white = src_white;

    let apply_shading = options.contains(RenderOptions::APPLY_VIGNETTE);
    let normalize = options.contains(RenderOptions::NORMALIZE_SHADING);
    let debug_shading = options.contains(RenderOptions::DEBUG_SHADING);

    let widen = |delta: i32| -> f32 {
        let bits = (bits_needed(src_white as u16) as i32 + delta).clamp(1, 16);
        2.0f32.powi(bits) - 1.0
    };

    if apply_shading {
        if !normalize && !debug_shading {
            dst_white = match log_transform {
                LogTransformMode::Disabled => widen(2),
                LogTransformMode::KeepInput => widen(0),
                reduced => widen(reduced.bit_reduction()),
            };
        }
        dst_black = [0.0; 4];
    } else if log_transform != LogTransformMode::Disabled {
        if log_transform.bit_reduction() != 0 {
            dst_white = widen(log_transform.bit_reduction());
        }
        dst_black = [0.0; 4];
    }

    (dst_black, dst_white)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crop_target() {
        assert_eq!(parse_crop_target("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_crop_target("3840X2160"), Some((3840, 2160)));
        assert_eq!(parse_crop_target(""), None);
        assert_eq!(parse_crop_target("0x0"), None);
        assert_eq!(parse_crop_target("1920"), None);
        assert_eq!(parse_crop_target("WxH"), None);
    }

    #[test]
    fn test_parse_levels_override() {
        assert_eq!(parse_levels_override("1023/64"), Some(([64.0; 4], 1023.0)));
        assert_eq!(
            parse_levels_override("4095/60,61,62,63"),
            Some(([60.0, 61.0, 62.0, 63.0], 4095.0))
        );
        assert_eq!(parse_levels_override("4095.5/64.25"), Some(([64.25; 4], 4095.5)));
        assert_eq!(parse_levels_override("Dynamic"), None);
        assert_eq!(parse_levels_override("1000/a,b,c,d"), None);
    }

    fn test_meta() -> ClipMetadata {
        use crate::container::McrawParser;
        // Cheapest way to get a ClipMetadata: parse a minimal container
        let json = br#"{"width":64,"height":64,"sensorArrangement":"rggb","blackLevel":[64,64,64,64],"whiteLevel":1023}"#;
        let mut data = json.to_vec();
        data.extend_from_slice(&vec![0u8; 64 * 64 * 2]);
        McrawParser::open(&data).unwrap().metadata().clone()
    }

    #[test]
    fn test_select_levels_modes() {
        let meta = test_meta();
        let frame = FrameMeta {
            dynamic_black_level: Some(vec![60.0, 61.0, 62.0, 63.0]),
            dynamic_white_level: Some(1000.0),
            ..Default::default()
        };

        let (black, white) = select_levels(&meta, &frame, "Dynamic");
        assert_eq!(black, [60.0, 61.0, 62.0, 63.0]);
        assert_eq!(white, 1000.0);

        let (black, white) = select_levels(&meta, &frame, "Static");
        assert_eq!(black, [64.0; 4]);
        assert_eq!(white, 1023.0);

        let (black, white) = select_levels(&meta, &frame, "900/50");
        assert_eq!(black, [50.0; 4]);
        assert_eq!(white, 900.0);

        // Dynamic falls back to container levels when the frame carries none
        let (black, white) = select_levels(&meta, &FrameMeta::default(), "Dynamic");
        assert_eq!(black, [64.0; 4]);
        assert_eq!(white, 1023.0);
    }

    #[test]
    fn test_destination_levels_linear_shading() {
        // 10-bit white plus two headroom bits
        let (black, white) = destination_levels(
            [64.0; 4],
            1023.0,
            RenderOptions::APPLY_VIGNETTE,
            LogTransformMode::Disabled,
        );
        assert_eq!(black, [0.0; 4]);
        assert_eq!(white, 4095.0);
    }

    #[test]
    fn test_destination_levels_normalized_shading_keeps_white() {
        let (black, white) = destination_levels(
            [64.0; 4],
            1023.0,
            RenderOptions::APPLY_VIGNETTE | RenderOptions::NORMALIZE_SHADING,
            LogTransformMode::Disabled,
        );
        assert_eq!(black, [0.0; 4]);
        assert_eq!(white, 1023.0);
    }

    #[test]
    fn test_destination_levels_log_reduction() {
        let (black, white) = destination_levels(
            [64.0; 4],
            1023.0,
            RenderOptions::APPLY_VIGNETTE | RenderOptions::LOG_TRANSFORM,
            LogTransformMode::ReduceBy2Bit,
        );
        assert_eq!(black, [0.0; 4]);
        assert_eq!(white, 255.0);

        // Without shading, KeepInput leaves the white level alone
        let (black, white) = destination_levels(
            [64.0; 4],
            1023.0,
            RenderOptions::LOG_TRANSFORM,
            LogTransformMode::KeepInput,
        );
        assert_eq!(black, [0.0; 4]);
        assert_eq!(white, 1023.0);
    }

    #[test]
    fn test_destination_levels_untouched_without_options() {
        let (black, white) = destination_levels(
            [64.0; 4],
            1023.0,
            RenderOptions::NONE,
            LogTransformMode::Disabled,
        );
        assert_eq!(black, [64.0; 4]);
        assert_eq!(white, 1023.0);
    }
}
