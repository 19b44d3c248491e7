//! Render settings construction from command line flags.

use clap::Args;
use motiondng_core::{CfrTarget, LogTransformMode, QuadBayerMode, RenderOptions, RenderSettings};

/// Render options shared by the `decode` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RenderOptionArgs {
    /// Draft mode downscale factor (2, 4 or 8)
    #[arg(long, value_name = "SCALE")]
    pub draft: Option<u32>,

    /// Apply lens shading (vignette) correction to pixel data
    #[arg(long)]
    pub vignette: bool,

    /// Reduce the shading map to color correction only
    #[arg(long)]
    pub vignette_only_color: bool,

    /// Normalize the shading map by its global maximum
    #[arg(long)]
    pub normalize_shading: bool,

    /// Render the inverted shading map (inspection aid)
    #[arg(long)]
    pub debug_shading: bool,

    /// Normalize exposure across frames via BaselineExposure
    #[arg(long)]
    pub normalize_exposure: bool,

    /// Constant framerate target: "Prefer Drop Frame", "Prefer Integer",
    /// "Median (Slowmotion)", "Average (Testing)" or a number
    #[arg(long, value_name = "TARGET")]
    pub cfr: Option<String>,

    /// Center-crop to WxH
    #[arg(long, value_name = "WxH")]
    pub crop: Option<String>,

    /// Camera model override ("Blackmagic", "Panasonic", "Fujifilm", ...)
    #[arg(long, value_name = "MODEL")]
    pub camera_model: Option<String>,

    /// Level selection: "Dynamic", "Static" or "<white>/<black>"
    #[arg(long, value_name = "MODE", default_value = "Dynamic")]
    pub levels: String,

    /// Log transfer curve: "Keep Input" or "Reduce by 2bit" ... "Reduce by 8bit"
    #[arg(long, value_name = "MODE")]
    pub log_transform: Option<String>,

    /// Exposure compensation in EV, e.g. "0.5ev"
    #[arg(long, value_name = "EV", default_value = "0ev")]
    pub exposure: String,

    /// Interpret the sensor data as Quad-Bayer, with the given metadata
    /// mode: "Remosaic", "Wrong CFA Metadata" or "Correct QBCFA Metadata"
    #[arg(long, value_name = "MODE", num_args = 0..=1, default_missing_value = "Wrong CFA Metadata")]
    pub quad_bayer: Option<String>,
}

/// Translate parsed flags into a settings snapshot.
pub fn build_render_settings(args: &RenderOptionArgs) -> Result<RenderSettings, String> {
    let mut settings = RenderSettings::default();
    let mut options = RenderOptions::NONE;

    if let Some(scale) = args.draft {
        if !matches!(scale, 1 | 2 | 4 | 8) {
            return Err(format!("invalid draft scale {} (expected 1, 2, 4 or 8)", scale));
        }
        if scale > 1 {
            options |= RenderOptions::DRAFT;
        }
        settings.draft_scale = scale;
    }

    if args.vignette {
        options |= RenderOptions::APPLY_VIGNETTE;
    }
    if args.vignette_only_color {
        options |= RenderOptions::VIGNETTE_ONLY_COLOR;
    }
    if args.normalize_shading {
        options |= RenderOptions::NORMALIZE_SHADING;
    }
    if args.debug_shading {
        options |= RenderOptions::DEBUG_SHADING;
    }
    if args.normalize_exposure {
        options |= RenderOptions::NORMALIZE_EXPOSURE;
    }

    if let Some(cfr) = &args.cfr {
        options |= RenderOptions::FRAMERATE_CONVERSION;
        settings.cfr_target = CfrTarget::parse(cfr);
    }

    if let Some(crop) = &args.crop {
        if motiondng_core::render::parse_crop_target(crop).is_none() {
            return Err(format!("invalid crop target '{}' (expected WxH)", crop));
        }
        options |= RenderOptions::CROPPING;
        settings.crop_target = crop.clone();
    }

    if let Some(model) = &args.camera_model {
        options |= RenderOptions::CAMMODEL_OVERRIDE;
        settings.camera_model = model.clone();
    }

    settings.levels = args.levels.clone();

    if let Some(mode) = &args.log_transform {
        options |= RenderOptions::LOG_TRANSFORM;
        settings.log_transform = LogTransformMode::parse(mode);
    }

    settings.exposure_compensation = args.exposure.clone();

    if let Some(mode) = &args.quad_bayer {
        options |= RenderOptions::INTERPRET_AS_QUAD_BAYER;
        settings.quad_bayer_option = QuadBayerMode::parse(mode);
    }

    settings.options = options;
    Ok(settings)
}

/// Parse a `start:end` frame range (end exclusive, both optional).
pub fn parse_frame_range(range: &str) -> Result<(usize, Option<usize>), String> {
    let (start_str, end_str) = range
        .split_once(':')
        .ok_or_else(|| format!("invalid frame range '{}' (expected start:end)", range))?;

    let start = if start_str.is_empty() {
        0
    } else {
        start_str
            .parse::<usize>()
            .map_err(|_| format!("invalid frame range start '{}'", start_str))?
    };

    let end = if end_str.is_empty() {
        None
    } else {
        let end = end_str
            .parse::<usize>()
            .map_err(|_| format!("invalid frame range end '{}'", end_str))?;
        if end <= start {
            return Err(format!("empty frame range '{}'", range));
        }
        Some(end)
    };

    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_yield_default_settings() {
        let settings = build_render_settings(&RenderOptionArgs {
            levels: "Dynamic".to_string(),
            exposure: "0ev".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(settings.options, RenderOptions::NONE);
        assert_eq!(settings.draft_scale, 1);
        assert_eq!(settings.levels, "Dynamic");
    }

    #[test]
    fn test_flags_map_to_options() {
        let args = RenderOptionArgs {
            draft: Some(4),
            vignette: true,
            normalize_exposure: true,
            cfr: Some("Prefer Drop Frame".to_string()),
            crop: Some("1920x1080".to_string()),
            camera_model: Some("Panasonic".to_string()),
            levels: "Static".to_string(),
            log_transform: Some("Reduce by 2bit".to_string()),
            exposure: "0.5ev".to_string(),
            quad_bayer: Some("Correct QBCFA Metadata".to_string()),
            ..Default::default()
        };

        let settings = build_render_settings(&args).unwrap();
        let options = settings.options;

        assert!(options.contains(RenderOptions::DRAFT));
        assert!(options.contains(RenderOptions::APPLY_VIGNETTE));
        assert!(options.contains(RenderOptions::NORMALIZE_EXPOSURE));
        assert!(options.contains(RenderOptions::FRAMERATE_CONVERSION));
        assert!(options.contains(RenderOptions::CROPPING));
        assert!(options.contains(RenderOptions::CAMMODEL_OVERRIDE));
        assert!(options.contains(RenderOptions::LOG_TRANSFORM));
        assert!(options.contains(RenderOptions::INTERPRET_AS_QUAD_BAYER));

        assert_eq!(settings.draft_scale, 4);
        assert_eq!(settings.cfr_target, CfrTarget::PreferDropFrame);
        assert_eq!(settings.crop_target, "1920x1080");
        assert_eq!(settings.camera_model, "Panasonic");
        assert_eq!(settings.levels, "Static");
        assert_eq!(settings.log_transform, LogTransformMode::ReduceBy2Bit);
        assert_eq!(settings.quad_bayer_option, QuadBayerMode::CorrectQbCfaMetadata);
    }

    #[test]
    fn test_invalid_draft_scale_rejected() {
        let args = RenderOptionArgs {
            draft: Some(3),
            levels: "Dynamic".to_string(),
            exposure: "0ev".to_string(),
            ..Default::default()
        };
        assert!(build_render_settings(&args).is_err());
    }

    #[test]
    fn test_invalid_crop_rejected() {
        let args = RenderOptionArgs {
            crop: Some("fullframe".to_string()),
            levels: "Dynamic".to_string(),
            exposure: "0ev".to_string(),
            ..Default::default()
        };
        assert!(build_render_settings(&args).is_err());
    }

    #[test]
    fn test_numeric_cfr_target() {
        let args = RenderOptionArgs {
            cfr: Some("47.95".to_string()),
            levels: "Dynamic".to_string(),
            exposure: "0ev".to_string(),
            ..Default::default()
        };
        let settings = build_render_settings(&args).unwrap();
        assert_eq!(settings.cfr_target, CfrTarget::Custom(47.95));
    }

    #[test]
    fn test_parse_frame_range() {
        assert_eq!(parse_frame_range("0:24"), Ok((0, Some(24))));
        assert_eq!(parse_frame_range("10:"), Ok((10, None)));
        assert_eq!(parse_frame_range(":5"), Ok((0, Some(5))));
        assert!(parse_frame_range("24").is_err());
        assert!(parse_frame_range("5:5").is_err());
        assert!(parse_frame_range("a:b").is_err());
    }
}
