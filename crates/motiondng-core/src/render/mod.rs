//! Raw frame rendering.
//!
//! Takes an unpacked 16-bit Bayer image and produces the packed DNG strip:
//! crop and draft downscale, level remap, optional shading bake, the log
//! transfer curve with triangular dithering, clamp, and repack at the
//! narrowest sufficient bit depth.

mod levels;


pub use levels::{destination_levels, parse_crop_target, select_levels};

use crate::bitpack;
use crate::container::{ClipMetadata, FrameMeta};
use crate::dng::GainMapParams;
use crate::error::{RenderError, Result};
use crate::models::{LogTransformMode, RenderOptions, RenderSettings};
use crate::shading::ShadingMap;
use crate::verbose_println;

/// Sensor resolutions probed when a payload matches no expected size.
const COMMON_RESOLUTIONS: &[(u32, u32)] = &[
    (4032, 3024),
    (4000, 3000),
    (4608, 3456),
    (4096, 3072),
    (4032, 2268),
    (3840, 2160),
    (4096, 2160),
    (2688, 1512),
    (1920, 1080),
    (1280, 720),
    (8064, 6048),
];

/// Payload size slack accepted by resolution inference.
const INFERENCE_TOLERANCE: usize = 1000;

/// One rendered frame ready for DNG assembly.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,

    /// Bit depth of the packed strip
    pub encode_bits: u16,

    /// Packed image strip
    pub data: Vec<u8>,

    pub black_level: [u16; 4],
    pub white_level: u16,

    /// Lens shading grid for OpcodeList2 when not baked into pixels
    pub gain_map: Option<GainMapParams>,

    /// Whether the log transfer curve was applied to the pixel data
    pub log_applied: bool,

    pub iso: f64,
    pub exposure_time_ns: f64,
}

/// Unpack a frame payload into 16-bit samples, inferring the bit depth
/// from the payload size and falling back to a probe of common sensor
/// resolutions when nothing matches.
pub fn prepare_bayer(data: &[u8], meta: &ClipMetadata) -> Result<(Vec<u16>, u32, u32)> {
    let (width, height, bits) = infer_geometry(data.len(), meta).ok_or(RenderError::SizeMismatch {
        got: data.len(),
        expected: meta.width as usize * meta.height as usize * 2,
    })?;

    if width != meta.width || height != meta.height {
        verbose_println!(
            "frame size {} matched {}x{} at {} bits instead of metadata geometry",
            data.len(),
            width,
            height,
            bits
        );
    }

    let pixel_count = width as usize * height as usize;
    let mut samples = bitpack::unpack(data, pixel_count, bits);
    samples.resize(pixel_count, 0);

    Ok((samples, width, height))
}

fn infer_geometry(len: usize, meta: &ClipMetadata) -> Option<(u32, u32, u16)> {
    let pixels = meta.width as usize * meta.height as usize;

    for bits in [16u16, 12, 10, 8] {
        if len == pixels * bits as usize / 8 {
            return Some((meta.width, meta.height, bits));
        }
    }

    for &(w, h) in COMMON_RESOLUTIONS {
        let pixels = w as usize * h as usize;
        let packed_12 = pixels * 3 / 2;
        let raw_16 = pixels * 2;
        if len.abs_diff(packed_12) <= INFERENCE_TOLERANCE {
            return Some((w, h, 12));
        }
        if len.abs_diff(raw_16) <= INFERENCE_TOLERANCE {
            return Some((w, h, 16));
        }
    }

    None
}

/// Triangular dither in `[-0.5, 0.5]`, deterministic in the output pixel
/// coordinates so identical renders are byte-identical.
#[inline]
fn triangular_dither(x: u32, y: u32, i: u32) -> f32 {
    let mut seed = (x.wrapping_add(i & 1))
        .wrapping_mul(1664525)
        .wrapping_add((y.wrapping_add(i >> 1)).wrapping_mul(1013904223))
        ^ 0xdead_beef;
    seed ^= seed >> 16;
    seed = seed.wrapping_mul(0x85eb_ca6b);
    seed ^= seed >> 13;
    seed = seed.wrapping_mul(0xc2b2_ae35);
    seed ^= seed >> 16;

    let r1 = (seed & 0xffff) as f32 / 65535.0;
    let r2 = ((seed >> 16) & 0xffff) as f32 / 65535.0;
    (r1 + r2 - 1.0) * 0.5
}

const LOG_GAIN: f32 = 60.0;

#[inline]
fn log_curve(p: f32) -> f32 {
    (1.0 + LOG_GAIN * p.max(0.0)).log2() / (1.0 + LOG_GAIN).log2()
}

/// Quantize one output sample into `[0, dst_white]`.
///
/// A stored sample past the white level after clamping cannot happen
/// unless the renderer itself is wrong, so it is fatal in debug builds;
/// release builds log the event and clamp.
#[inline]
fn finalize_sample(value: f32, dst_white: f32) -> u16 {
    let sample = value.round().clamp(0.0, dst_white) as u16;
    if sample as f32 > dst_white {
        let err = RenderError::EncodeOverflow(sample as u32, dst_white as u16);
        debug_assert!(false, "{}", err);
        verbose_println!("{}, clamping to white level", err);
        return dst_white as u16;
    }
    sample
}

/// Planned output window for a frame of the given input dimensions.
#[derive(Debug, Clone, Copy)]
pub struct OutputGeometry {
    /// Even downscale factor
    pub scale: u32,

    /// Crop window within the input frame
    pub cropped_width: u32,
    pub cropped_height: u32,

    /// Final output dimensions, aligned down to 4
    pub width: u32,
    pub height: u32,
}

/// Resolve draft scale and crop into the output geometry. The crop target
/// only applies when it fits inside the input frame.
pub fn output_geometry(in_width: u32, in_height: u32, settings: &RenderSettings) -> OutputGeometry {
    let draft = if settings.options.contains(RenderOptions::DRAFT) {
        settings.draft_scale
    } else {
        1
    };
    let scale = if draft > 1 { (draft / 2) * 2 } else { 1 };

    let crop = if settings.options.contains(RenderOptions::CROPPING) {
        parse_crop_target(&settings.crop_target)
            .filter(|&(w, h)| w <= in_width && h <= in_height)
    } else {
        None
    };
    let (cropped_width, cropped_height) = crop.unwrap_or((in_width, in_height));

    OutputGeometry {
        scale,
        cropped_width,
        cropped_height,
        width: (cropped_width / scale / 4) * 4,
        height: (cropped_height / scale / 4) * 4,
    }
}

/// Render one unpacked Bayer frame per the settings snapshot.
pub fn render_frame(
    src: &[u16],
    in_width: u32,
    in_height: u32,
    meta: &ClipMetadata,
    frame_meta: &FrameMeta,
    settings: &RenderSettings,
) -> Result<RenderedFrame> {
    let options = settings.options;
    let apply_shading = options.contains(RenderOptions::APPLY_VIGNETTE);
    let debug_shading = apply_shading && options.contains(RenderOptions::DEBUG_SHADING);
    let interpret_quad =
        meta.need_remosaic || options.contains(RenderOptions::INTERPRET_AS_QUAD_BAYER);

    let log_transform = if options.contains(RenderOptions::LOG_TRANSFORM) {
        settings.log_transform
    } else {
        LogTransformMode::Disabled
    };
    let log_applied = log_transform != LogTransformMode::Disabled && !debug_shading;

    let cfa_size: u32 = if interpret_quad { 2 } else { 1 };

    // Crop decision: an explicit target that fits wins, otherwise the
    // active image area. Output dimensions align down to 4 for the Bayer
    // pattern and the 4-sample packing groups.
    let geometry = output_geometry(in_width, in_height, settings);
    let scale = geometry.scale;
    let (cropped_w, cropped_h) = (geometry.cropped_width, geometry.cropped_height);
    let (new_w, new_h) = (geometry.width, geometry.height);
    if new_w == 0 || new_h == 0 {
        return Err(RenderError::ContainerInvalid(format!(
            "frame too small to render: {}x{} at scale {}",
            in_width, in_height, scale
        )));
    }

    // Offsets of the rendered window within the input frame, and of the
    // input frame within the full sensor (the shading map spans the full
    // sensor).
    let src_left = (in_width - cropped_w) / 2;
    let src_top = (in_height - cropped_h) / 2;

    let full_w = meta.original_width.max(in_width);
    let full_h = meta.original_height.max(in_height);
    let shade_left = (full_w - cropped_w) / 2;
    let shade_top = (full_h - cropped_h) / 2;

    let shade_scale_x = 1.0 / full_w as f32;
    let shade_scale_y = 1.0 / full_h as f32;

    // Level selection, with 4x scaling when 2x2 binning sums Quad-Bayer
    // clusters
    let (mut src_black, mut src_white) = select_levels(meta, frame_meta, &settings.levels);
    let binned = cfa_size == 2 && scale == 2;
    if binned {
        src_white *= 4.0;
        for b in &mut src_black {
            *b *= 4.0;
        }
    }

    let linear: [f32; 4] = [
        1.0 / (src_white - src_black[0]),
        1.0 / (src_white - src_black[1]),
        1.0 / (src_white - src_black[2]),
        1.0 / (src_white - src_black[3]),
    ];

    let (dst_black, dst_white) = destination_levels(src_black, src_white, options, log_transform);

    let shading = if apply_shading {
        meta.shading_map.prepared(options, meta.cfa.color_indices())
    } else {
        ShadingMap::identity()
    };

    let gain_map = if apply_shading {
        None
    } else {
        GainMapParams::from_shading_map(&meta.shading_map, new_w, new_h, shade_left, shade_top)
    };

    let cfa_colors = meta.cfa.color_indices();
    let stride = in_width as usize;
    let at = |yy: u32, xx: u32| -> f32 {
        src[(src_top + yy) as usize * stride + (src_left + xx) as usize] as f32
    };

    let mut dst = vec![0u16; new_w as usize * new_h as usize];

    if cfa_size == 2 && scale == 1 {
        render_quad_full(
            &mut dst,
            new_w,
            new_h,
            &at,
            apply_shading,
            &shading,
            shade_left,
            shade_top,
            shade_scale_x,
            shade_scale_y,
            &linear,
            &src_black,
            &dst_black,
            dst_white,
            log_applied,
        );
    } else {
        render_blocks(
            &mut dst,
            new_w,
            new_h,
            scale,
            cfa_size,
            binned,
            &at,
            apply_shading,
            debug_shading,
            &shading,
            cfa_colors,
            shade_left,
            shade_top,
            shade_scale_x,
            shade_scale_y,
            &linear,
            &src_black,
            src_white,
            &dst_black,
            dst_white,
            log_applied,
        );
    }

    let encode_bits = bitpack::encode_bits_for(dst_white as u16);
    let data = bitpack::pack(&dst, new_w, new_h, encode_bits);

    let mut black_level = [0u16; 4];
    for (out, &b) in black_level.iter_mut().zip(dst_black.iter()) {
        *out = b.round() as u16;
    }

    Ok(RenderedFrame {
        width: new_w,
        height: new_h,
        encode_bits,
        data,
        black_level,
        white_level: dst_white as u16,
        gain_map,
        log_applied,
        iso: frame_meta.iso.unwrap_or(meta.iso),
        exposure_time_ns: frame_meta.exposure_time.unwrap_or(meta.exposure_time),
    })
}

/// Standard 2x2 block walk, also covering Quad-Bayer material that is
/// being binned or decimated.
#[allow(clippy::too_many_arguments)]
fn render_blocks(
    dst: &mut [u16],
    new_w: u32,
    new_h: u32,
    scale: u32,
    cfa_size: u32,
    binned: bool,
    at: &dyn Fn(u32, u32) -> f32,
    apply_shading: bool,
    debug_shading: bool,
    shading: &ShadingMap,
    cfa_colors: [u8; 4],
    shade_left: u32,
    shade_top: u32,
    shade_scale_x: f32,
    shade_scale_y: f32,
    linear: &[f32; 4],
    src_black: &[f32; 4],
    src_white: f32,
    dst_black: &[f32; 4],
    dst_white: f32,
    log_applied: bool,
) {
    for y in (0..new_h).step_by(2) {
        for x in (0..new_w).step_by(2) {
            let src_y = y * scale;
            let src_x = x * scale;

            let mut s = [0.0f32; 4];
            if binned {
                // Sum each 2x2 Quad-Bayer cluster into one sample
                for (i, &(cy, cx)) in [(0u32, 0u32), (0, 2), (2, 0), (2, 2)].iter().enumerate() {
                    s[i] = at(src_y + cy, src_x + cx)
                        + at(src_y + cy, src_x + cx + 1)
                        + at(src_y + cy + 1, src_x + cx)
                        + at(src_y + cy + 1, src_x + cx + 1);
                }
            } else {
                s[0] = at(src_y, src_x);
                s[1] = at(src_y, src_x + cfa_size);
                s[2] = at(src_y + cfa_size, src_x);
                s[3] = at(src_y + cfa_size, src_x + cfa_size);
            }

            let mut shade = [1.0f32; 4];
            if apply_shading {
                for i in 0..4 {
                    let dx = (i as u32 & 1) * scale;
                    let dy = (i as u32 >> 1) * scale;
                    shade[i] = shading.sample(
                        (src_x + shade_left + dx) as f32 * shade_scale_x,
                        (src_y + shade_top + dy) as f32 * shade_scale_y,
                        cfa_colors[i] as usize,
                    );
                }
            }

            let mut p = [0.0f32; 4];
            if debug_shading {
                // Visualize the (inverted) correction field itself
                for i in 0..4 {
                    p[i] = (linear[i] * (src_white - src_black[i]) * shade[i]).max(0.0)
                        * (dst_white - dst_black[i]);
                }
            } else if !log_applied {
                for i in 0..4 {
                    p[i] = (linear[i] * (s[i] - src_black[i]) * shade[i]).max(0.0)
                        * (dst_white - dst_black[i]);
                }
            } else {
                for i in 0..4 {
                    let lin = (linear[i] * (s[i] - src_black[i]) * shade[i]).max(0.0);
                    p[i] = log_curve(lin) * dst_white + triangular_dither(x, y, i as u32);
                }
            }

            for i in 0..4 {
                let dx = i as u32 & 1;
                let dy = i as u32 >> 1;
                dst[((y + dy) * new_w + x + dx) as usize] =
                    finalize_sample(p[i] + dst_black[i], dst_white);
            }
        }
    }
}

/// Full-resolution Quad-Bayer walk over 4x4 tiles of four 2x2 color
/// clusters.
#[allow(clippy::too_many_arguments)]
fn render_quad_full(
    dst: &mut [u16],
    new_w: u32,
    new_h: u32,
    at: &dyn Fn(u32, u32) -> f32,
    apply_shading: bool,
    shading: &ShadingMap,
    shade_left: u32,
    shade_top: u32,
    shade_scale_x: f32,
    shade_scale_y: f32,
    linear: &[f32; 4],
    src_black: &[f32; 4],
    dst_black: &[f32; 4],
    dst_white: f32,
    log_applied: bool,
) {
    // (dy, dx) of sample i within the 4x4 tile, cluster-major
    const OFFSETS: [(u32, u32); 16] = [
        (0, 0), (0, 1), (1, 0), (1, 1),
        (0, 2), (0, 3), (1, 2), (1, 3),
        (2, 0), (2, 1), (3, 0), (3, 1),
        (2, 2), (2, 3), (3, 2), (3, 3),
    ];

    for y in (0..new_h).step_by(4) {
        for x in (0..new_w).step_by(4) {
            let mut s = [0.0f32; 16];
            for (i, &(dy, dx)) in OFFSETS.iter().enumerate() {
                s[i] = at(y + dy, x + dx);
            }

            let mut shade = [1.0f32; 16];
            if apply_shading {
                // Shading coordinates stride a full 4x4 tile per cluster:
                // the right/bottom clusters sample at +4/+5, not at the
                // pixel's own +2/+3 offset
                for i in 0..16 {
                    let cluster = (i / 4) as u32;
                    let (cy, cx) = (cluster >> 1, cluster & 1);
                    let j = (i % 4) as u32;
                    let (jy, jx) = (j >> 1, j & 1);
                    shade[i] = shading.sample(
                        (x + shade_left + cx * 4 + jx) as f32 * shade_scale_x,
                        (y + shade_top + cy * 4 + jy) as f32 * shade_scale_y,
                        cluster as usize,
                    );
                }
            }

            let mut p = [0.0f32; 16];
            for i in 0..16 {
                p[i] = linear[i % 4] * (s[i] - src_black[i % 4]) * shade[i];
            }

            if !log_applied {
                for i in 0..16 {
                    p[i] = (p[i] * (dst_white - dst_black[i % 4])).max(0.0);
                }
            } else {
                for (i, value) in p.iter_mut().enumerate() {
                    *value = log_curve(*value) * dst_white + triangular_dither(x, y, i as u32);
                }
            }

            for (i, &(dy, dx)) in OFFSETS.iter().enumerate() {
                dst[((y + dy) * new_w + x + dx) as usize] =
                    finalize_sample(p[i] + dst_black[i % 4], dst_white);
            }
        }
    }
}
