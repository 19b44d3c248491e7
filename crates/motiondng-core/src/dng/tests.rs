//! DNG writer tests.
//!
//! Output is verified with a small independent IFD reader rather than by
//! eyeballing offsets, so layout bugs (inline vs out-of-line values,
//! entry ordering) show up as test failures.

use std::collections::BTreeMap;

use super::*;
use crate::container::{CfaPattern, ClipMetadata, Orientation};
use crate::models::QuadBayerMode;
use crate::render::RenderedFrame;
use crate::shading::ShadingMap;

const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

fn test_meta() -> ClipMetadata {
    ClipMetadata {
        width: 8,
        height: 8,
        original_width: 8,
        original_height: 8,
        bits_per_sample: 16,
        cfa: CfaPattern::Rggb,
        iso: 100.0,
        exposure_time: 10_000_000.0,
        aperture: 1.8,
        focal_length: 4.2,
        orientation: Orientation::Landscape,
        flipped: false,
        color_matrix_1: IDENTITY,
        color_matrix_2: [0.0; 9],
        forward_matrix_1: IDENTITY,
        forward_matrix_2: [0.0; 9],
        as_shot_neutral: [0.5, 1.0, 0.6],
        illuminant_1: "standarda".to_string(),
        illuminant_2: "d65".to_string(),
        black_level: [64.0; 4],
        white_level: 1023.0,
        shading_map: ShadingMap::identity(),
        need_remosaic: false,
        has_quad_bayer: false,
        num_segments: 0,
        device_model: "TestPhone 9".to_string(),
    }
}

fn test_frame() -> RenderedFrame {
    RenderedFrame {
        width: 8,
        height: 8,
        encode_bits: 16,
        data: (0..128u32).map(|i| i as u8).collect(),
        black_level: [64; 4],
        white_level: 1023,
        gain_map: None,
        log_applied: false,
        iso: 100.0,
        exposure_time_ns: 10_000_000.0,
    }
}

/// Minimal little-endian single-IFD TIFF reader.
struct TiffReader<'a> {
    data: &'a [u8],
    // tag -> (type, count, absolute offset of the value bytes)
    entries: BTreeMap<u16, (u16, u32, usize)>,
    raw_tag_order: Vec<u16>,
}

impl<'a> TiffReader<'a> {
    fn parse(data: &'a [u8]) -> TiffReader<'a> {
        assert_eq!(&data[0..2], b"II", "little-endian byte order mark");
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 42);
        let ifd = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        assert_eq!(ifd, 8, "first IFD at offset 8");

        let count = u16::from_le_bytes([data[ifd], data[ifd + 1]]) as usize;
        let mut entries = BTreeMap::new();
        let mut raw_tag_order = Vec::new();

        for i in 0..count {
            let base = ifd + 2 + i * 12;
            let tag = u16::from_le_bytes([data[base], data[base + 1]]);
            let field_type = u16::from_le_bytes([data[base + 2], data[base + 3]]);
            let value_count = u32::from_le_bytes(data[base + 4..base + 8].try_into().unwrap());

            let size = value_count as usize * tags::type_size(field_type);
            let value_offset = if size <= 4 {
                base + 8
            } else {
                u32::from_le_bytes(data[base + 8..base + 12].try_into().unwrap()) as usize
            };

            raw_tag_order.push(tag);
            entries.insert(tag, (field_type, value_count, value_offset));
        }

        // Next-IFD pointer must terminate the chain
        let next = ifd + 2 + count * 12;
        assert_eq!(u32::from_le_bytes(data[next..next + 4].try_into().unwrap()), 0);

        TiffReader { data, entries, raw_tag_order }
    }

    fn has(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }

    fn shorts(&self, tag: u16) -> Vec<u16> {
        let &(field_type, count, offset) = self.entries.get(&tag).expect("tag present");
        assert_eq!(field_type, tags::TYPE_SHORT);
        (0..count as usize)
            .map(|i| u16::from_le_bytes(self.data[offset + i * 2..offset + i * 2 + 2].try_into().unwrap()))
            .collect()
    }

    fn longs(&self, tag: u16) -> Vec<u32> {
        let &(field_type, count, offset) = self.entries.get(&tag).expect("tag present");
        assert_eq!(field_type, tags::TYPE_LONG);
        (0..count as usize)
            .map(|i| u32::from_le_bytes(self.data[offset + i * 4..offset + i * 4 + 4].try_into().unwrap()))
            .collect()
    }

    fn bytes(&self, tag: u16) -> Vec<u8> {
        let &(_, count, offset) = self.entries.get(&tag).expect("tag present");
        self.data[offset..offset + count as usize].to_vec()
    }

    fn srationals(&self, tag: u16) -> Vec<(i32, i32)> {
        let &(field_type, count, offset) = self.entries.get(&tag).expect("tag present");
        assert_eq!(field_type, tags::TYPE_SRATIONAL);
        (0..count as usize)
            .map(|i| {
                let base = offset + i * 8;
                (
                    i32::from_le_bytes(self.data[base..base + 4].try_into().unwrap()),
                    i32::from_le_bytes(self.data[base + 4..base + 8].try_into().unwrap()),
                )
            })
            .collect()
    }
}

fn write_default() -> Vec<u8> {
    write_dng(&test_frame(), &test_meta(), &RenderSettings::default(), 24.0, 0, 0.0)
}

#[test]
fn test_header_and_dimensions() {
    let dng = write_default();
    let reader = TiffReader::parse(&dng);

    assert_eq!(reader.longs(tags::TAG_IMAGE_WIDTH), vec![8]);
    assert_eq!(reader.longs(tags::TAG_IMAGE_LENGTH), vec![8]);
    assert_eq!(reader.shorts(tags::TAG_BITS_PER_SAMPLE), vec![16]);
    assert_eq!(reader.shorts(tags::TAG_COMPRESSION), vec![1]);
    assert_eq!(reader.shorts(tags::TAG_PHOTOMETRIC_INTERPRETATION), vec![32803]);
    assert_eq!(reader.shorts(tags::TAG_SAMPLES_PER_PIXEL), vec![1]);
    assert_eq!(reader.shorts(tags::TAG_PLANAR_CONFIGURATION), vec![1]);
    assert_eq!(reader.longs(tags::TAG_ROWS_PER_STRIP), vec![8]);
    assert_eq!(reader.bytes(tags::TAG_DNG_VERSION), vec![1, 4, 0, 0]);
    assert_eq!(reader.bytes(tags::TAG_DNG_BACKWARD_VERSION), vec![1, 1, 0, 0]);
    assert_eq!(reader.longs(tags::TAG_ACTIVE_AREA), vec![0, 0, 8, 8]);
}

#[test]
fn test_tags_in_ascending_order() {
    let dng = write_default();
    let reader = TiffReader::parse(&dng);
    assert!(reader.raw_tag_order.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_strip_holds_image_data() {
    let frame = test_frame();
    let dng = write_dng(&frame, &test_meta(), &RenderSettings::default(), 24.0, 0, 0.0);
    let reader = TiffReader::parse(&dng);

    let offset = reader.longs(tags::TAG_STRIP_OFFSETS)[0] as usize;
    let count = reader.longs(tags::TAG_STRIP_BYTE_COUNTS)[0] as usize;
    assert_eq!(count, frame.data.len());
    assert_eq!(&dng[offset..offset + count], &frame.data[..]);
}

#[test]
fn test_linear_levels() {
    let dng = write_default();
    let reader = TiffReader::parse(&dng);

    assert!(!reader.has(tags::TAG_LINEARIZATION_TABLE));
    assert_eq!(reader.shorts(tags::TAG_BLACK_LEVEL), vec![64, 64, 64, 64]);
    assert_eq!(reader.longs(tags::TAG_WHITE_LEVEL), vec![1023]);
    assert_eq!(reader.shorts(tags::TAG_BLACK_LEVEL_REPEAT_DIM), vec![2, 2]);
}

#[test]
fn test_log_levels_and_table() {
    let mut frame = test_frame();
    frame.log_applied = true;
    frame.white_level = 255;
    frame.black_level = [0; 4];

    let dng = write_dng(&frame, &test_meta(), &RenderSettings::default(), 24.0, 0, 0.0);
    let reader = TiffReader::parse(&dng);

    let table = reader.shorts(tags::TAG_LINEARIZATION_TABLE);
    assert_eq!(table.len(), 256);
    assert_eq!(table[0], 0);
    assert_eq!(table[255], 65535);
    assert!(table.windows(2).all(|w| w[0] <= w[1]), "table is monotone");

    assert_eq!(reader.shorts(tags::TAG_BLACK_LEVEL), vec![0, 0, 0, 0]);
    assert_eq!(reader.longs(tags::TAG_WHITE_LEVEL), vec![65534]);
}

#[test]
fn test_opcode_list_present_iff_gain_map() {
    let without = write_default();
    assert!(!TiffReader::parse(&without).has(tags::TAG_OPCODE_LIST_2));

    let mut frame = test_frame();
    let map = ShadingMap::new(vec![vec![1.5; 4]; 4], 2, 2);
    frame.gain_map = GainMapParams::from_shading_map(&map, 8, 8, 0, 0);

    let with = write_dng(&frame, &test_meta(), &RenderSettings::default(), 24.0, 0, 0.0);
    let reader = TiffReader::parse(&with);
    assert!(reader.has(tags::TAG_OPCODE_LIST_2));

    let opcodes = reader.bytes(tags::TAG_OPCODE_LIST_2);
    assert_eq!(u32::from_be_bytes(opcodes[0..4].try_into().unwrap()), 1);
    assert_eq!(u32::from_be_bytes(opcodes[4..8].try_into().unwrap()), 9);
}

#[test]
fn test_cfa_pattern_default() {
    let dng = write_default();
    let reader = TiffReader::parse(&dng);

    assert_eq!(reader.shorts(tags::TAG_CFA_REPEAT_PATTERN_DIM), vec![2, 2]);
    assert_eq!(reader.bytes(tags::TAG_CFA_PATTERN), vec![0, 1, 1, 2]);
    assert_eq!(reader.bytes(tags::TAG_CFA_PLANE_COLOR), vec![0, 1, 2]);
    assert_eq!(reader.shorts(tags::TAG_CFA_LAYOUT), vec![1]);
}

#[test]
fn test_cfa_pattern_quad_bayer_correct_metadata() {
    let mut settings = RenderSettings::default();
    settings.options = RenderOptions::INTERPRET_AS_QUAD_BAYER;
    settings.draft_scale = 1;
    settings.quad_bayer_option = QuadBayerMode::CorrectQbCfaMetadata;

    let dng = write_dng(&test_frame(), &test_meta(), &settings, 24.0, 0, 0.0);
    let reader = TiffReader::parse(&dng);

    assert_eq!(reader.shorts(tags::TAG_CFA_REPEAT_PATTERN_DIM), vec![4, 4]);
    let pattern = reader.bytes(tags::TAG_CFA_PATTERN);
    assert_eq!(pattern.len(), 16);
    assert_eq!(pattern, CfaPattern::Rggb.quad_color_indices().to_vec());
}

#[test]
fn test_cfa_pattern_quad_bayer_wrong_metadata_mode() {
    // The wrong-metadata mode still advertises a plain 2x2 pattern
    let mut settings = RenderSettings::default();
    settings.options = RenderOptions::INTERPRET_AS_QUAD_BAYER;
    settings.quad_bayer_option = QuadBayerMode::WrongCfaMetadata;

    let dng = write_dng(&test_frame(), &test_meta(), &settings, 24.0, 0, 0.0);
    let reader = TiffReader::parse(&dng);
    assert_eq!(reader.shorts(tags::TAG_CFA_REPEAT_PATTERN_DIM), vec![2, 2]);
}

#[test]
fn test_zero_matrices_omitted() {
    // color_matrix_2 and forward_matrix_2 are all-zero in the test meta
    let dng = write_default();
    let reader = TiffReader::parse(&dng);

    assert!(reader.has(tags::TAG_COLOR_MATRIX_1));
    assert!(!reader.has(tags::TAG_COLOR_MATRIX_2));
    assert!(reader.has(tags::TAG_FORWARD_MATRIX_1));
    assert!(!reader.has(tags::TAG_FORWARD_MATRIX_2));

    let matrix = reader.srationals(tags::TAG_COLOR_MATRIX_1);
    assert_eq!(matrix.len(), 9);
    assert_eq!(matrix[0], (10000, 10000));
    assert_eq!(matrix[1], (0, 10000));
}

#[test]
fn test_camera_model_override() {
    let mut settings = RenderSettings::default();
    settings.options = RenderOptions::CAMMODEL_OVERRIDE;
    settings.camera_model = "Panasonic".to_string();

    let dng = write_dng(&test_frame(), &test_meta(), &settings, 24.0, 0, 0.0);
    let reader = TiffReader::parse(&dng);

    let model = reader.bytes(tags::TAG_UNIQUE_CAMERA_MODEL);
    assert_eq!(&model[..model.len() - 1], b"Panasonic Varicam RAW");

    // Panasonic preset carries the fixed -2 EV offset
    assert_eq!(reader.srationals(tags::TAG_BASELINE_EXPOSURE), vec![(-200, 100)]);
}

#[test]
fn test_camera_model_from_container() {
    let dng = write_default();
    let reader = TiffReader::parse(&dng);
    let model = reader.bytes(tags::TAG_UNIQUE_CAMERA_MODEL);
    assert_eq!(&model[..model.len() - 1], b"TestPhone 9");
    assert!(!reader.has(tags::TAG_MAKE));
}

#[test]
fn test_fujifilm_override_writes_make_and_model() {
    let mut settings = RenderSettings::default();
    settings.options = RenderOptions::CAMMODEL_OVERRIDE;
    settings.camera_model = "Fujifilm".to_string();

    let dng = write_dng(&test_frame(), &test_meta(), &settings, 24.0, 0, 0.0);
    let reader = TiffReader::parse(&dng);

    let make = reader.bytes(tags::TAG_MAKE);
    assert_eq!(&make[..make.len() - 1], b"Fujifilm");
    let model = reader.bytes(tags::TAG_MODEL);
    assert_eq!(&model[..model.len() - 1], b"X-T5");
}

#[test]
fn test_baseline_exposure_normalization() {
    let mut settings = RenderSettings::default();
    settings.options = RenderOptions::NORMALIZE_EXPOSURE;

    // baseline == iso * exposure -> 0 EV
    let baseline = 100.0 * 10_000_000.0;
    let dng = write_dng(&test_frame(), &test_meta(), &settings, 24.0, 0, baseline);
    let reader = TiffReader::parse(&dng);
    assert_eq!(reader.srationals(tags::TAG_BASELINE_EXPOSURE), vec![(0, 100)]);

    // Twice the baseline product -> +1 EV
    let dng = write_dng(&test_frame(), &test_meta(), &settings, 24.0, 0, baseline * 2.0);
    let reader = TiffReader::parse(&dng);
    assert_eq!(reader.srationals(tags::TAG_BASELINE_EXPOSURE), vec![(100, 100)]);
}

#[test]
fn test_illuminant_codes() {
    assert_eq!(illuminant_code("standarda"), 17);
    assert_eq!(illuminant_code("standardb"), 18);
    assert_eq!(illuminant_code("standardc"), 19);
    assert_eq!(illuminant_code("d50"), 23);
    assert_eq!(illuminant_code("d55"), 20);
    assert_eq!(illuminant_code("D65"), 21);
    assert_eq!(illuminant_code("d75"), 22);
    assert_eq!(illuminant_code("halogen"), 0);

    let dng = write_default();
    let reader = TiffReader::parse(&dng);
    assert_eq!(reader.shorts(tags::TAG_CALIBRATION_ILLUMINANT_1), vec![17]);
    assert_eq!(reader.shorts(tags::TAG_CALIBRATION_ILLUMINANT_2), vec![21]);
}

#[test]
fn test_orientation_mapping() {
    assert_eq!(tiff_orientation(Orientation::Landscape, false), 1);
    assert_eq!(tiff_orientation(Orientation::Landscape, true), 2);
    assert_eq!(tiff_orientation(Orientation::ReverseLandscape, false), 3);
    assert_eq!(tiff_orientation(Orientation::ReverseLandscape, true), 4);
    assert_eq!(tiff_orientation(Orientation::Portrait, false), 6);
    assert_eq!(tiff_orientation(Orientation::Portrait, true), 7);
    assert_eq!(tiff_orientation(Orientation::ReversePortrait, false), 8);
    assert_eq!(tiff_orientation(Orientation::ReversePortrait, true), 5);
    assert_eq!(tiff_orientation(Orientation::Unknown, false), 9);
}

#[test]
fn test_timecode_bytes() {
    // 1:01:01:12 at 24 fps
    let frame_number = (3600 + 60 + 1) * 24 + 12;
    let code = timecode_bytes(frame_number, 24.0);
    assert_eq!(code, [0x12, 0x01, 0x01, 0x01, 0, 0, 0, 0]);

    // Frame counter wraps at the rounded rate
    let code = timecode_bytes(25, 24.0);
    assert_eq!(code[0], 0x01);
}

#[test]
fn test_fps_rational_ntsc() {
    assert_eq!(fps_rational(24.0), (24, 1));
    assert_eq!(fps_rational(25.0), (25, 1));
    assert_eq!(fps_rational(29.97), (30000, 1001));
    assert_eq!(fps_rational(23.976), (24000, 1001));
    assert_eq!(fps_rational(59.94), (60000, 1001));
}

#[test]
fn test_linearization_table_shape() {
    let table = linearization_table(1023);
    assert_eq!(table.len(), 1024);
    assert_eq!(table[0], 0);
    assert_eq!(table[1023], 65535);

    // The log curve compresses highlights: the midpoint decodes well below
    // half scale
    assert!(table[512] < 10000);
    assert!(table.windows(2).all(|w| w[0] <= w[1]));
}
