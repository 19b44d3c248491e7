//! TIFF/DNG tag and field type constants.

// TIFF 6.0 baseline
pub const TAG_NEW_SUBFILE_TYPE: u16 = 254;
pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_PHOTOMETRIC_INTERPRETATION: u16 = 262;
pub const TAG_MAKE: u16 = 271;
pub const TAG_MODEL: u16 = 272;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_ORIENTATION: u16 = 274;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_ROWS_PER_STRIP: u16 = 278;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_X_RESOLUTION: u16 = 282;
pub const TAG_Y_RESOLUTION: u16 = 283;
pub const TAG_PLANAR_CONFIGURATION: u16 = 284;
pub const TAG_RESOLUTION_UNIT: u16 = 296;
pub const TAG_SOFTWARE: u16 = 305;

// TIFF/EP CFA description
pub const TAG_CFA_REPEAT_PATTERN_DIM: u16 = 33421;
pub const TAG_CFA_PATTERN: u16 = 33422;

// EXIF
pub const TAG_EXPOSURE_TIME: u16 = 33434;
pub const TAG_F_NUMBER: u16 = 33437;
pub const TAG_ISO_SPEED_RATINGS: u16 = 34855;
pub const TAG_FOCAL_LENGTH: u16 = 37386;

// DNG
pub const TAG_DNG_VERSION: u16 = 50706;
pub const TAG_DNG_BACKWARD_VERSION: u16 = 50707;
pub const TAG_UNIQUE_CAMERA_MODEL: u16 = 50708;
pub const TAG_CFA_PLANE_COLOR: u16 = 50710;
pub const TAG_CFA_LAYOUT: u16 = 50711;
pub const TAG_LINEARIZATION_TABLE: u16 = 50712;
pub const TAG_BLACK_LEVEL_REPEAT_DIM: u16 = 50713;
pub const TAG_BLACK_LEVEL: u16 = 50714;
pub const TAG_WHITE_LEVEL: u16 = 50717;
pub const TAG_COLOR_MATRIX_1: u16 = 50721;
pub const TAG_COLOR_MATRIX_2: u16 = 50722;
pub const TAG_CAMERA_CALIBRATION_1: u16 = 50723;
pub const TAG_CAMERA_CALIBRATION_2: u16 = 50724;
pub const TAG_AS_SHOT_NEUTRAL: u16 = 50728;
pub const TAG_BASELINE_EXPOSURE: u16 = 50730;
pub const TAG_CALIBRATION_ILLUMINANT_1: u16 = 50778;
pub const TAG_CALIBRATION_ILLUMINANT_2: u16 = 50779;
pub const TAG_ACTIVE_AREA: u16 = 50829;
pub const TAG_FORWARD_MATRIX_1: u16 = 50964;
pub const TAG_FORWARD_MATRIX_2: u16 = 50965;
pub const TAG_OPCODE_LIST_2: u16 = 51009;
pub const TAG_TIME_CODES: u16 = 51043;
pub const TAG_FRAME_RATE: u16 = 51044;

// Field types
pub const TYPE_BYTE: u16 = 1;
pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_RATIONAL: u16 = 5;
pub const TYPE_UNDEFINED: u16 = 7;
pub const TYPE_SRATIONAL: u16 = 10;

/// Size in bytes of one value of a field type.
pub fn type_size(field_type: u16) -> usize {
    match field_type {
        TYPE_BYTE | TYPE_ASCII | TYPE_UNDEFINED => 1,
        TYPE_SHORT => 2,
        TYPE_LONG => 4,
        TYPE_RATIONAL | TYPE_SRATIONAL => 8,
        _ => 1,
    }
}

pub const COMPRESSION_NONE: u16 = 1;
pub const PHOTOMETRIC_CFA: u16 = 32803;
pub const PLANAR_CONFIG_CHUNKY: u16 = 1;
