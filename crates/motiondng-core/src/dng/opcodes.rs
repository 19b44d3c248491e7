//! DNG OpcodeList2 serialization.
//!
//! Only the GainMap opcode is emitted, carrying the lens shading grid when
//! it is not baked into the pixel data. Opcode lists are big-endian
//! regardless of the file byte order.

use crate::shading::ShadingMap;

const OPCODE_ID_GAIN_MAP: u32 = 9;
const OPCODE_DNG_VERSION: u32 = 0x0103_0000;
const OPCODE_FLAG_OPTIONAL: u32 = 1;

/// Placement and grid parameters of one GainMap opcode.
#[derive(Debug, Clone)]
pub struct GainMapParams {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
    pub plane: u32,
    pub planes: u32,
    pub row_pitch: u32,
    pub col_pitch: u32,
    pub map_points_v: u32,
    pub map_points_h: u32,
    pub map_spacing_v: f64,
    pub map_spacing_h: f64,
    pub map_origin_v: f64,
    pub map_origin_h: f64,
    pub map_planes: u32,
    pub gains: Vec<f32>,
}

impl GainMapParams {
    /// Map the shading grid onto the active image area. `left`/`top` are
    /// the crop offsets of the active area within the full sensor.
    pub fn from_shading_map(
        map: &ShadingMap,
        image_width: u32,
        image_height: u32,
        left: u32,
        top: u32,
    ) -> Option<GainMapParams> {
        if map.is_empty() {
            return None;
        }

        let map_points_v = map.height() as u32;
        let map_points_h = map.width() as u32;

        let row_pitch = if map_points_v > 1 {
            ((image_height - 1) / (map_points_v - 1)).max(1)
        } else {
            image_height
        };
        let col_pitch = if map_points_h > 1 {
            ((image_width - 1) / (map_points_h - 1)).max(1)
        } else {
            image_width
        };

        let planes = match map.plane_count() {
            0 => return None,
            n if n >= 4 => 4,
            3 => 3,
            _ => 1,
        } as u32;

        let gains = map.opcode_gains(planes as usize);
        if gains.len() != (map_points_v * map_points_h * planes) as usize {
            return None;
        }

        Some(GainMapParams {
            top,
            left,
            bottom: top + image_height,
            right: left + image_width,
            plane: 0,
            planes,
            row_pitch,
            col_pitch,
            map_points_v,
            map_points_h,
            map_spacing_v: row_pitch as f64 / image_height as f64,
            map_spacing_h: col_pitch as f64 / image_width as f64,
            map_origin_v: top as f64 / image_height as f64,
            map_origin_h: left as f64 / image_width as f64,
            map_planes: planes,
            gains,
        })
    }

    fn parameter_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(76 + self.gains.len() * 4);
        for v in [
            self.top,
            self.left,
            self.bottom,
            self.right,
            self.plane,
            self.planes,
            self.row_pitch,
            self.col_pitch,
            self.map_points_v,
            self.map_points_h,
        ] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        for v in [
            self.map_spacing_v,
            self.map_spacing_h,
            self.map_origin_v,
            self.map_origin_h,
        ] {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.extend_from_slice(&self.map_planes.to_be_bytes());
        for &g in &self.gains {
            out.extend_from_slice(&g.to_be_bytes());
        }
        out
    }
}

/// Serialize an OpcodeList2 value holding a single GainMap.
pub fn serialize_opcode_list(gain_map: &GainMapParams) -> Vec<u8> {
    let params = gain_map.parameter_bytes();

    let mut out = Vec::with_capacity(16 + params.len());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&OPCODE_ID_GAIN_MAP.to_be_bytes());
    out.extend_from_slice(&OPCODE_DNG_VERSION.to_be_bytes());
    out.extend_from_slice(&OPCODE_FLAG_OPTIONAL.to_be_bytes());
    out.extend_from_slice(&(params.len() as u32).to_be_bytes());
    out.extend_from_slice(&params);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_map() -> ShadingMap {
        ShadingMap::new(vec![vec![1.0, 2.0, 3.0, 4.0]; 4], 2, 2)
    }

    #[test]
    fn test_gain_map_geometry() {
        let params = GainMapParams::from_shading_map(&test_map(), 4000, 3000, 16, 12).unwrap();

        assert_eq!(params.top, 12);
        assert_eq!(params.left, 16);
        assert_eq!(params.bottom, 3012);
        assert_eq!(params.right, 4016);
        assert_eq!(params.planes, 4);
        assert_eq!(params.map_points_v, 2);
        assert_eq!(params.map_points_h, 2);
        assert_eq!(params.row_pitch, 2999);
        assert_eq!(params.col_pitch, 3999);
        assert!((params.map_origin_v - 12.0 / 3000.0).abs() < 1e-12);
        assert_eq!(params.gains.len(), 16);
    }

    #[test]
    fn test_single_point_dimension_pitch() {
        let map = ShadingMap::new(vec![vec![1.0]; 4], 1, 1);
        let params = GainMapParams::from_shading_map(&map, 1920, 1080, 0, 0).unwrap();
        assert_eq!(params.row_pitch, 1080);
        assert_eq!(params.col_pitch, 1920);
    }

    #[test]
    fn test_serialized_layout() {
        let params = GainMapParams::from_shading_map(&test_map(), 1920, 1080, 0, 0).unwrap();
        let bytes = serialize_opcode_list(&params);

        // count=1, then id/version/flags/paramlen, then 76 header bytes and
        // 16 gains
        assert_eq!(u32::from_be_bytes(bytes[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 9);
        assert_eq!(
            u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
            1,
            "optional flag"
        );
        let param_len = u32::from_be_bytes(bytes[16..20].try_into().unwrap()) as usize;
        assert_eq!(param_len, 76 + 16 * 4);
        assert_eq!(bytes.len(), 20 + param_len);

        // First gain value sits right after the fixed parameter header
        let gain0 = f32::from_be_bytes(bytes[20 + 76..20 + 80].try_into().unwrap());
        assert_eq!(gain0, 1.0);
    }

    #[test]
    fn test_empty_map_yields_none() {
        let map = ShadingMap::new(vec![], 0, 0);
        assert!(GainMapParams::from_shading_map(&map, 100, 100, 0, 0).is_none());
    }
}
