//! Bit packing for raw sample streams.
//!
//! DNG strips store samples at the narrowest sufficient bit depth. These
//! routines pack 16-bit Bayer samples into 2/4/6/8/10/12/14-bit streams
//! (big-end-first within each bit group, little-endian file order) and
//! unpack the container's 8/10/12/14/16-bit payloads back to 16-bit.

/// Number of significant bits in `value`. Zero needs one bit.
pub fn bits_needed(value: u16) -> u16 {
    if value == 0 {
        1
    } else {
        16 - value.leading_zeros() as u16
    }
}

/// Smallest supported encoding width that covers `white_level`.
pub fn encode_bits_for(white_level: u16) -> u16 {
    let bits = bits_needed(white_level);
    match bits {
        0..=2 => 2,
        3..=4 => 4,
        5..=6 => 6,
        7..=8 => 8,
        9..=10 => 10,
        11..=12 => 12,
        13..=14 => 14,
        _ => 16,
    }
}

/// Pack `width * height` samples at the given bit depth.
///
/// The renderer aligns its output width down to a multiple of 4, so every
/// packing group starts on a fresh byte.
pub fn pack(src: &[u16], width: u32, height: u32, bits: u16) -> Vec<u8> {
    let count = (width as usize * height as usize).min(src.len());
    let src = &src[..count];

    match bits {
        2 => pack_2bit(src),
        4 => pack_4bit(src),
        6 => pack_6bit(src),
        8 => pack_8bit(src),
        10 => pack_10bit(src),
        12 => pack_12bit(src),
        14 => pack_14bit(src),
        _ => pack_16bit(src),
    }
}

/// Unpack `pixel_count` samples from a packed payload. Depths other than
/// the supported set fall back to little-endian 16-bit.
pub fn unpack(src: &[u8], pixel_count: usize, bits: u16) -> Vec<u16> {
    match bits {
        8 => src.iter().take(pixel_count).map(|&b| b as u16).collect(),
        10 => unpack_10bit(src, pixel_count),
        12 => unpack_12bit(src, pixel_count),
        14 => unpack_14bit(src, pixel_count),
        _ => unpack_16bit(src, pixel_count),
    }
}

fn pack_10bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() / 4 * 5);
    for p in src.chunks_exact(4) {
        dst.push((p[0] >> 2) as u8);
        dst.push((((p[0] & 0x03) << 6) | (p[1] >> 4)) as u8);
        dst.push((((p[1] & 0x0f) << 4) | (p[2] >> 6)) as u8);
        dst.push((((p[2] & 0x3f) << 2) | (p[3] >> 8)) as u8);
        dst.push((p[3] & 0xff) as u8);
    }
    dst
}

fn pack_12bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() / 2 * 3);
    for p in src.chunks_exact(2) {
        dst.push((p[0] >> 4) as u8);
        dst.push((((p[0] & 0x0f) << 4) | (p[1] >> 8)) as u8);
        dst.push((p[1] & 0xff) as u8);
    }
    dst
}

fn pack_14bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() / 4 * 7);
    for p in src.chunks_exact(4) {
        dst.push((p[0] >> 6) as u8);
        dst.push((((p[0] & 0x3f) << 2) | (p[1] >> 12)) as u8);
        dst.push(((p[1] >> 4) & 0xff) as u8);
        dst.push((((p[1] & 0x0f) << 4) | (p[2] >> 10)) as u8);
        dst.push(((p[2] >> 2) & 0xff) as u8);
        dst.push((((p[2] & 0x03) << 6) | (p[3] >> 8)) as u8);
        dst.push((p[3] & 0xff) as u8);
    }
    dst
}

fn pack_8bit(src: &[u16]) -> Vec<u8> {
    src.iter().map(|&p| (p & 0xff) as u8).collect()
}

fn pack_6bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() / 4 * 3);
    for p in src.chunks_exact(4) {
        let v0 = (p[0] & 0x3f) as u8;
        let v1 = (p[1] & 0x3f) as u8;
        let v2 = (p[2] & 0x3f) as u8;
        let v3 = (p[3] & 0x3f) as u8;
        dst.push((v0 << 2) | (v1 >> 4));
        dst.push(((v1 & 0x0f) << 4) | (v2 >> 2));
        dst.push(((v2 & 0x03) << 6) | v3);
    }
    dst
}

fn pack_4bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() / 2);
    for p in src.chunks_exact(2) {
        dst.push((((p[0] & 0x0f) << 4) | (p[1] & 0x0f)) as u8);
    }
    dst
}

fn pack_2bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() / 4);
    for p in src.chunks_exact(4) {
        dst.push((((p[0] & 0x03) << 6) | ((p[1] & 0x03) << 4) | ((p[2] & 0x03) << 2) | (p[3] & 0x03)) as u8);
    }
    dst
}

fn pack_16bit(src: &[u16]) -> Vec<u8> {
    let mut dst = Vec::with_capacity(src.len() * 2);
    for &p in src {
        dst.extend_from_slice(&p.to_le_bytes());
    }
    dst
}

fn unpack_10bit(src: &[u8], pixel_count: usize) -> Vec<u16> {
    let mut dst = Vec::with_capacity(pixel_count);
    for b in src.chunks_exact(5) {
        dst.push(((b[0] as u16) << 2) | ((b[1] as u16) >> 6));
        dst.push((((b[1] as u16) & 0x3f) << 4) | ((b[2] as u16) >> 4));
        dst.push((((b[2] as u16) & 0x0f) << 6) | ((b[3] as u16) >> 2));
        dst.push((((b[3] as u16) & 0x03) << 8) | (b[4] as u16));
        if dst.len() >= pixel_count {
            break;
        }
    }
    dst.truncate(pixel_count);
    dst
}

fn unpack_12bit(src: &[u8], pixel_count: usize) -> Vec<u16> {
    let mut dst = Vec::with_capacity(pixel_count);
    for b in src.chunks_exact(3) {
        dst.push(((b[0] as u16) << 4) | ((b[1] as u16) >> 4));
        dst.push((((b[1] as u16) & 0x0f) << 8) | (b[2] as u16));
        if dst.len() >= pixel_count {
            break;
        }
    }
    dst.truncate(pixel_count);
    dst
}

fn unpack_14bit(src: &[u8], pixel_count: usize) -> Vec<u16> {
    let mut dst = Vec::with_capacity(pixel_count);
    for b in src.chunks_exact(7) {
        dst.push(((b[0] as u16) << 6) | ((b[1] as u16) >> 2));
        dst.push((((b[1] as u16) & 0x03) << 12) | ((b[2] as u16) << 4) | ((b[3] as u16) >> 4));
        dst.push((((b[3] as u16) & 0x0f) << 10) | ((b[4] as u16) << 2) | ((b[5] as u16) >> 6));
        dst.push((((b[5] as u16) & 0x3f) << 8) | (b[6] as u16));
        if dst.len() >= pixel_count {
            break;
        }
    }
    dst.truncate(pixel_count);
    dst
}

fn unpack_16bit(src: &[u8], pixel_count: usize) -> Vec<u16> {
    src.chunks_exact(2)
        .take(pixel_count)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}
