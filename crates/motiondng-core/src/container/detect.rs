//! Frame block detection.
//!
//! Containers in the wild come in several layouts. Detection runs an
//! ordered list of strategies over the payload region and stops at the
//! first one that yields at least one frame.

use byteorder::{ByteOrder, LittleEndian};
use memchr::memmem;

use crate::container::metadata::{ClipMetadata, FrameMeta};
use crate::verbose_println;

pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

pub(crate) const BLOCK_TYPE_FRAME: u32 = 2;
pub(crate) const BLOCK_TYPE_AUX: u32 = 3;

const FRAME_SIZE_MIN: usize = 1024;
const FRAME_SIZE_MAX: usize = 50 * 1024 * 1024;
const AUX_SIZE_MIN: usize = 100;
const AUX_SIZE_MAX: usize = 10 * 1024 * 1024;
const MAX_CONSECUTIVE_INVALID: u32 = 5;

/// Which strategy produced the frame index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    TypedBlocks,
    SizePrefixedZstd,
    MagicScan,
    FixedPartition,
    RawBayerPartition,
}

#[derive(Debug, Clone)]
pub(crate) struct DetectedFrame {
    pub offset: usize,
    pub size: usize,
    pub meta: FrameMeta,
}

#[derive(Debug, Clone)]
pub(crate) struct Detection {
    pub frames: Vec<DetectedFrame>,
    pub audio: Vec<u8>,
    pub strategy: DetectionStrategy,
    /// Strategy 5 knows its chunks are raw; skip the compression heuristic.
    pub force_uncompressed: bool,
}

/// Run every strategy in order until one finds frames. Returns `None` when
/// the payload yields nothing at all.
pub(crate) fn detect_frames(
    data: &[u8],
    payload_start: usize,
    meta: &ClipMetadata,
) -> Option<Detection> {
    let strategies: [fn(&[u8], usize, &ClipMetadata) -> Option<Detection>; 5] = [
        scan_typed_blocks,
        scan_size_prefixed_zstd,
        scan_zstd_magic,
        partition_fixed,
        partition_raw_bayer,
    ];

    for strategy in strategies {
        if let Some(detection) = strategy(data, payload_start, meta) {
            if !detection.frames.is_empty() {
                verbose_println!(
                    "detected {} frames via {:?}",
                    detection.frames.len(),
                    detection.strategy
                );
                return Some(detection);
            }
        }
    }

    None
}

/// Strategy 1: typed `{type, size, payload}` blocks. A type-3 block may
/// carry either opaque audio bytes or a JSON fragment annotating the next
/// frame block; a leading brace distinguishes them.
fn scan_typed_blocks(data: &[u8], payload_start: usize, _meta: &ClipMetadata) -> Option<Detection> {
    let mut frames = Vec::new();
    let mut audio = Vec::new();
    let mut pending_meta: Option<FrameMeta> = None;

    let mut pos = payload_start;
    let mut invalid = 0u32;

    while pos + 8 <= data.len() {
        let block_type = LittleEndian::read_u32(&data[pos..pos + 4]);
        let size = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
        let body = pos + 8;

        let valid = match block_type {
            BLOCK_TYPE_FRAME => {
                (FRAME_SIZE_MIN..=FRAME_SIZE_MAX).contains(&size) && body + size <= data.len()
            }
            BLOCK_TYPE_AUX => {
                (AUX_SIZE_MIN..=AUX_SIZE_MAX).contains(&size) && body + size <= data.len()
            }
            _ => false,
        };

        if !valid {
            pos += 1;
            invalid += 1;
            if invalid >= MAX_CONSECUTIVE_INVALID {
                break;
            }
            continue;
        }
        invalid = 0;

        let payload = &data[body..body + size];
        match block_type {
            BLOCK_TYPE_FRAME => {
                frames.push(DetectedFrame {
                    offset: body,
                    size,
                    meta: pending_meta.take().unwrap_or_default(),
                });
            }
            _ => {
                if payload.first() == Some(&b'{') {
                    match serde_json::from_slice::<FrameMeta>(payload) {
                        Ok(meta) => pending_meta = Some(meta),
                        Err(_) => audio.extend_from_slice(payload),
                    }
                } else {
                    audio.extend_from_slice(payload);
                }
            }
        }

        pos = body + size;
    }

    Some(Detection {
        frames,
        audio,
        strategy: DetectionStrategy::TypedBlocks,
        force_uncompressed: false,
    })
}

/// Strategy 2: `{size, zstd stream}` records without block types.
fn scan_size_prefixed_zstd(
    data: &[u8],
    payload_start: usize,
    _meta: &ClipMetadata,
) -> Option<Detection> {
    let mut frames = Vec::new();
    let mut pos = payload_start;

    while pos + 8 <= data.len() {
        let size = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
        let body = pos + 4;

        if !(FRAME_SIZE_MIN..=FRAME_SIZE_MAX).contains(&size)
            || body + size > data.len()
            || data[body..body + 4] != ZSTD_MAGIC
        {
            break;
        }

        frames.push(DetectedFrame {
            offset: body,
            size,
            meta: FrameMeta::default(),
        });
        pos = body + size;
    }

    Some(Detection {
        frames,
        audio: Vec::new(),
        strategy: DetectionStrategy::SizePrefixedZstd,
        force_uncompressed: false,
    })
}

/// Strategy 3: every zstd magic begins a frame; successive magics bound
/// the previous one.
fn scan_zstd_magic(data: &[u8], payload_start: usize, _meta: &ClipMetadata) -> Option<Detection> {
    let offsets: Vec<usize> = memmem::find_iter(&data[payload_start..], &ZSTD_MAGIC)
        .map(|o| o + payload_start)
        .collect();

    if offsets.is_empty() {
        return None;
    }

    let mut frames = Vec::with_capacity(offsets.len());
    for (i, &offset) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());
        frames.push(DetectedFrame {
            offset,
            size: end - offset,
            meta: FrameMeta::default(),
        });
    }

    Some(Detection {
        frames,
        audio: Vec::new(),
        strategy: DetectionStrategy::MagicScan,
        force_uncompressed: false,
    })
}

/// Strategy 4: split the payload evenly into `numSegments` chunks when the
/// metadata advertises a segment count.
fn partition_fixed(data: &[u8], payload_start: usize, meta: &ClipMetadata) -> Option<Detection> {
    if meta.num_segments == 0 {
        return None;
    }

    let remaining = data.len().saturating_sub(payload_start);
    let chunk = remaining / meta.num_segments as usize;
    if chunk < FRAME_SIZE_MIN {
        return None;
    }

    let frames = (0..meta.num_segments as usize)
        .map(|i| DetectedFrame {
            offset: payload_start + i * chunk,
            size: chunk,
            meta: FrameMeta::default(),
        })
        .collect();

    Some(Detection {
        frames,
        audio: Vec::new(),
        strategy: DetectionStrategy::FixedPartition,
        force_uncompressed: false,
    })
}

/// Strategy 5: assume raw uncompressed 16-bit Bayer frames of the known
/// geometry, packed back to back.
fn partition_raw_bayer(data: &[u8], payload_start: usize, meta: &ClipMetadata) -> Option<Detection> {
    let frame_size = meta.width as usize * meta.height as usize * 2;
    if frame_size == 0 {
        return None;
    }

    let remaining = data.len().saturating_sub(payload_start);
    let count = remaining / frame_size;
    if count == 0 {
        return None;
    }

    let frames = (0..count)
        .map(|i| DetectedFrame {
            offset: payload_start + i * frame_size,
            size: frame_size,
            meta: FrameMeta::default(),
        })
        .collect();

    Some(Detection {
        frames,
        audio: Vec::new(),
        strategy: DetectionStrategy::RawBayerPartition,
        force_uncompressed: true,
    })
}

/// A frame payload counts as compressed when it opens with the zstd magic
/// or is materially smaller than a 12-bit packed full frame.
pub(crate) fn is_compressed(payload: &[u8], meta: &ClipMetadata) -> bool {
    if payload.len() >= 4 && payload[..4] == ZSTD_MAGIC {
        return true;
    }
    let raw_expectation = meta.width as f64 * meta.height as f64 * 1.5;
    (payload.len() as f64) < 0.9 * raw_expectation
}
