//! MCRAW container parsing.
//!
//! A clip is a JSON metadata document followed by a payload of frame
//! blocks. Several container variants exist; see [`detect`] for the
//! detection strategies. The parser borrows the container bytes and
//! builds an index of frame records; it performs no pixel work itself.

mod detect;
mod metadata;


use byteorder::{ByteOrder, LittleEndian};
use memchr::memchr_iter;

use crate::cfr::{self, FpsEstimate};
use crate::error::{RenderError, Result};
use crate::verbose_println;

pub use detect::{DetectionStrategy, ZSTD_MAGIC};
pub use metadata::{ClipMetadata, CfaPattern, DetectionConfidence, FrameMeta, Orientation};

/// Magic prefix of the fixed container header.
pub const MCRAW_MAGIC: &[u8; 5] = b"MCRAW";

/// Fixed header: magic, format version (u16), JSON offset and size (u32).
pub const HEADER_LEN: usize = 15;

/// The JSON document is searched within at most this prefix of the file.
const JSON_SCAN_LIMIT: usize = 50 * 1024 * 1024;

/// One indexed frame block.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Byte offset of the frame payload within the container
    pub offset: usize,

    /// Payload size in bytes
    pub size: usize,

    /// Whether the payload is a zstd stream
    pub compressed: bool,

    /// Normalized timestamp in source units
    pub timestamp: u64,

    /// Metadata fragment from the preceding type-3 block, if any
    pub meta: FrameMeta,
}

/// Parsed MCRAW container. Holds a borrowed view of the clip bytes; frame
/// records live as long as the parser.
pub struct McrawParser<'a> {
    data: &'a [u8],
    metadata: ClipMetadata,
    frames: Vec<FrameRecord>,
    audio: Vec<u8>,
    strategy: DetectionStrategy,
    confidence: DetectionConfidence,
    fps: FpsEstimate,
}

impl<'a> McrawParser<'a> {
    /// Parse the container: locate the metadata JSON, index the frames and
    /// reconcile timestamps.
    pub fn open(data: &'a [u8]) -> Result<McrawParser<'a>> {
        let (raw_meta, json_end) = locate_metadata(data)?;
        let metadata = ClipMetadata::from_raw(raw_meta)?;

        let detection = detect::detect_frames(data, json_end, &metadata)
            .ok_or(RenderError::ParserExhausted)?;

        let strategy = detection.strategy;
        let audio = detection.audio;
        let assumed_interval_us = (1e6 / cfr::ASSUMED_FPS) as u64;

        let mut frames: Vec<FrameRecord> = Vec::with_capacity(detection.frames.len());
        for (i, detected) in detection.frames.into_iter().enumerate() {
            let payload = &data[detected.offset..detected.offset + detected.size];
            let compressed =
                !detection.force_uncompressed && detect::is_compressed(payload, &metadata);

            // Timestamps from the per-frame metadata when present, else an
            // assumed-24fps synthesis in microseconds. Monotonicity is
            // enforced so the CFR planner can binary-walk the vector.
            let mut timestamp = detected
                .meta
                .timestamp
                .unwrap_or(i as u64 * assumed_interval_us);
            if let Some(prev) = frames.last() {
                if timestamp <= prev.timestamp {
                    timestamp = prev.timestamp + 1;
                }
            }

            frames.push(FrameRecord {
                offset: detected.offset,
                size: detected.size,
                compressed,
                timestamp,
                meta: detected.meta,
            });
        }

        let timestamps: Vec<u64> = frames.iter().map(|f| f.timestamp).collect();
        let fps = cfr::infer_fps(&timestamps);
        let confidence = DetectionConfidence::from_frame_count(frames.len());

        verbose_println!(
            "parsed container: {} frames, {:.2} fps median, confidence {:?}",
            frames.len(),
            fps.median_fps,
            confidence
        );

        Ok(McrawParser {
            data,
            metadata,
            frames,
            audio,
            strategy,
            confidence,
            fps,
        })
    }

    pub fn metadata(&self) -> &ClipMetadata {
        &self.metadata
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn detection_confidence(&self) -> DetectionConfidence {
        self.confidence
    }

    pub fn detection_strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    pub fn median_fps(&self) -> f64 {
        self.fps.median_fps
    }

    pub fn average_fps(&self) -> f64 {
        self.fps.average_fps
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }

    /// The embedded audio stream as one opaque blob.
    pub fn audio_data(&self) -> &[u8] {
        &self.audio
    }

    /// Raw (possibly compressed) payload bytes of a frame.
    pub fn frame_payload(&self, index: usize) -> Result<&'a [u8]> {
        let record = self
            .frames
            .get(index)
            .ok_or(RenderError::FrameOutOfRange(index, self.frames.len()))?;
        Ok(&self.data[record.offset..record.offset + record.size])
    }

    /// Frame payload with zstd decompression applied when needed.
    pub fn frame_data(&self, index: usize) -> Result<Vec<u8>> {
        let record = self
            .frames
            .get(index)
            .ok_or(RenderError::FrameOutOfRange(index, self.frames.len()))?;
        let payload = &self.data[record.offset..record.offset + record.size];

        if record.compressed {
            zstd::stream::decode_all(std::io::Cursor::new(payload))
                .map_err(|e| RenderError::DecompressionFailed(e.to_string()))
        } else {
            Ok(payload.to_vec())
        }
    }
}

/// Locate and parse the metadata JSON. Returns the raw metadata and the
/// byte offset where the payload region begins.
fn locate_metadata(data: &[u8]) -> Result<(metadata::RawClipMeta, usize)> {
    // Fixed header first: magic, version, JSON window
    if data.len() >= HEADER_LEN && &data[..MCRAW_MAGIC.len()] == MCRAW_MAGIC {
        let offset = LittleEndian::read_u32(&data[7..11]) as usize;
        let size = LittleEndian::read_u32(&data[11..15]) as usize;

        if offset >= HEADER_LEN && size > 0 && offset + size <= data.len() {
            if let Ok(raw) = serde_json::from_slice(&data[offset..offset + size]) {
                return Ok((raw, offset + size));
            }
        }
    }

    // Fall back to a brace-balanced scan of the file head
    let limit = data.len().min(JSON_SCAN_LIMIT);
    for start in memchr_iter(b'{', &data[..limit]) {
        if let Some(end) = balanced_json_end(&data[start..limit]) {
            if let Ok(raw) = serde_json::from_slice(&data[start..start + end]) {
                return Ok((raw, start + end));
            }
        }
    }

    Err(RenderError::ContainerInvalid(
        "no metadata JSON found".to_string(),
    ))
}

/// Length of the brace-balanced span starting at `data[0] == '{'`, if the
/// braces close within the slice. String literals are skipped so braces
/// inside values do not miscount.
fn balanced_json_end(data: &[u8]) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in data.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
