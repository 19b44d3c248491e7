//! Sequence orchestration.
//!
//! A [`DngSequence`] captures one container plus one settings snapshot and
//! exposes the planned output frames as a lazy, random-access sequence of
//! DNG byte streams. Rendering is deduplicated per frame key and composed
//! around an external cache collaborator.

mod single_flight;


use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use serde::Serialize;

use crate::cfr::{self, FramePlan};
use crate::container::McrawParser;
use crate::dng;
use crate::error::{RenderError, Result};
use crate::models::{CfrTarget, RenderOptions, RenderSettings};
use crate::render;
use crate::verbose_println;

use single_flight::SingleFlight;

/// Jobs abort once failures pass this share of the planned frames.
const FAILURE_ABORT_RATIO: f64 = 0.8;

/// External cache collaborator holding already-rendered DNG bytes. A
/// settings change invalidates entries by key divergence, never by
/// eviction from here.
pub trait DngCache: Send + Sync {
    fn get(&self, key: u64) -> Option<Vec<u8>>;
    fn put(&self, key: u64, bytes: &[u8]);
}

/// Cache that never holds anything; every request renders.
pub struct NoopCache;

impl DngCache for NoopCache {
    fn get(&self, _key: u64) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: u64, _bytes: &[u8]) {}
}

/// Best-effort cancellation flag, checked between frames.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a container under the current settings.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub median_fps: f64,
    pub average_fps: f64,
    pub target_fps: f64,
    pub total_frames: usize,
    pub dropped_frames: usize,
    pub duplicated_frames: usize,
    pub width: u32,
    pub height: u32,
}

/// One planned output frame.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    /// Output file name, e.g. `clip_frame_00001.dng`
    pub name: String,

    /// Index of the source frame serving this output frame
    pub source_index: usize,
}

/// Outcome of a batch render.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
    pub total: usize,

    /// Frame index and error text of each failure
    pub failures: Vec<(usize, String)>,

    /// True when the failure threshold aborted the job
    pub aborted: bool,
}

/// A container and settings snapshot rendered as a sequence of DNGs.
pub struct DngSequence<'a> {
    parser: &'a McrawParser<'a>,
    settings: RenderSettings,
    base_name: String,
    plan: FramePlan,
    baseline: f64,
    fingerprint: u64,
    container_id: u64,
    single_flight: SingleFlight,
    typical_size: AtomicUsize,
}

impl<'a> DngSequence<'a> {
    pub fn new(parser: &'a McrawParser<'a>, settings: RenderSettings, base_name: &str) -> Self {
        let target = if settings.options.contains(RenderOptions::FRAMERATE_CONVERSION) {
            settings.cfr_target
        } else {
            CfrTarget::Disabled
        };
        let plan = cfr::plan_frames(&parser.timestamps(), target);

        verbose_println!(
            "planned {} output frames at {:.3} fps ({} dropped, {} duplicated)",
            plan.mapping.len(),
            plan.fps_target,
            plan.dropped,
            plan.duplicated
        );

        let fingerprint = settings.fingerprint();
        DngSequence {
            baseline: exposure_baseline(parser),
            container_id: container_id(parser),
            parser,
            settings,
            base_name: base_name.to_string(),
            plan,
            fingerprint,
            single_flight: SingleFlight::default(),
            typical_size: AtomicUsize::new(0),
        }
    }

    /// Number of planned output frames.
    pub fn len(&self) -> usize {
        self.plan.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.mapping.is_empty()
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Cache / single-flight key of one output frame under the captured
    /// settings.
    pub fn frame_key(&self, index: usize) -> u64 {
        let mut key = self.container_id ^ self.fingerprint;
        key ^= (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        key = key.wrapping_mul(0xff51_afd7_ed55_8ccd);
        key ^= key >> 33;
        key
    }

    /// The planned output entries in order.
    pub fn entries(&self) -> Vec<OutputEntry> {
        (0..self.len())
            .map(|i| OutputEntry {
                name: format!("{}_frame_{:05}.dng", self.base_name, i + 1),
                source_index: self.plan.mapping[i],
            })
            .collect()
    }

    pub fn file_info(&self) -> FileInfo {
        let meta = self.parser.metadata();
        let geometry = render::output_geometry(meta.width, meta.height, &self.settings);

        FileInfo {
            median_fps: self.parser.median_fps(),
            average_fps: self.parser.average_fps(),
            target_fps: self.plan.fps_target,
            total_frames: self.len(),
            dropped_frames: self.plan.dropped,
            duplicated_frames: self.plan.duplicated,
            width: geometry.width,
            height: geometry.height,
        }
    }

    /// Typical DNG size, known once the first frame has rendered.
    pub fn projected_size(&self) -> Option<usize> {
        match self.typical_size.load(Ordering::Relaxed) {
            0 => None,
            size => Some(size),
        }
    }

    /// Render one output frame to DNG bytes, consulting the cache and
    /// sharing concurrent renders of the same key.
    pub fn render_frame(&self, index: usize, cache: &dyn DngCache) -> Result<Vec<u8>> {
        if index >= self.len() {
            return Err(RenderError::FrameOutOfRange(index, self.len()));
        }

        let key = self.frame_key(index);
        if let Some(bytes) = cache.get(key) {
            return Ok(bytes);
        }

        self.single_flight.run(key, || {
            let bytes = self.render_uncached(index)?;
            cache.put(key, &bytes);
            Ok(bytes)
        })
    }

    /// Random-access sub-range read of one output frame, for callers that
    /// serve filesystem-style reads.
    pub fn read_frame(
        &self,
        index: usize,
        pos: usize,
        len: usize,
        cache: &dyn DngCache,
    ) -> Result<Vec<u8>> {
        let bytes = self.render_frame(index, cache)?;
        if pos >= bytes.len() {
            return Ok(Vec::new());
        }
        let end = (pos + len).min(bytes.len());
        Ok(bytes[pos..end].to_vec())
    }

    fn render_uncached(&self, index: usize) -> Result<Vec<u8>> {
        let meta = self.parser.metadata();
        let source_index = self.plan.mapping[index];
        let record = &self.parser.frames()[source_index];

        let payload = self.parser.frame_data(source_index)?;
        let (bayer, width, height) = render::prepare_bayer(&payload, meta)?;

        let rendered = render::render_frame(
            &bayer,
            width,
            height,
            meta,
            &record.meta,
            &self.settings,
        )?;

        let bytes = dng::write_dng(
            &rendered,
            meta,
            &self.settings,
            self.plan.fps_target,
            index as u32,
            self.baseline,
        );

        self.typical_size.store(bytes.len(), Ordering::Relaxed);
        Ok(bytes)
    }

    /// Render every planned frame in parallel, feeding each result to
    /// `sink`. Per-frame failures are collected; the job aborts once they
    /// exceed the failure threshold, and cancellation is honored between
    /// frames.
    pub fn render_all<F>(
        &self,
        cache: &dyn DngCache,
        cancel: &CancelToken,
        sink: F,
    ) -> Result<BatchSummary>
    where
        F: Fn(usize, &OutputEntry, &[u8]) -> Result<()> + Sync,
    {
        self.render_range(0..self.len(), cache, cancel, sink)
    }

    /// [`Self::render_all`] restricted to a sub-range of output indices.
    pub fn render_range<F>(
        &self,
        range: std::ops::Range<usize>,
        cache: &dyn DngCache,
        cancel: &CancelToken,
        sink: F,
    ) -> Result<BatchSummary>
    where
        F: Fn(usize, &OutputEntry, &[u8]) -> Result<()> + Sync,
    {
        let start = range.start.min(self.len());
        let range = start..range.end.clamp(start, self.len());
        let entries = self.entries();
        let total = range.len();
        let failure_limit = (total as f64 * FAILURE_ABORT_RATIO) as usize;
        let failed_count = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);
        // First job-level error; frame-local failures only count toward
        // the threshold, everything else fails the whole job
        let fatal: Mutex<Option<RenderError>> = Mutex::new(None);

        let results: Vec<Option<(usize, String)>> = entries[range.clone()]
            .par_iter()
            .enumerate()
            .map(|(offset, entry)| {
                let index = range.start + offset;
                if cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
                    return Some((index, RenderError::Cancelled.to_string()));
                }

                let outcome = self
                    .render_frame(index, cache)
                    .and_then(|bytes| sink(index, entry, &bytes));

                match outcome {
                    Ok(()) => None,
                    Err(err) if err.is_frame_local() => {
                        let failures = failed_count.fetch_add(1, Ordering::SeqCst) + 1;
                        if failures > failure_limit {
                            aborted.store(true, Ordering::SeqCst);
                        }
                        Some((index, err.to_string()))
                    }
                    Err(err) => {
                        aborted.store(true, Ordering::SeqCst);
                        let mut slot = fatal.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(err.clone());
                        }
                        Some((index, err.to_string()))
                    }
                }
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        if let Some(err) = fatal.into_inner().unwrap() {
            return Err(err);
        }

        let mut summary = BatchSummary {
            total,
            aborted: aborted.load(Ordering::SeqCst),
            ..Default::default()
        };
        for result in results {
            match result {
                None => summary.successful += 1,
                Some(failure) => {
                    summary.failed += 1;
                    summary.failures.push(failure);
                }
            }
        }
        summary.failures.sort_by_key(|&(index, _)| index);

        Ok(summary)
    }
}

/// Container-wide median of `iso * exposure_time`, the reference for
/// exposure normalization.
fn exposure_baseline(parser: &McrawParser<'_>) -> f64 {
    let meta = parser.metadata();
    let mut products: Vec<f64> = parser
        .frames()
        .iter()
        .map(|f| {
            f.meta.iso.unwrap_or(meta.iso) * f.meta.exposure_time.unwrap_or(meta.exposure_time)
        })
        .filter(|&p| p > 0.0)
        .collect();

    if products.is_empty() {
        return meta.iso * meta.exposure_time;
    }

    products.sort_by(|a, b| a.partial_cmp(b).unwrap());
    products[products.len() / 2]
}

/// Stable identity for a parsed container, distinguishing sequences built
/// over different clips.
fn container_id(parser: &McrawParser<'_>) -> u64 {
    let meta = parser.metadata();
    let mut id = 0xcbf2_9ce4_8422_2325u64;
    for value in [
        meta.width as u64,
        meta.height as u64,
        parser.frame_count() as u64,
        parser.frames().first().map(|f| f.offset as u64).unwrap_or(0),
        parser.frames().first().map(|f| f.size as u64).unwrap_or(0),
        parser.frames().last().map(|f| f.timestamp).unwrap_or(0),
    ] {
        id ^= value;
        id = id.wrapping_mul(0x0000_0100_0000_01b3);
    }
    id
}
