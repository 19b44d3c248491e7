//! Constant-framerate planning.
//!
//! Capture timestamps from phones are variable; playback wants a constant
//! rate. The planner infers the source framerate from timestamp deltas,
//! picks a target per policy, and maps every output frame index to the
//! source frame nearest its ideal presentation time.

use crate::models::CfrTarget;

/// Rates the inferred fps snaps to when within 5% relative distance.
const SNAP_RATES: &[f64] = &[18.0, 24.0, 25.0, 29.97, 30.0, 48.0, 50.0, 59.94, 60.0, 120.0];

/// Candidate rates for the integer-preference policy.
const INTEGER_RATES: &[f64] = &[18.0, 24.0, 25.0, 30.0, 48.0, 50.0, 60.0, 120.0, 240.0];

/// NTSC drop-frame rates.
const DROP_FRAME_RATES: &[f64] = &[23.976, 29.97, 59.94];

/// Fallback rate when a container has too few timestamps to infer one.
pub const ASSUMED_FPS: f64 = 24.0;

/// Source framerate statistics inferred from the timestamp vector.
#[derive(Debug, Clone, Copy)]
pub struct FpsEstimate {
    /// Median-interval rate, snapped to a standard rate when close
    pub median_fps: f64,

    /// Mean-interval rate, unsnapped
    pub average_fps: f64,

    /// Median frame interval in seconds
    pub median_interval: f64,

    /// Scale dividing source timestamp units into seconds
    pub unit_scale: f64,
}

/// The output-to-source frame mapping for one container and target.
#[derive(Debug, Clone)]
pub struct FramePlan {
    /// Source index for each output frame
    pub mapping: Vec<usize>,

    /// Selected output framerate
    pub fps_target: f64,

    /// Source frames never referenced by an output frame
    pub dropped: usize,

    /// Output frames sharing a source with an earlier output frame
    pub duplicated: usize,
}

impl FramePlan {
    /// Source frames referenced at least once.
    pub fn kept(&self) -> usize {
        self.mapping.len() - self.duplicated
    }
}

/// Infer source framerate statistics from raw timestamps.
///
/// The timestamp unit (ns, us, ms or s) is classified from the magnitude
/// of the median delta.
pub fn infer_fps(timestamps: &[u64]) -> FpsEstimate {
    if timestamps.len() < 2 {
        return FpsEstimate {
            median_fps: ASSUMED_FPS,
            average_fps: ASSUMED_FPS,
            median_interval: 1.0 / ASSUMED_FPS,
            unit_scale: 1.0,
        };
    }

    let mut deltas: Vec<f64> = timestamps
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]) as f64)
        .collect();
    deltas.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median_delta = deltas[deltas.len() / 2];
    let mean_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;

    let unit_scale = classify_unit_scale(median_delta);
    let median_interval = median_delta / unit_scale;
    let mean_interval = mean_delta / unit_scale;

    let raw_fps = if median_interval > 0.0 { 1.0 / median_interval } else { ASSUMED_FPS };
    let average_fps = if mean_interval > 0.0 { 1.0 / mean_interval } else { raw_fps };

    FpsEstimate {
        median_fps: snap_fps(raw_fps),
        average_fps,
        median_interval,
        unit_scale,
    }
}

/// Units per second for the magnitude class of a frame delta.
fn classify_unit_scale(median_delta: f64) -> f64 {
    if median_delta > 1e7 {
        1e9 // nanoseconds
    } else if median_delta > 1e4 {
        1e6 // microseconds
    } else if median_delta > 10.0 {
        1e3 // milliseconds
    } else {
        1.0
    }
}

/// Snap to the nearest standard rate within 5% relative distance.
fn snap_fps(fps: f64) -> f64 {
    let mut best = fps;
    let mut best_dist = f64::MAX;
    for &rate in SNAP_RATES {
        let dist = (fps - rate).abs();
        if dist / rate <= 0.05 && dist < best_dist {
            best = rate;
            best_dist = dist;
        }
    }
    best
}

fn nearest(rates: &[f64], fps: f64) -> f64 {
    let mut best = rates[0];
    for &rate in rates {
        if (fps - rate).abs() < (fps - best).abs() {
            best = rate;
        }
    }
    best
}

/// Pick the output framerate for a target policy.
pub fn select_target_fps(estimate: &FpsEstimate, target: CfrTarget) -> f64 {
    match target {
        CfrTarget::Disabled => estimate.median_fps,
        CfrTarget::PreferInteger => nearest(INTEGER_RATES, estimate.median_fps),
        CfrTarget::PreferDropFrame => {
            let candidate = nearest(DROP_FRAME_RATES, estimate.median_fps);
            if (estimate.median_fps - candidate).abs() / candidate <= 0.05 {
                candidate
            } else {
                nearest(INTEGER_RATES, estimate.median_fps)
            }
        }
        CfrTarget::MedianSlowMotion => {
            if estimate.median_interval > 0.0 {
                1.0 / estimate.median_interval
            } else {
                estimate.median_fps
            }
        }
        CfrTarget::AverageTesting => estimate.average_fps,
        CfrTarget::Custom(v) => v as f64,
    }
}

/// Build the output-to-source mapping for a target policy.
///
/// With `CfrTarget::Disabled` every source frame maps through unchanged.
/// Otherwise the clip duration (span plus one median interval) is resampled
/// at the target rate and each output index takes the source frame whose
/// timestamp is nearest `k / fps_target`.
pub fn plan_frames(timestamps: &[u64], target: CfrTarget) -> FramePlan {
    let estimate = infer_fps(timestamps);
    let fps_target = select_target_fps(&estimate, target);

    if timestamps.len() <= 1 || matches!(target, CfrTarget::Disabled) || fps_target <= 0.0 {
        return FramePlan {
            mapping: (0..timestamps.len()).collect(),
            fps_target,
            dropped: 0,
            duplicated: 0,
        };
    }

    let t0 = timestamps[0];
    let relative: Vec<f64> = timestamps
        .iter()
        .map(|&t| t.saturating_sub(t0) as f64 / estimate.unit_scale)
        .collect();

    let span = relative[relative.len() - 1];
    let duration = span + estimate.median_interval;
    let n_out = ((duration * fps_target).round() as usize).max(1);

    let mut mapping = Vec::with_capacity(n_out);
    let mut used = vec![false; timestamps.len()];
    let mut cursor = 0usize;

    for k in 0..n_out {
        let ideal = k as f64 / fps_target;

        // Timestamps are monotone, so the nearest source frame never moves
        // backwards between output indices.
        while cursor + 1 < relative.len()
            && (relative[cursor + 1] - ideal).abs() <= (relative[cursor] - ideal).abs()
        {
            cursor += 1;
        }

        mapping.push(cursor);
        used[cursor] = true;
    }

    let kept = used.iter().filter(|&&u| u).count();
    FramePlan {
        dropped: timestamps.len() - kept,
        duplicated: n_out - kept,
        mapping,
        fps_target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Evenly spaced timestamps at the given interval and unit scale.
    fn even_timestamps(count: usize, interval: u64) -> Vec<u64> {
        (0..count as u64).map(|i| i * interval).collect()
    }

    #[test]
    fn test_infer_fps_microseconds() {
        // 41666 us deltas: ~24.0002 fps, snapped to 24
        let ts = even_timestamps(24, 41_666);
        let est = infer_fps(&ts);
        assert_eq!(est.unit_scale, 1e6);
        assert_eq!(est.median_fps, 24.0);
    }

    #[test]
    fn test_infer_fps_nanoseconds() {
        let ts = even_timestamps(50, 33_333_333);
        let est = infer_fps(&ts);
        assert_eq!(est.unit_scale, 1e9);
        assert_eq!(est.median_fps, 30.0);
    }

    #[test]
    fn test_infer_fps_milliseconds() {
        let ts = even_timestamps(30, 40);
        let est = infer_fps(&ts);
        assert_eq!(est.unit_scale, 1e3);
        assert_eq!(est.median_fps, 25.0);
    }

    #[test]
    fn test_snap_prefers_nearest_rate() {
        // 29.9 fps is inside both the 29.97 and 30 windows; nearest wins
        let ts = even_timestamps(50, 33_444);
        let est = infer_fps(&ts);
        assert_eq!(est.median_fps, 29.97);

        // Exactly 30 fps stays 30
        let ts = even_timestamps(50, 33_333);
        let est = infer_fps(&ts);
        assert_eq!(est.median_fps, 30.0);
    }

    #[test]
    fn test_no_snap_outside_window() {
        // 15 fps is not near any standard rate
        let ts = even_timestamps(10, 66_666);
        let est = infer_fps(&ts);
        assert!((est.median_fps - 15.0).abs() < 0.01);
    }

    #[test]
    fn test_target_selection() {
        let ts = even_timestamps(48, 41_666);
        let est = infer_fps(&ts);

        assert_eq!(select_target_fps(&est, CfrTarget::Disabled), 24.0);
        assert_eq!(select_target_fps(&est, CfrTarget::PreferInteger), 24.0);
        assert_eq!(select_target_fps(&est, CfrTarget::PreferDropFrame), 23.976);
        assert_eq!(select_target_fps(&est, CfrTarget::Custom(48.0)), 48.0);

        let literal = select_target_fps(&est, CfrTarget::MedianSlowMotion);
        assert!((literal - 24.0002).abs() < 0.01);
    }

    #[test]
    fn test_drop_frame_falls_back_to_integer() {
        // 120 fps is nowhere near a drop-frame rate
        let ts = even_timestamps(100, 8_333);
        let est = infer_fps(&ts);
        assert_eq!(select_target_fps(&est, CfrTarget::PreferDropFrame), 120.0);
    }

    #[test]
    fn test_plan_disabled_is_identity() {
        let ts = even_timestamps(24, 41_666);
        let plan = plan_frames(&ts, CfrTarget::Disabled);
        assert_eq!(plan.mapping, (0..24).collect::<Vec<_>>());
        assert_eq!(plan.dropped, 0);
        assert_eq!(plan.duplicated, 0);
    }

    #[test]
    fn test_plan_steady_clip_maps_one_to_one() {
        let ts = even_timestamps(24, 41_666);
        let plan = plan_frames(&ts, CfrTarget::PreferInteger);
        assert_eq!(plan.fps_target, 24.0);
        assert_eq!(plan.mapping.len(), 24);
        assert_eq!(plan.dropped, 0);
        assert_eq!(plan.duplicated, 0);
        assert_eq!(plan.mapping, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_plan_missed_frame_duplicates() {
        // One doubled interval: the gap frame gets served twice
        let mut ts = Vec::new();
        let mut t = 0u64;
        for i in 0..25 {
            ts.push(t);
            t += if i == 11 { 83_332 } else { 41_666 };
        }

        let plan = plan_frames(&ts, CfrTarget::PreferDropFrame);
        assert_eq!(plan.fps_target, 23.976);
        assert_eq!(plan.mapping.len(), 26);
        assert_eq!(plan.duplicated, 1);
        assert_eq!(plan.dropped, 0);
    }

    #[test]
    fn test_plan_accounting_invariant() {
        // Irregular clip: kept + dropped == total_in, kept + duplicated == total_out
        let ts: Vec<u64> = vec![0, 30_000, 45_000, 95_000, 130_000, 171_000, 212_000, 255_000];
        let plan = plan_frames(&ts, CfrTarget::PreferInteger);

        assert_eq!(plan.kept() + plan.dropped, ts.len());
        assert_eq!(plan.kept() + plan.duplicated, plan.mapping.len());
    }

    #[test]
    fn test_plan_single_frame() {
        let plan = plan_frames(&[1_000_000], CfrTarget::PreferDropFrame);
        assert_eq!(plan.mapping, vec![0]);
        assert_eq!(plan.dropped, 0);
        assert_eq!(plan.duplicated, 0);
    }

    #[test]
    fn test_plan_empty() {
        let plan = plan_frames(&[], CfrTarget::PreferInteger);
        assert!(plan.mapping.is_empty());
    }

    #[test]
    fn test_plan_mapping_monotone() {
        let ts: Vec<u64> = (0..60u64).map(|i| i * 41_666 + (i % 3) * 700).collect();
        let plan = plan_frames(&ts, CfrTarget::PreferDropFrame);
        for w in plan.mapping.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }
}
