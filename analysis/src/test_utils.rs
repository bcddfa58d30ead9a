//! Builders for synthetic analyses used across the workspace's tests.
//!
//! The jukebox metric reduces to `|Δloudness_start|` when every other
//! feature is held constant and each beat overlaps exactly one aligned
//! segment, which makes inter-beat distances directly scriptable: pick the
//! per-beat loudness values and you have picked the distance matrix.

use crate::payload::{RawAnalysis, RawQuantum, RawSegment};

/// A track of `loudness.len()` back-to-back beats of `beat_duration`
/// seconds, each overlapped by exactly one aligned segment whose
/// `loudness_start` is the given value. All other features are constant, so
/// `beat_distance(i, j) == |loudness[i] - loudness[j]|`.
#[must_use]
#[allow(clippy::missing_inline_in_public_items)]
pub fn track_from_loudness(loudness: &[f64], beat_duration: f64) -> RawAnalysis {
    let beats: Vec<RawQuantum> = (0..loudness.len())
        .map(|i| RawQuantum {
            start: i as f64 * beat_duration,
            duration: beat_duration,
            confidence: 1.0,
        })
        .collect();
    let segments: Vec<RawSegment> = loudness
        .iter()
        .enumerate()
        .map(|(i, &loudness_start)| RawSegment {
            start: i as f64 * beat_duration,
            duration: beat_duration,
            confidence: 1.0,
            loudness_start,
            loudness_max: -10.0,
            loudness_max_time: 0.05,
            pitches: vec![0.5; crate::VECTOR_LEN],
            timbre: vec![1.0; crate::VECTOR_LEN],
        })
        .collect();
    RawAnalysis {
        beats,
        segments,
        ..RawAnalysis::default()
    }
}

/// Per-beat loudness values that keep every pair of beats far apart
/// (no candidate edges at all under any reasonable threshold).
#[must_use]
#[inline]
pub fn isolated_loudness(total_beats: usize) -> Vec<f64> {
    (0..total_beats).map(|i| i as f64 * 10_000.0).collect()
}
