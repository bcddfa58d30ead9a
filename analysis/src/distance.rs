//! The weighted feature metric over segments and beats.
//!
//! Two beats are "close" when the segments they overlap carry similar
//! timbre, pitch, loudness, duration, and confidence. Pitch similarity and
//! duration similarity dominate the sum; the weights are long-standing
//! tuning values, not anything principled.

use crate::normalize::{Analysis, Quantum, Segment};

const TIMBRE_WEIGHT: f64 = 1.0;
const PITCH_WEIGHT: f64 = 10.0;
const LOUDNESS_START_WEIGHT: f64 = 1.0;
const LOUDNESS_MAX_WEIGHT: f64 = 1.0;
const DURATION_WEIGHT: f64 = 100.0;
const CONFIDENCE_WEIGHT: f64 = 1.0;

/// Cost of a segment slot the other beat cannot fill.
const MISSING_SEGMENT_COST: f64 = 100.0;
/// Penalty for beats sitting at different offsets within their bars.
const PARENT_OFFSET_PENALTY: f64 = 100.0;

#[must_use]
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Weighted distance between two segments.
#[must_use]
#[inline]
pub fn segment_distance(s1: &Segment, s2: &Segment) -> f64 {
    TIMBRE_WEIGHT * euclidean(&s1.timbre, &s2.timbre)
        + PITCH_WEIGHT * euclidean(&s1.pitches, &s2.pitches)
        + LOUDNESS_START_WEIGHT * (s1.loudness_start - s2.loudness_start).abs()
        + LOUDNESS_MAX_WEIGHT * (s1.loudness_max - s2.loudness_max).abs()
        + DURATION_WEIGHT * (s1.duration - s2.duration).abs()
        + CONFIDENCE_WEIGHT * (s1.confidence - s2.confidence).abs()
}

/// Distance between two beats: the average pairwise distance of their
/// overlapping segments, plus a penalty when the beats sit at different
/// offsets within their bars. Slots `q2` cannot fill cost
/// [`MISSING_SEGMENT_COST`] each.
///
/// Returns `None` when `q1` overlaps no segments; such a beat participates
/// in no outgoing edges.
#[must_use]
#[allow(clippy::missing_inline_in_public_items)]
pub fn beat_distance(analysis: &Analysis, q1: &Quantum, q2: &Quantum) -> Option<f64> {
    if q1.overlapping_segments.is_empty() {
        return None;
    }

    let mut sum = 0.0;
    for (slot, &seg1) in q1.overlapping_segments.iter().enumerate() {
        sum += match q2.overlapping_segments.get(slot) {
            Some(&seg2) => segment_distance(&analysis.segments[seg1], &analysis.segments[seg2]),
            None => MISSING_SEGMENT_COST,
        };
    }

    let penalty = if q1.index_in_parent == q2.index_in_parent {
        0.0
    } else {
        PARENT_OFFSET_PENALTY
    };

    Some(sum / q1.overlapping_segments.len() as f64 + penalty)
}
