//! Normalization of a raw payload into a navigable analysis.
//!
//! The normalized form is arena-based: every quantum level is a flat,
//! start-sorted vector with dense indices, and all cross references (parent
//! bar, child tatums, overlapping segments) are indices into those vectors.
//! Holding indices instead of pointers keeps the section ⊃ bar ⊃ beat ⊃
//! tatum hierarchy free of reference cycles.

use crate::VECTOR_LEN;
use crate::payload::{RawAnalysis, RawQuantum, RawSegment, TrackInfo};

/// A normalized quantum. `prev`/`next` within a level are implicit: the
/// quantum at `index - 1` / `index + 1` of the same level vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Quantum {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
    /// Dense position within this quantum's level; uniquely identifies it.
    pub index: usize,
    /// Index of the containing quantum one level up, if any.
    pub parent: Option<usize>,
    /// Position among the parent's children.
    pub index_in_parent: usize,
    /// Ordered indices of contained quanta one level down.
    pub children: Vec<usize>,
    /// Ordered indices of segments whose interval intersects this quantum's.
    /// Only populated for beats.
    pub overlapping_segments: Vec<usize>,
}

impl Quantum {
    #[must_use]
    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether `t` falls inside this quantum's `[start, start + duration)`
    /// interval.
    #[must_use]
    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end()
    }
}

/// A normalized segment with fixed-size feature vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
    pub loudness_start: f64,
    pub loudness_max: f64,
    pub loudness_max_time: f64,
    pub pitches: [f64; VECTOR_LEN],
    pub timbre: [f64; VECTOR_LEN],
    pub index: usize,
}

impl Segment {
    #[must_use]
    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// The normalized analysis for one track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Analysis {
    pub sections: Vec<Quantum>,
    pub bars: Vec<Quantum>,
    pub beats: Vec<Quantum>,
    pub tatums: Vec<Quantum>,
    pub segments: Vec<Segment>,
    pub track: TrackInfo,
}

impl Analysis {
    /// Normalize a raw payload.
    ///
    /// Never fails: quanta with non-positive duration are dropped, short
    /// feature vectors are zero-padded, and missing arrays stay empty.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn normalize(raw: RawAnalysis) -> Self {
        let mut analysis = Self {
            sections: level(&raw.sections),
            bars: level(&raw.bars),
            beats: level(&raw.beats),
            tatums: level(&raw.tatums),
            segments: segments(raw.segments),
            track: raw.track,
        };

        link_levels(&mut analysis.sections, &mut analysis.bars);
        link_levels(&mut analysis.bars, &mut analysis.beats);
        link_levels(&mut analysis.beats, &mut analysis.tatums);
        attach_segments(&mut analysis.beats, &analysis.segments);

        log::debug!(
            "normalized analysis: {} sections, {} bars, {} beats, {} tatums, {} segments",
            analysis.sections.len(),
            analysis.bars.len(),
            analysis.beats.len(),
            analysis.tatums.len(),
            analysis.segments.len(),
        );

        analysis
    }

    #[must_use]
    #[inline]
    pub fn total_beats(&self) -> usize {
        self.beats.len()
    }

    /// The beat whose interval contains `t`, if any.
    #[must_use]
    #[inline]
    pub fn beat_at_time(&self, t: f64) -> Option<&Quantum> {
        let idx = index_at_or_before(&self.beats, t)?;
        let beat = &self.beats[idx];
        beat.contains(t).then_some(beat)
    }
}

/// Index of the quantum containing `t`, or of the nearest earlier quantum.
/// `None` when `t` lies before the first quantum (or the level is empty).
#[must_use]
#[inline]
pub fn index_at_or_before(quanta: &[Quantum], t: f64) -> Option<usize> {
    let after = quanta.partition_point(|q| q.start <= t);
    after.checked_sub(1)
}

fn level(raw: &[RawQuantum]) -> Vec<Quantum> {
    let mut quanta: Vec<Quantum> = raw
        .iter()
        .filter(|q| q.duration > 0.0 && q.start.is_finite())
        .map(|q| Quantum {
            start: q.start,
            duration: q.duration,
            confidence: q.confidence,
            ..Quantum::default()
        })
        .collect();
    quanta.sort_by(|a, b| a.start.total_cmp(&b.start));
    for (index, q) in quanta.iter_mut().enumerate() {
        q.index = index;
    }
    quanta
}

fn segments(raw: Vec<RawSegment>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = raw
        .into_iter()
        .filter(|s| s.duration > 0.0 && s.start.is_finite())
        .map(|s| Segment {
            start: s.start,
            duration: s.duration,
            confidence: s.confidence,
            loudness_start: s.loudness_start,
            loudness_max: s.loudness_max,
            loudness_max_time: s.loudness_max_time,
            pitches: pad(&s.pitches),
            timbre: pad(&s.timbre),
            index: 0,
        })
        .collect();
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    for (index, s) in segments.iter_mut().enumerate() {
        s.index = index;
    }
    segments
}

fn pad(values: &[f64]) -> [f64; VECTOR_LEN] {
    let mut padded = [0.0; VECTOR_LEN];
    for (slot, value) in padded.iter_mut().zip(values) {
        *slot = *value;
    }
    padded
}

/// Attach each child to the parent whose interval contains its midpoint and
/// record the ordered children lists.
fn link_levels(parents: &mut [Quantum], children: &mut [Quantum]) {
    for child in children.iter_mut() {
        let midpoint = child.start + child.duration / 2.0;
        let Some(parent_index) = index_at_or_before(parents, midpoint) else {
            continue;
        };
        let parent = &mut parents[parent_index];
        if midpoint >= parent.end() {
            continue;
        }
        child.parent = Some(parent_index);
        child.index_in_parent = parent.children.len();
        parent.children.push(child.index);
    }
}

/// Record, per beat, the ordered segments whose intervals intersect it.
fn attach_segments(beats: &mut [Quantum], segments: &[Segment]) {
    let mut first_candidate = 0;
    for beat in beats.iter_mut() {
        // segments are start-sorted, so ones that end before this beat can
        // never overlap a later beat either
        while first_candidate < segments.len() && segments[first_candidate].end() <= beat.start {
            first_candidate += 1;
        }
        for segment in &segments[first_candidate..] {
            if segment.start >= beat.end() {
                break;
            }
            if segment.end() > beat.start {
                beat.overlapping_segments.push(segment.index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::RawAnalysis;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn quantum(start: f64, duration: f64) -> RawQuantum {
        RawQuantum {
            start,
            duration,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_levels_are_sorted_and_densely_indexed() {
        let raw = RawAnalysis {
            beats: vec![quantum(1.0, 0.5), quantum(0.0, 0.5), quantum(0.5, 0.5)],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        let starts: Vec<f64> = analysis.beats.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0.0, 0.5, 1.0]);
        let indices: Vec<usize> = analysis.beats.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-0.5)]
    fn test_non_positive_durations_are_dropped(#[case] duration: f64) {
        let raw = RawAnalysis {
            beats: vec![quantum(0.0, 0.5), quantum(0.5, duration)],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        assert_eq!(analysis.total_beats(), 1);
    }

    #[test]
    fn test_hierarchy_links() {
        // one bar [0, 2) holding four beats of 0.5s
        let raw = RawAnalysis {
            bars: vec![quantum(0.0, 2.0)],
            beats: (0..4).map(|i| quantum(f64::from(i) * 0.5, 0.5)).collect(),
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        assert_eq!(analysis.bars[0].children, vec![0, 1, 2, 3]);
        for (i, beat) in analysis.beats.iter().enumerate() {
            assert_eq!(beat.parent, Some(0));
            assert_eq!(beat.index_in_parent, i);
        }
    }

    #[test]
    fn test_orphan_beats_have_no_parent() {
        // bar covers only the first half of the track
        let raw = RawAnalysis {
            bars: vec![quantum(0.0, 1.0)],
            beats: vec![quantum(0.0, 0.5), quantum(0.5, 0.5), quantum(1.5, 0.5)],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        assert_eq!(analysis.beats[0].parent, Some(0));
        assert_eq!(analysis.beats[1].parent, Some(0));
        assert_eq!(analysis.beats[2].parent, None);
    }

    #[test]
    fn test_overlapping_segments() {
        let raw = RawAnalysis {
            beats: vec![quantum(0.0, 1.0), quantum(1.0, 1.0)],
            segments: vec![
                RawSegment {
                    start: 0.0,
                    duration: 0.6,
                    ..RawSegment::default()
                },
                RawSegment {
                    start: 0.6,
                    duration: 0.8, // straddles the beat boundary
                    ..RawSegment::default()
                },
                RawSegment {
                    start: 1.4,
                    duration: 0.6,
                    ..RawSegment::default()
                },
            ],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        assert_eq!(analysis.beats[0].overlapping_segments, vec![0, 1]);
        assert_eq!(analysis.beats[1].overlapping_segments, vec![1, 2]);
    }

    #[test]
    fn test_beat_outside_all_segments_has_none() {
        let raw = RawAnalysis {
            beats: vec![quantum(0.0, 1.0), quantum(5.0, 1.0)],
            segments: vec![RawSegment {
                start: 0.0,
                duration: 1.0,
                ..RawSegment::default()
            }],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        assert_eq!(analysis.beats[0].overlapping_segments, vec![0]);
        assert!(analysis.beats[1].overlapping_segments.is_empty());
    }

    #[test]
    fn test_short_vectors_are_zero_padded() {
        let raw = RawAnalysis {
            segments: vec![RawSegment {
                start: 0.0,
                duration: 0.2,
                pitches: vec![1.0, 0.5],
                timbre: vec![3.0],
                ..RawSegment::default()
            }],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        let segment = &analysis.segments[0];
        assert_eq!(segment.pitches[0], 1.0);
        assert_eq!(segment.pitches[1], 0.5);
        assert_eq!(segment.pitches[2..], [0.0; 10]);
        assert_eq!(segment.timbre[0], 3.0);
    }

    #[rstest]
    #[case::inside(0.25, Some(0))]
    #[case::second(1.2, Some(1))]
    #[case::boundary(1.0, Some(1))]
    #[case::before(-0.1, None)]
    #[case::after(99.0, None)]
    fn test_beat_at_time(#[case] t: f64, #[case] expected: Option<usize>) {
        let raw = RawAnalysis {
            beats: vec![quantum(0.0, 1.0), quantum(1.0, 1.0)],
            ..RawAnalysis::default()
        };
        let analysis = Analysis::normalize(raw);
        assert_eq!(analysis.beat_at_time(t).map(|b| b.index), expected);
    }

    #[test]
    fn test_empty_payload_normalizes_to_empty_analysis() {
        let analysis = Analysis::normalize(RawAnalysis::default());
        assert_eq!(analysis.total_beats(), 0);
        assert!(analysis.beat_at_time(0.0).is_none());
    }
}
