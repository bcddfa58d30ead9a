//! The raw analysis payload, as it comes off the wire.
//!
//! Everything here is deliberately permissive: unknown fields are ignored,
//! missing arrays default to empty, and vectors shorter than
//! [`VECTOR_LEN`](crate::VECTOR_LEN) are zero-padded during normalization.
//! Cleaning the data up is the normalizer's job, not the parser's.

use serde::{Deserialize, Serialize};

use crate::errors::AnalysisResult;

/// A single time-bounded quantum (section, bar, beat, or tatum) as found in
/// the payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RawQuantum {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// A fine-grained analysis window (~50-300 ms) with loudness and
/// pitch/timbre feature vectors.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RawSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub loudness_start: f64,
    #[serde(default)]
    pub loudness_max: f64,
    #[serde(default)]
    pub loudness_max_time: f64,
    #[serde(default)]
    pub pitches: Vec<f64>,
    #[serde(default)]
    pub timbre: Vec<f64>,
}

/// Optional descriptive metadata about the analyzed track.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TrackInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tempo: Option<f64>,
    #[serde(default)]
    pub time_signature: Option<u32>,
}

/// The full analysis payload for one track.
///
/// All times are seconds as floating point. Extra fields are tolerated and
/// dropped.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub sections: Vec<RawQuantum>,
    #[serde(default)]
    pub bars: Vec<RawQuantum>,
    #[serde(default)]
    pub beats: Vec<RawQuantum>,
    #[serde(default)]
    pub tatums: Vec<RawQuantum>,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
    #[serde(default)]
    pub track: TrackInfo,
}

impl RawAnalysis {
    /// Parse a payload from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON or its shape is
    /// incompatible with the analysis schema.
    #[inline]
    pub fn from_str(payload: &str) -> AnalysisResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Parse a payload from a reader (usually a file).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the payload is not valid JSON.
    #[inline]
    pub fn from_reader<R: std::io::Read>(reader: R) -> AnalysisResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let raw = RawAnalysis::from_str("{}").unwrap();
        assert_eq!(raw, RawAnalysis::default());
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        let raw = RawAnalysis::from_str(
            r#"{
                "beats": [{"start": 0.0, "duration": 0.5, "confidence": 0.9, "loud": true}],
                "meta": {"analyzer_version": "4.0.0"}
            }"#,
        )
        .unwrap();
        assert_eq!(raw.beats.len(), 1);
        assert_eq!(raw.beats[0].duration, 0.5);
    }

    #[test]
    fn test_short_feature_vectors_parse() {
        let raw = RawAnalysis::from_str(
            r#"{"segments": [{"start": 0.0, "duration": 0.2, "pitches": [1.0, 0.5], "timbre": []}]}"#,
        )
        .unwrap();
        assert_eq!(raw.segments[0].pitches, vec![1.0, 0.5]);
        assert!(raw.segments[0].timbre.is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(RawAnalysis::from_str("not json").is_err());
    }
}
