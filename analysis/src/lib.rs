//! Ingestion of pre-computed track analyses.
//!
//! A track arrives as an unstructured JSON payload of quantum lists
//! (sections, bars, beats, tatums) and fine-grained segments carrying
//! pitch/timbre vectors. This crate parses that payload ([`payload`]),
//! links it into a navigable hierarchy with per-beat segment overlaps
//! ([`normalize`]), and provides the weighted feature metric used to decide
//! which beats sound alike ([`distance`]).
//!
//! Producing the analysis itself (onset detection, MFCCs, etc.) is not this
//! crate's job; the payload is expected to come from an external analysis
//! service.

#![deny(clippy::missing_inline_in_public_items)]

pub mod distance;
pub mod errors;
pub mod normalize;
pub mod payload;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use errors::{AnalysisError, AnalysisResult};
pub use normalize::{Analysis, Quantum, Segment};
pub use payload::{RawAnalysis, RawQuantum, RawSegment, TrackInfo};

/// Length of the pitch and timbre vectors carried by each segment.
pub const VECTOR_LEN: usize = 12;
