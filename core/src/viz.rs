//! Read-only projection of the beat/edge graph for rendering.
//!
//! Layout (point positioning, curve bending) is the renderer's business;
//! the engine only publishes the data.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::BeatGraph;
use evermix_analysis::{Analysis, Quantum};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BeatView {
    pub index: usize,
    pub start: f64,
    pub duration: f64,
}

impl From<&Quantum> for BeatView {
    #[inline]
    fn from(beat: &Quantum) -> Self {
        Self {
            index: beat.index,
            start: beat.start,
            duration: beat.duration,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EdgeView {
    pub src: usize,
    pub dest: usize,
    pub distance: f64,
}

/// The ordered beat list plus the live (non-deleted) edges, deduplicated on
/// `(src, dest)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VisualizationData {
    pub beats: Vec<BeatView>,
    pub edges: Vec<EdgeView>,
}

impl VisualizationData {
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn project(analysis: &Analysis, graph: &BeatGraph) -> Self {
        let beats = analysis
            .beats
            .iter()
            .map(|b| BeatView {
                index: b.index,
                start: b.start,
                duration: b.duration,
            })
            .collect();

        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for edge in graph.edges() {
            if edge.deleted {
                continue;
            }
            if seen.insert((edge.src, edge.dest)) {
                edges.push(EdgeView {
                    src: edge.src,
                    dest: edge.dest,
                    distance: edge.distance,
                });
            }
        }

        Self { beats, edges }
    }
}
