//! The inter-beat similarity graph.
//!
//! Construction runs in fixed stages over a normalized analysis:
//!
//! 1. a per-beat candidate pool of the `max_branches` nearest beats under
//!    `max_branch_threshold` (the permanent `all_neighbors` pool),
//! 2. a filtered pool (`neighbors`) under the active threshold and the
//!    backwards/long-branch restrictions,
//! 3. adaptive threshold resolution when no explicit threshold is set,
//! 4. insertion of a long anchoring back-edge when the track lacks one,
//! 5. reachability propagation,
//! 6. selection of the last branch point,
//! 7. removal of edges that would escape past the last branch point,
//! 8. optional suppression of sequential duplicate branches.
//!
//! Beats and edges live in flat arenas and reference each other by dense
//! index, so the graph serializes trivially and carries no reference
//! cycles.

use std::collections::HashSet;

use log::debug;
use serde::Serialize;

use crate::config::EngineConfig;
use evermix_analysis::{Analysis, distance::beat_distance};

/// Identifier of an edge: its index in the graph's edge arena.
pub type EdgeId = usize;

/// A directed candidate transition between two acoustically similar beats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub src: usize,
    pub dest: usize,
    pub distance: f64,
    pub deleted: bool,
}

impl Edge {
    /// Absolute beat span of the transition.
    #[must_use]
    #[inline]
    pub const fn span(&self) -> usize {
        self.src.abs_diff(self.dest)
    }

    /// Beat span for backward edges; `None` when the edge points forward.
    #[must_use]
    #[inline]
    pub const fn backward_span(&self) -> Option<usize> {
        if self.dest < self.src {
            Some(self.src - self.dest)
        } else {
            None
        }
    }

    /// Signed jump offset (`src - dest`).
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn delta(&self) -> i64 {
        self.src as i64 - self.dest as i64
    }
}

/// First threshold probed by the adaptive search.
const THRESHOLD_GRID_START: u32 = 10;
/// Step between probed thresholds.
const THRESHOLD_GRID_STEP: u32 = 5;
/// The adaptive search targets `total_beats / 6` branching beats.
const BRANCH_TARGET_DIVISOR: usize = 6;
/// Upper bound on reachability propagation passes.
const MAX_REACH_PASSES: usize = 1000;
/// Distance ceilings for anchor candidates, keyed on whether the track
/// already has a reasonably long backward branch.
const ANCHOR_CEILING_NEAR: f64 = 55.0;
const ANCHOR_CEILING_FAR: f64 = 65.0;

/// The mutable beat/edge graph plus the scalars describing how it was built.
#[derive(Clone, Debug, Default)]
pub struct BeatGraph {
    /// Edge arena; `EdgeId` indexes into it. Holds every candidate edge
    /// ever computed, including deleted ones.
    edges: Vec<Edge>,
    /// Per-beat candidate pool (top-K nearest), never filtered.
    all_neighbors: Vec<Vec<EdgeId>>,
    /// Per-beat surviving edges, rotated at runtime by the selector.
    neighbors: Vec<Vec<EdgeId>>,
    /// Furthest forward beat count reachable from each beat.
    reach: Vec<usize>,
    pub total_beats: usize,
    /// The threshold the adaptive search settled on.
    pub computed_threshold: u32,
    /// The threshold the filtered pool was last built with.
    pub current_threshold: u32,
    /// Final beat index at which a jump may still occur.
    pub last_branch_point: usize,
    pub longest_reach: usize,
    min_long_branch: usize,
    /// The sticky anchor edge, if one was injected.
    anchor: Option<EdgeId>,
}

impl BeatGraph {
    /// Build the jump graph for a normalized analysis.
    ///
    /// Infallible: a degenerate analysis (no beats, or no beat overlapping
    /// any segment) yields a graph with no edges.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn build(analysis: &Analysis, config: &EngineConfig) -> Self {
        let total_beats = analysis.total_beats();
        let mut graph = Self {
            total_beats,
            all_neighbors: vec![Vec::new(); total_beats],
            neighbors: vec![Vec::new(); total_beats],
            min_long_branch: config.min_long_branch(total_beats),
            ..Self::default()
        };
        if total_beats == 0 {
            return graph;
        }

        graph.collect_candidates(analysis, config);
        graph.resolve_threshold(config);
        if config.add_last_edge {
            graph.insert_anchor_edge();
        }
        graph.compute_reach();
        graph.choose_last_branch_point();
        graph.filter_by_terminal();
        if config.remove_sequential_branches {
            graph.suppress_sequential_branches();
        }

        debug!(
            "graph built: {} edges over {} beats, threshold {}, last branch point {}",
            graph.edges.len(),
            total_beats,
            graph.current_threshold,
            graph.last_branch_point,
        );

        graph
    }

    /// Stage 1: per-beat top-K candidate edges under the hard ceiling.
    fn collect_candidates(&mut self, analysis: &Analysis, config: &EngineConfig) {
        let beats = &analysis.beats;
        for q1 in beats {
            if q1.overlapping_segments.is_empty() {
                continue;
            }
            let mut candidates: Vec<(f64, usize)> = Vec::new();
            for q2 in beats {
                if q1.index == q2.index {
                    continue;
                }
                // beats riding the same leading segment are the same sound
                if q1.overlapping_segments.first() == q2.overlapping_segments.first() {
                    continue;
                }
                let Some(distance) = beat_distance(analysis, q1, q2) else {
                    continue;
                };
                if distance < f64::from(config.max_branch_threshold) {
                    candidates.push((distance, q2.index));
                }
            }
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
            candidates.truncate(config.max_branches);
            for (distance, dest) in candidates {
                let id = self.edges.len();
                self.edges.push(Edge {
                    id,
                    src: q1.index,
                    dest,
                    distance,
                    deleted: false,
                });
                self.all_neighbors[q1.index].push(id);
            }
        }
    }

    /// Stage 2: rebuild the filtered pool from the candidates.
    ///
    /// Returns the number of beats left with at least one surviving edge.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn collect_nearest_neighbors(&mut self, threshold: u32, config: &EngineConfig) -> usize {
        let mut branching_count = 0;
        for beat in 0..self.total_beats {
            let mut kept = Vec::new();
            for &id in &self.all_neighbors[beat] {
                let edge = self.edges[id];
                if edge.deleted {
                    continue;
                }
                if edge.distance > f64::from(threshold) {
                    continue;
                }
                if config.just_backwards && edge.dest >= edge.src {
                    continue;
                }
                if config.just_long_branches && edge.span() < self.min_long_branch {
                    continue;
                }
                kept.push(id);
            }
            if !kept.is_empty() {
                branching_count += 1;
            }
            self.neighbors[beat] = kept;
        }
        self.current_threshold = threshold;
        branching_count
    }

    /// Stage 3: adopt the configured threshold, or walk the 5-step grid for
    /// the smallest one that makes `total_beats / 6` beats branch.
    fn resolve_threshold(&mut self, config: &EngineConfig) {
        if config.current_threshold != 0 {
            self.collect_nearest_neighbors(config.current_threshold, config);
            self.computed_threshold = config.current_threshold;
            return;
        }

        let target = self.total_beats / BRANCH_TARGET_DIVISOR;
        let mut threshold = THRESHOLD_GRID_START;
        while threshold <= config.max_branch_threshold {
            let branching = self.collect_nearest_neighbors(threshold, config);
            if branching >= target {
                self.computed_threshold = threshold;
                return;
            }
            threshold += THRESHOLD_GRID_STEP;
        }

        // nothing on the grid met the target
        self.collect_nearest_neighbors(config.max_branch_threshold, config);
        self.computed_threshold = config.max_branch_threshold;
    }

    /// Stage 4: when the track has no long backward branch, append the
    /// longest acceptable candidate so late playback can always loop back.
    ///
    /// The anchor's distance may exceed the current threshold; once
    /// inserted it stays (sticky), surviving later refilters.
    fn insert_anchor_edge(&mut self) {
        let longest_span = (0..self.total_beats)
            .flat_map(|beat| self.neighbors[beat].iter())
            .filter_map(|&id| self.edges[id].backward_span())
            .max()
            .unwrap_or(0);
        let longest_pct = longest_span * 100 / self.total_beats;
        if longest_pct >= 50 {
            return;
        }

        let ceiling = if longest_pct >= 50 {
            ANCHOR_CEILING_NEAR
        } else {
            ANCHOR_CEILING_FAR
        };
        let threshold = f64::from(self.current_threshold);

        let mut best: Option<EdgeId> = None;
        let mut best_span = 0;
        for beat in 0..self.total_beats {
            for &id in &self.all_neighbors[beat] {
                let edge = self.edges[id];
                if edge.deleted {
                    continue;
                }
                let Some(span) = edge.backward_span() else {
                    continue;
                };
                if span > best_span && edge.distance < ceiling && edge.distance > threshold {
                    best_span = span;
                    best = Some(id);
                }
            }
        }

        if let Some(id) = best {
            let src = self.edges[id].src;
            self.neighbors[src].push(id);
            self.anchor = Some(id);
            debug!(
                "anchored beat {src} back to beat {} (span {best_span})",
                self.edges[id].dest
            );
        }
    }

    /// Stage 5: propagate how far forward each beat can reach via sequential
    /// advance plus any chain of surviving jumps.
    fn compute_reach(&mut self) {
        let n = self.total_beats;
        self.reach = (0..n).map(|index| n - index).collect();

        for _ in 0..MAX_REACH_PASSES {
            let mut changed = false;
            for q in 0..n {
                let mut best = self.reach[q];
                if q + 1 < n {
                    best = best.max(self.reach[q + 1]);
                }
                for &id in &self.neighbors[q] {
                    best = best.max(self.reach[self.edges[id].dest]);
                }
                if best > self.reach[q] {
                    self.reach[q] = best;
                    changed = true;
                    // every earlier beat can reach q sequentially
                    for earlier in self.reach[..q].iter_mut() {
                        if *earlier < best {
                            *earlier = best;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        self.longest_reach = self.reach.iter().copied().max().unwrap_or(0);
    }

    /// Stage 6: pick the final beat at which jumps stay allowed. Prefer the
    /// latest beat holding a long backward edge; fall back to the branching
    /// beat with the best reach relative to its distance from the end.
    fn choose_last_branch_point(&mut self) {
        let n = self.total_beats;
        let mut longest: Option<usize> = None;
        let mut best_relative_reach = -1i64;
        let mut best_long: Option<usize> = None;

        for q in (0..n).rev() {
            if self.neighbors[q].is_empty() {
                continue;
            }
            #[allow(clippy::cast_possible_wrap)]
            let relative_reach = ((self.reach[q] - (n - q)) * 100 / n) as i64;
            if relative_reach > best_relative_reach {
                best_relative_reach = relative_reach;
                longest = Some(q);
            }
            if best_long.is_none()
                && self.neighbors[q].iter().any(|&id| {
                    self.edges[id]
                        .backward_span()
                        .is_some_and(|span| span >= self.min_long_branch)
                })
            {
                best_long = Some(q);
            }
        }

        self.last_branch_point = best_long.or(longest).unwrap_or(0);
    }

    /// Stage 7: a jump from inside the safe region must never exit it.
    fn filter_by_terminal(&mut self) {
        let last_branch_point = self.last_branch_point;
        let edges = &self.edges;
        for (beat, kept) in self.neighbors.iter_mut().enumerate() {
            if beat < last_branch_point {
                kept.retain(|&id| edges[id].dest < last_branch_point);
            }
        }
    }

    /// Stage 8: walking backwards, drop edges whose jump offset duplicates a
    /// surviving edge of the preceding beat. The last branch point itself is
    /// exempt, so it can never be emptied here.
    fn suppress_sequential_branches(&mut self) {
        for beat in (1..self.total_beats).rev() {
            if beat == self.last_branch_point {
                continue;
            }
            let edges = &self.edges;
            let previous_deltas: HashSet<i64> = self.neighbors[beat - 1]
                .iter()
                .map(|&id| edges[id].delta())
                .collect();
            self.neighbors[beat].retain(|&id| !previous_deltas.contains(&edges[id].delta()));
        }
    }

    //------------------------------------------------------------------ runtime accessors

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The full edge arena, deleted edges included.
    #[must_use]
    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[must_use]
    #[inline]
    pub fn edge(&self, id: EdgeId) -> Edge {
        self.edges[id]
    }

    /// Edges currently usable for jumping out of `beat`.
    #[must_use]
    #[inline]
    pub fn neighbors(&self, beat: usize) -> &[EdgeId] {
        self.neighbors.get(beat).map_or(&[], Vec::as_slice)
    }

    /// The beat's unfiltered candidate pool.
    #[must_use]
    #[inline]
    pub fn all_neighbors(&self, beat: usize) -> &[EdgeId] {
        self.all_neighbors.get(beat).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    #[inline]
    pub fn reach(&self, beat: usize) -> usize {
        self.reach.get(beat).copied().unwrap_or(0)
    }

    /// Round-robin over a beat's surviving edges: pop the head, append it to
    /// the tail, and return it.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn rotate_neighbors(&mut self, beat: usize) -> Option<EdgeId> {
        let list = self.neighbors.get_mut(beat)?;
        if list.is_empty() {
            return None;
        }
        let head = list.remove(0);
        list.push(head);
        Some(head)
    }

    /// Mark every edge between the two beats (either direction) deleted and
    /// drop them from the filtered pools. Returns whether anything matched;
    /// unknown pairs are a no-op.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn delete_edge(&mut self, src: usize, dest: usize) -> bool {
        let mut keys = HashSet::new();
        keys.insert((src, dest));
        keys.insert((dest, src));
        self.apply_deletions(&keys)
    }

    /// Mark every edge matching one of the `(src, dest)` keys deleted and
    /// prune the filtered pools. Returns whether anything matched.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn apply_deletions(&mut self, keys: &HashSet<(usize, usize)>) -> bool {
        let mut matched = false;
        for edge in &mut self.edges {
            if keys.contains(&(edge.src, edge.dest)) {
                edge.deleted = true;
                matched = true;
            }
        }
        if matched {
            let edges = &self.edges;
            for kept in &mut self.neighbors {
                kept.retain(|&id| !edges[id].deleted);
            }
            if self.anchor.is_some_and(|id| self.edges[id].deleted) {
                self.anchor = None;
            }
        }
        matched
    }

    /// The sticky anchor edge injected by the build, if any.
    #[must_use]
    #[inline]
    pub fn anchor_edge(&self) -> Option<Edge> {
        self.anchor.map(|id| self.edges[id])
    }
}
