//! Branch selection at a beat boundary.
//!
//! Whether to jump is probabilistic with a ramp: every beat played without
//! jumping bumps the chance, and taking a jump resets it. Which edge to
//! take is not probabilistic at all: the beat's surviving edges rotate as a
//! FIFO, so repeated visits spread fairly over every destination and the
//! whole thing stays deterministic for a fixed RNG.

use rand::Rng;

use crate::config::EngineConfig;
use crate::graph::BeatGraph;

/// The jump-probability ramp. Lives on the engine and is handed to
/// [`select`] by mutable reference, keeping the selector free of hidden
/// state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BranchState {
    pub cur_random_branch_chance: f64,
}

impl BranchState {
    /// The ramp starts at (and resets to) the configured floor.
    #[must_use]
    #[inline]
    pub const fn reset(config: &EngineConfig) -> Self {
        Self {
            cur_random_branch_chance: config.min_random_branch_chance,
        }
    }

    /// Re-clamp into the configured bounds after a config change.
    #[inline]
    pub fn clamp_to(&mut self, config: &EngineConfig) {
        self.cur_random_branch_chance = self
            .cur_random_branch_chance
            .clamp(config.min_random_branch_chance, config.max_random_branch_chance);
    }
}

/// What the selector decided for one boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub next_index: usize,
    pub jumped: bool,
}

/// Decide whether to jump out of `seed` and to where.
///
/// A seed at the graph's last branch point always branches (falling off the
/// end is not an option), as does a forced selection; neither consults the
/// RNG. Otherwise the ramp is bumped by `random_branch_chance_delta`
/// (clamped to the ceiling) and a uniform draw in `[0, 1)` decides; jumping
/// resets the ramp to the floor.
#[allow(clippy::missing_inline_in_public_items)]
pub fn select<R: Rng>(
    seed: usize,
    graph: &mut BeatGraph,
    config: &EngineConfig,
    rng: &mut R,
    state: &mut BranchState,
    force_branch: bool,
) -> Selection {
    if graph.neighbors(seed).is_empty() {
        return Selection {
            next_index: seed,
            jumped: false,
        };
    }

    let branch = if seed == graph.last_branch_point || force_branch {
        true
    } else {
        state.cur_random_branch_chance = (state.cur_random_branch_chance
            + config.random_branch_chance_delta)
            .min(config.max_random_branch_chance);
        let roll: f64 = rng.r#gen();
        if roll < state.cur_random_branch_chance {
            state.cur_random_branch_chance = config.min_random_branch_chance;
            true
        } else {
            false
        }
    };

    if !branch {
        return Selection {
            next_index: seed,
            jumped: false,
        };
    }

    let Some(edge_id) = graph.rotate_neighbors(seed) else {
        return Selection {
            next_index: seed,
            jumped: false,
        };
    };
    let next_index = graph.edge(edge_id).dest;
    Selection {
        next_index,
        jumped: next_index != seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{SeedableRng, rngs::SmallRng};

    use evermix_analysis::Analysis;
    use evermix_analysis::test_utils::{isolated_loudness, track_from_loudness};

    /// A 40-beat graph where beat 30 can jump to 25, 20, or 10 (in that
    /// neighbor order) and beat 30 is the last branch point.
    fn three_way_graph() -> BeatGraph {
        let mut loudness = isolated_loudness(40);
        loudness[30] = loudness[10] + 10.0;
        loudness[20] = loudness[10] + 4.0;
        loudness[25] = loudness[10] + 14.0;
        let config = EngineConfig {
            add_last_edge: false,
            ..EngineConfig::default()
        };
        let analysis = Analysis::normalize(track_from_loudness(&loudness, 0.5));
        BeatGraph::build(&analysis, &config)
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0xE7E2)
    }

    #[test]
    fn test_no_neighbors_means_no_jump() {
        let analysis = Analysis::normalize(track_from_loudness(&isolated_loudness(10), 0.5));
        let mut graph = BeatGraph::build(&analysis, &EngineConfig::default());
        let config = EngineConfig::default();
        let mut state = BranchState::reset(&config);
        let selection = select(3, &mut graph, &config, &mut rng(), &mut state, true);
        assert_eq!(
            selection,
            Selection {
                next_index: 3,
                jumped: false
            }
        );
    }

    /// Forced branches rotate deterministically through every destination.
    #[test]
    fn test_forced_rotation_is_round_robin() {
        let mut graph = three_way_graph();
        let config = EngineConfig::default();
        let mut state = BranchState::reset(&config);
        let mut rng = rng();

        let initial = graph.neighbors(30).to_vec();
        let mut destinations = Vec::new();
        for _ in 0..4 {
            let selection = select(30, &mut graph, &config, &mut rng, &mut state, true);
            assert!(selection.jumped);
            destinations.push(selection.next_index);
        }
        assert_eq!(destinations, vec![25, 20, 10, 25]);
        // three rotations of a three-edge pool restore the initial order
        let _ = graph.rotate_neighbors(30);
        let _ = graph.rotate_neighbors(30);
        assert_eq!(graph.neighbors(30), initial);
    }

    /// The RNG is never consulted under force, so the ramp must not move.
    #[test]
    fn test_force_does_not_touch_the_ramp() {
        let mut graph = three_way_graph();
        let config = EngineConfig::default();
        let mut state = BranchState::reset(&config);
        for _ in 0..5 {
            select(30, &mut graph, &config, &mut rng(), &mut state, true);
        }
        assert_eq!(state.cur_random_branch_chance, config.min_random_branch_chance);
    }

    #[test]
    fn test_last_branch_point_always_branches() {
        let mut graph = three_way_graph();
        assert_eq!(graph.last_branch_point, 30);
        let config = EngineConfig {
            // a zeroed ramp would otherwise never jump
            min_random_branch_chance: 0.0,
            max_random_branch_chance: 0.0,
            random_branch_chance_delta: 0.0,
            ..EngineConfig::default()
        };
        let mut state = BranchState::reset(&config);
        let selection = select(30, &mut graph, &config, &mut rng(), &mut state, false);
        assert!(selection.jumped);
    }

    #[test]
    fn test_ramp_bumps_and_clamps() {
        let mut graph = three_way_graph();
        let config = EngineConfig {
            min_random_branch_chance: 0.0,
            max_random_branch_chance: 0.1,
            random_branch_chance_delta: 0.04,
            ..EngineConfig::default()
        };
        // beat 10 has surviving edges but is not the last branch point, so
        // the RNG path runs
        let seed = 10;
        assert_ne!(graph.last_branch_point, seed);
        assert!(!graph.neighbors(seed).is_empty());

        // a seeded rng whose first draws are all above 0.1 keeps rejecting
        let mut rng = SmallRng::seed_from_u64(3);
        let mut state = BranchState::reset(&config);
        let mut chances = Vec::new();
        for _ in 0..5 {
            let before = state.cur_random_branch_chance;
            let selection = select(seed, &mut graph, &config, &mut rng, &mut state, false);
            if selection.jumped {
                assert_eq!(state.cur_random_branch_chance, 0.0);
                break;
            }
            chances.push(state.cur_random_branch_chance);
            assert!(state.cur_random_branch_chance >= before);
        }
        for chance in chances {
            assert!(chance <= config.max_random_branch_chance + 1e-12);
        }
    }

    /// With a fixed seed the whole selection sequence is reproducible.
    #[test]
    fn test_determinism_with_fixed_seed() {
        let config = EngineConfig::default();
        let run = || {
            let mut graph = three_way_graph();
            let mut state = BranchState::reset(&config);
            let mut rng = SmallRng::seed_from_u64(42);
            (0..64)
                .map(|_| select(30, &mut graph, &config, &mut rng, &mut state, false))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
