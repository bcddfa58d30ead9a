//! The beat-synchronous playback driver.
//!
//! Single-threaded and cooperative: the engine wakes it roughly every 50 ms
//! and it compares the player's clock against the current beat's end. It
//! never counts ticks, so missed wake-ups cost nothing; a player clock that
//! wanders out of the current beat's padded interval triggers a resync
//! instead of an advance.

use std::time::Duration;

use log::{debug, trace};
use rand::Rng;

use crate::config::EngineConfig;
use crate::graph::BeatGraph;
use crate::player::{Player, ScheduledJump};
use crate::selector::{BranchState, select};
use crate::state::RuntimeState;
use evermix_analysis::{Quantum, normalize::index_at_or_before};

/// The driver's wake-up period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Slack around a beat's interval before the driver declares itself lost.
const RESYNC_EPSILON: f64 = 0.05;

/// A jump lands this fraction of the target beat past its start...
const JUMP_OFFSET_FACTOR: f64 = 0.06;
/// ...bounded to this window (seconds)...
const MIN_JUMP_OFFSET: f64 = 0.015;
const MAX_JUMP_OFFSET: f64 = 0.05;
/// ...and never closer than this to the target beat's end.
const JUMP_OFFSET_TAIL: f64 = 0.001;

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Player not playing (or nothing to play); the driver idled.
    Idle,
    /// The clock left the current beat; position was re-derived from it.
    Resynced,
    /// Still inside the current beat.
    Held,
    /// The boundary was crossed and the next beat chosen.
    Advanced { jumped: bool },
}

/// Wall-clock state of one playback run.
#[derive(Clone, Copy, Debug, Default)]
pub struct Driver {
    pub current_beat_index: Option<usize>,
    pub next_transition_time: f64,
    last_tick_time: Option<f64>,
    pub beats_played: u64,
    pub last_jumped: bool,
    pub last_jump_from_index: Option<usize>,
    pub last_jump_time: Option<f64>,
}

impl Driver {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn runtime_state(&self) -> RuntimeState {
        RuntimeState {
            current_beat_index: self.current_beat_index,
            beats_played: self.beats_played,
            last_jumped: self.last_jumped,
            last_jump_from_index: self.last_jump_from_index,
            last_jump_time: self.last_jump_time,
        }
    }

    /// One cooperative tick.
    #[allow(clippy::too_many_arguments)]
    pub fn tick<P: Player, R: Rng>(
        &mut self,
        beats: &[Quantum],
        graph: &mut BeatGraph,
        config: &EngineConfig,
        rng: &mut R,
        branch: &mut BranchState,
        player: &mut P,
        force_branch: &mut bool,
    ) -> Tick {
        player.poll();

        if beats.is_empty() || !player.is_playing() {
            self.last_jumped = false;
            self.last_tick_time = None;
            return Tick::Idle;
        }

        let t = player.current_time();
        let previous = self.last_tick_time.replace(t);

        let in_current_beat = self.current_beat_index.is_some_and(|index| {
            let beat = &beats[index];
            t >= beat.start - RESYNC_EPSILON && t <= beat.end() + RESYNC_EPSILON
        });
        if !in_current_beat {
            let index = index_at_or_before(beats, t).unwrap_or(0);
            trace!(
                "resync: t={t:.3} is outside beat {:?}, now at beat {index}",
                self.current_beat_index
            );
            self.current_beat_index = Some(index);
            self.next_transition_time = beats[index].end();
            return Tick::Resynced;
        }

        if previous.is_some_and(|prev| prev < self.next_transition_time)
            && t >= self.next_transition_time
        {
            let jumped = self.advance(beats, graph, config, rng, branch, player, force_branch);
            return Tick::Advanced { jumped };
        }

        Tick::Held
    }

    /// Cross the boundary out of the current beat: pick the next beat,
    /// schedule the seek when it is not simply the following one, and move
    /// the transition time forward.
    #[allow(clippy::too_many_arguments)]
    fn advance<P: Player, R: Rng>(
        &mut self,
        beats: &[Quantum],
        graph: &mut BeatGraph,
        config: &EngineConfig,
        rng: &mut R,
        branch: &mut BranchState,
        player: &mut P,
        force_branch: &mut bool,
    ) -> bool {
        let total_beats = beats.len();
        let current = self.current_beat_index.unwrap_or(0);

        let enforce_last_branch = current == graph.last_branch_point;
        let wrapped = (current + 1) % total_beats;
        let wrapped_to_start = current == total_beats - 1;
        // at the terminal the current beat itself must branch; everywhere
        // else the decision is about the beat we are entering
        let seed = if enforce_last_branch { current } else { wrapped };

        let selection = select(
            seed,
            graph,
            config,
            rng,
            branch,
            *force_branch || enforce_last_branch,
        );
        if selection.jumped && *force_branch {
            *force_branch = false;
        }

        let chosen = if selection.jumped {
            selection.next_index
        } else {
            wrapped
        };

        if selection.jumped || wrapped_to_start {
            let target = &beats[chosen];
            let jump = ScheduledJump {
                target_time: target.start + jump_offset(target.duration),
                transition_time: self.next_transition_time,
            };
            debug!(
                "jump {} -> {chosen} at {:.3}s (target {:.3}s)",
                if selection.jumped { seed } else { current },
                jump.transition_time,
                jump.target_time,
            );
            player.schedule_jump(jump);
            self.last_jump_from_index = Some(if selection.jumped { seed } else { current });
            self.last_jump_time = Some(self.next_transition_time);
        }

        self.last_jumped = selection.jumped;
        self.current_beat_index = Some(chosen);
        self.next_transition_time = beats[chosen].end();
        self.beats_played += 1;

        selection.jumped
    }
}

/// A seek lands slightly past the target beat's start so a marginally-ahead
/// audio clock cannot straddle the boundary and re-advance immediately.
fn jump_offset(duration: f64) -> f64 {
    (duration * JUMP_OFFSET_FACTOR)
        .clamp(MIN_JUMP_OFFSET, MAX_JUMP_OFFSET)
        .min((duration - JUMP_OFFSET_TAIL).max(0.0))
}
