//! Snapshot types published to observers.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The per-run playback state tracked by the engine.
///
/// Reset on `load_analysis` and on `start_jukebox`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RuntimeState {
    /// The beat currently playing; `None` before the first resync (and for
    /// degenerate analyses, where it never becomes `Some`).
    pub current_beat_index: Option<usize>,
    pub beats_played: u64,
    /// Whether the most recent advance took a branch.
    pub last_jumped: bool,
    pub last_jump_from_index: Option<usize>,
    /// Player-clock time at which the last scheduled jump fired.
    pub last_jump_time: Option<f64>,
}

/// One observer notification: the runtime state plus the live tuning values
/// it was produced under. Emitted on every tick and every advance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EngineUpdate {
    pub current_beat_index: Option<usize>,
    pub beats_played: u64,
    /// Player clock at emission time, in seconds.
    pub current_time: f64,
    pub last_jumped: bool,
    pub last_jump_from_index: Option<usize>,
    pub last_jump_time: Option<f64>,
    pub current_threshold: u32,
    pub last_branch_point: usize,
    pub cur_random_branch_chance: f64,
}

impl Display for EngineUpdate {
    #[allow(clippy::missing_inline_in_public_items)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "beat {} @ {:.2}s ({} played, jumped: {}, chance: {:.2})",
            self.current_beat_index
                .map_or_else(|| "-".to_string(), |i| i.to_string()),
            self.current_time,
            self.beats_played,
            self.last_jumped,
            self.cur_random_branch_chance,
        )
    }
}
