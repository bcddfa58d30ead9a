//! The jukebox engine: facade, kernel thread, and command surface.
//!
//! [`Jukebox`] is the single-threaded facade owning the analysis, the jump
//! graph, the playback driver, and the player. Everything public on it runs
//! on whatever thread calls it, so embedders with their own event loop can
//! drive [`Jukebox::tick`] directly.
//!
//! [`JukeboxSender`] is the usual way in: it spawns the kernel on a
//! dedicated thread, feeds it [`EngineCommand`]s over a channel, and lets
//! the thread's 50 ms receive timeout double as the tick timer. Only one
//! kernel should run at a time.
#![allow(clippy::module_name_repetitions)]

use std::collections::HashSet;
use std::sync::{
    Arc,
    mpsc::{Receiver, RecvTimeoutError, Sender},
};

use log::{debug, error, info};
use rand::{SeedableRng, rngs::SmallRng};
use tracing::instrument;

use crate::config::{EngineConfig, EngineConfigPatch};
use crate::errors::EngineError;
use crate::graph::BeatGraph;
use crate::player::Player;
use crate::selector::BranchState;
use crate::state::{EngineUpdate, RuntimeState};
use crate::viz::{BeatView, VisualizationData};
use evermix_analysis::{Analysis, Quantum, RawAnalysis};

pub mod commands;
mod driver;

use commands::EngineCommand;
use driver::Driver;
pub use driver::{TICK_INTERVAL, Tick};

#[derive(Debug, Clone)]
pub struct JukeboxSender {
    tx: Sender<(EngineCommand, tracing::Span)>,
}

impl JukeboxSender {
    /// Start the jukebox kernel in a detached thread and return a sender for
    /// commanding it. The kernel publishes [`EngineUpdate`] snapshots to
    /// `event_tx` on every tick and advance.
    ///
    /// # Panics
    ///
    /// Panics if the kernel thread cannot be spawned.
    #[must_use]
    #[inline]
    pub fn start<P: Player>(player: P, event_tx: Sender<EngineUpdate>) -> Arc<Self> {
        Self::spawn(Jukebox::new(player, event_tx))
    }

    /// Like [`start`](Self::start), but with a fixed RNG seed so branch
    /// decisions replay identically.
    #[must_use]
    #[inline]
    pub fn start_seeded<P: Player>(
        player: P,
        event_tx: Sender<EngineUpdate>,
        seed: u64,
    ) -> Arc<Self> {
        Self::spawn(Jukebox::seeded(player, event_tx, seed))
    }

    fn spawn<P: Player>(kernel: Jukebox<P>) -> Arc<Self> {
        let (command_tx, command_rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name(String::from("Jukebox Engine"))
            .spawn(move || kernel.run(command_rx))
            .unwrap();
        Arc::new(Self { tx: command_tx })
    }

    /// Send a command to the jukebox kernel.
    ///
    /// # Panics
    ///
    /// Panics if the kernel is not running. Use [`try_send`](Self::try_send)
    /// when that is not acceptable.
    #[instrument(skip(self))]
    #[inline]
    pub fn send(&self, command: EngineCommand) {
        let ctx = tracing::info_span!("Sending Engine Command", command = %command).or_current();

        if let Err(e) = self.tx.send((command, ctx)) {
            error!("Failed to send command to jukebox engine: {e}");
            panic!("Failed to send command to jukebox engine: {e}");
        }
    }

    /// Non-panicking variant of [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel is not running.
    #[instrument(skip(self))]
    #[inline]
    pub fn try_send(
        &self,
        command: EngineCommand,
    ) -> Result<(), std::sync::mpsc::SendError<(EngineCommand, tracing::Span)>> {
        let ctx = tracing::info_span!("Sending Engine Command", command = %command).or_current();

        self.tx.send((command, ctx))
    }
}

impl Drop for JukeboxSender {
    #[allow(clippy::missing_inline_in_public_items)]
    fn drop(&mut self) {
        // make sure the kernel thread winds down with its last sender
        let _ = self.try_send(EngineCommand::Exit);
    }
}

/// The jukebox kernel.
///
/// Owns all mutable state of a run; see the module docs for the threading
/// contract.
pub struct Jukebox<P: Player> {
    player: P,
    config: EngineConfig,
    analysis: Option<Analysis>,
    graph: BeatGraph,
    driver: Driver,
    branch: BranchState,
    rng: SmallRng,
    force_branch: bool,
    /// User edge deletions as `(src, dest)` beat-index keys (both
    /// directions); reapplied after every rebuild.
    deleted_edges: HashSet<(usize, usize)>,
    /// Whether the tick loop is armed.
    running: bool,
    event_tx: Sender<EngineUpdate>,
}

impl<P: Player> Jukebox<P> {
    #[must_use]
    #[inline]
    pub fn new(player: P, event_tx: Sender<EngineUpdate>) -> Self {
        Self::with_rng(player, event_tx, SmallRng::from_entropy())
    }

    /// A jukebox whose branch decisions replay identically for a seed.
    #[must_use]
    #[inline]
    pub fn seeded(player: P, event_tx: Sender<EngineUpdate>, seed: u64) -> Self {
        Self::with_rng(player, event_tx, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(player: P, event_tx: Sender<EngineUpdate>, rng: SmallRng) -> Self {
        let config = EngineConfig::default();
        Self {
            player,
            config,
            analysis: None,
            graph: BeatGraph::default(),
            driver: Driver::default(),
            branch: BranchState::reset(&config),
            rng,
            force_branch: false,
            deleted_edges: HashSet::new(),
            running: false,
            event_tx,
        }
    }

    /// Run the kernel until `Exit` (or until every sender is gone).
    ///
    /// While the jukebox is armed, the command receive doubles as the tick
    /// timer: a 50 ms timeout without traffic produces one driver tick.
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn run(mut self, command_rx: Receiver<(EngineCommand, tracing::Span)>) {
        loop {
            let message = if self.running {
                match command_rx.recv_timeout(TICK_INTERVAL) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => {
                        self.tick();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match command_rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                }
            };

            let (command, ctx) = message;
            let _guard = ctx.enter();
            if !self.handle(command) {
                break;
            }
        }
    }

    /// Returns `false` when the kernel should exit.
    fn handle(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::LoadAnalysis(raw) => self.load_analysis(*raw),
            EngineCommand::RebuildGraph => {
                if let Err(e) = self.rebuild_graph() {
                    error!("cannot rebuild graph: {e}");
                }
            }
            EngineCommand::UpdateConfig(patch) => self.update_config(&patch),
            EngineCommand::StartJukebox => {
                if let Err(e) = self.start_jukebox() {
                    error!("cannot start jukebox: {e}");
                }
            }
            EngineCommand::StopJukebox => self.stop_jukebox(),
            EngineCommand::Play => self.play(),
            EngineCommand::Pause => self.pause(),
            EngineCommand::SeekToBeat(index) => self.seek_to_beat(index),
            EngineCommand::SeekToTime(t) => self.seek_to_time(t),
            EngineCommand::DeleteEdge { src, dest } => self.delete_edge(src, dest),
            EngineCommand::ClearDeletedEdges => self.clear_deleted_edges(),
            EngineCommand::SetForceBranch(on) => self.set_force_branch(on),
            EngineCommand::BeatAtTime(t, tx) => {
                let _ = tx.send(self.beat_at_time(t).map(BeatView::from));
            }
            EngineCommand::Visualization(tx) => {
                let _ = tx.send(self.visualization_data());
            }
            EngineCommand::ReportStatus(tx) => {
                if tx.send(self.snapshot()).is_err() {
                    // a dropped status receiver means the other side is
                    // gone; hanging on would leave a zombie kernel
                    error!("status receiver dropped, stopping the jukebox engine");
                    return false;
                }
            }
            EngineCommand::Exit => return false,
        }
        true
    }

    //------------------------------------------------------------------ facade operations

    /// Normalize a raw analysis and make it the current track: builds the
    /// jump graph, reapplies remembered edge deletions, and resets the
    /// runtime. Any current run stops.
    #[instrument(skip(self, raw))]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn load_analysis(&mut self, raw: RawAnalysis) {
        self.running = false;
        let analysis = Analysis::normalize(raw);
        info!(
            "loaded \"{}\" ({} beats)",
            analysis.track.title.as_deref().unwrap_or("untitled"),
            analysis.total_beats(),
        );
        self.analysis = Some(analysis);
        self.rebuild_graph_inner();
        self.driver.reset();
        self.branch = BranchState::reset(&self.config);
        self.force_branch = false;
        self.emit();
    }

    /// Rebuild the graph under the current config. Remembered edge
    /// deletions are honored after the rebuild, and the probability ramp
    /// resets.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::NotLoaded`] when no analysis is loaded.
    #[instrument(skip(self))]
    #[inline]
    pub fn rebuild_graph(&mut self) -> Result<(), EngineError> {
        if self.analysis.is_none() {
            return Err(EngineError::NotLoaded);
        }
        self.rebuild_graph_inner();
        self.branch = BranchState::reset(&self.config);
        self.emit();
        Ok(())
    }

    fn rebuild_graph_inner(&mut self) {
        let Some(analysis) = &self.analysis else {
            return;
        };
        let mut graph = BeatGraph::build(analysis, &self.config);
        if !self.deleted_edges.is_empty() {
            graph.apply_deletions(&self.deleted_edges);
        }
        self.graph = graph;
    }

    /// Shallow-merge tuning changes. Does not rebuild the graph; call
    /// [`rebuild_graph`](Self::rebuild_graph) when the change affects it.
    #[instrument(skip(self))]
    #[inline]
    pub fn update_config(&mut self, patch: &EngineConfigPatch) {
        self.config.apply(patch);
        self.branch.clamp_to(&self.config);
    }

    /// Arm the tick loop (the player still needs [`play`](Self::play)).
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::NotLoaded`] when no analysis is loaded.
    #[instrument(skip(self))]
    #[inline]
    pub fn start_jukebox(&mut self) -> Result<(), EngineError> {
        if self.analysis.is_none() {
            return Err(EngineError::NotLoaded);
        }
        self.driver.reset();
        self.branch = BranchState::reset(&self.config);
        self.running = true;
        debug!("jukebox started");
        self.emit();
        Ok(())
    }

    /// Disarm the tick loop and stop the player (which also cancels any
    /// pending scheduled jump).
    #[instrument(skip(self))]
    #[inline]
    pub fn stop_jukebox(&mut self) {
        self.running = false;
        self.player.stop();
        self.emit();
    }

    #[inline]
    pub fn play(&mut self) {
        self.player.play();
    }

    #[inline]
    pub fn pause(&mut self) {
        self.player.pause();
    }

    /// Seek the player to the start of a beat; out-of-range indices are
    /// ignored. The driver resyncs on its next tick.
    #[instrument(skip(self))]
    #[inline]
    pub fn seek_to_beat(&mut self, index: usize) {
        let Some(beat) = self.analysis.as_ref().and_then(|a| a.beats.get(index)) else {
            debug!("seek to unknown beat {index} ignored");
            return;
        };
        self.player.seek(beat.start);
    }

    #[instrument(skip(self))]
    #[inline]
    pub fn seek_to_time(&mut self, t: f64) {
        self.player.seek(t);
    }

    /// Delete the edge between two beats, in both directions. The deletion
    /// is remembered and survives rebuilds; unknown pairs are a no-op.
    #[instrument(skip(self))]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn delete_edge(&mut self, src: usize, dest: usize) {
        if self.graph.delete_edge(src, dest) {
            self.deleted_edges.insert((src, dest));
            self.deleted_edges.insert((dest, src));
            self.emit();
        } else {
            debug!("delete of unknown edge {src} -> {dest} ignored");
        }
    }

    /// Forget remembered edge deletions. Takes effect on the next rebuild.
    #[instrument(skip(self))]
    #[inline]
    pub fn clear_deleted_edges(&mut self) {
        self.deleted_edges.clear();
    }

    /// Force a branch on the next advance; consumed once a jump happens.
    #[instrument(skip(self))]
    #[inline]
    pub fn set_force_branch(&mut self, on: bool) {
        self.force_branch = on;
    }

    /// The beat whose interval contains `t`, if an analysis is loaded.
    #[must_use]
    #[inline]
    pub fn beat_at_time(&self, t: f64) -> Option<&Quantum> {
        self.analysis.as_ref().and_then(|a| a.beat_at_time(t))
    }

    /// Snapshot the beats and live edges for rendering.
    #[must_use]
    #[inline]
    pub fn visualization_data(&self) -> VisualizationData {
        self.analysis
            .as_ref()
            .map(|analysis| VisualizationData::project(analysis, &self.graph))
            .unwrap_or_default()
    }

    /// One cooperative driver tick; emits an [`EngineUpdate`].
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn tick(&mut self) -> Tick {
        let outcome = match &self.analysis {
            Some(analysis) => self.driver.tick(
                &analysis.beats,
                &mut self.graph,
                &self.config,
                &mut self.rng,
                &mut self.branch,
                &mut self.player,
                &mut self.force_branch,
            ),
            None => Tick::Idle,
        };
        self.emit();
        outcome
    }

    /// The driver's per-run playback state.
    #[must_use]
    #[inline]
    pub fn runtime_state(&self) -> RuntimeState {
        self.driver.runtime_state()
    }

    #[must_use]
    #[allow(clippy::missing_inline_in_public_items)]
    pub fn snapshot(&self) -> EngineUpdate {
        let runtime = self.driver.runtime_state();
        EngineUpdate {
            current_beat_index: runtime.current_beat_index,
            beats_played: runtime.beats_played,
            current_time: self.player.current_time(),
            last_jumped: runtime.last_jumped,
            last_jump_from_index: runtime.last_jump_from_index,
            last_jump_time: runtime.last_jump_time,
            current_threshold: self.graph.current_threshold,
            last_branch_point: self.graph.last_branch_point,
            cur_random_branch_chance: self.branch.cur_random_branch_chance,
        }
    }

    fn emit(&self) {
        let _ = self.event_tx.send(self.snapshot());
    }

    //------------------------------------------------------------------ accessors

    #[must_use]
    #[inline]
    pub fn player(&self) -> &P {
        &self.player
    }

    #[must_use]
    #[inline]
    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    #[must_use]
    #[inline]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    #[inline]
    pub const fn graph(&self) -> &BeatGraph {
        &self.graph
    }

    #[must_use]
    #[inline]
    pub const fn is_running(&self) -> bool {
        self.running
    }
}
