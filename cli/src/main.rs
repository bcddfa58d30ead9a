//! evermix: play one track forever, one beat at a time.
//!
//! Takes a pre-computed analysis JSON (and usually the audio file it
//! describes), builds the jump graph, and either plays the track through
//! the default audio device or, with `--simulate`, steps a synthetic clock
//! and prints the branch pattern the engine would take.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::Context;
use clap::Parser;
use log::info;

use evermix_analysis::RawAnalysis;
use evermix_core::Jukebox;
use evermix_core::audio::RodioPlayer;
use evermix_core::config::{EngineConfigPatch, Settings};
use evermix_core::engine::{JukeboxSender, TICK_INTERVAL, commands::EngineCommand};
use evermix_core::logger::{init_logger, init_tracing, uptime};
use evermix_core::player::{MockPlayer, Player};
use evermix_core::state::EngineUpdate;

#[derive(Debug, Parser)]
#[command(
    name = "evermix",
    version,
    about = "Play one track forever, one beat at a time"
)]
struct Flags {
    /// Path to the pre-computed analysis JSON for the track.
    analysis: PathBuf,

    /// Audio file to play (the track the analysis describes).
    #[arg(long, required_unless_present = "simulate")]
    audio: Option<PathBuf>,

    /// Run without an audio device: step a synthetic clock and print the
    /// branch pattern the engine takes.
    #[arg(long)]
    simulate: bool,

    /// In simulate mode, stop after this many beats (0 = run forever).
    #[arg(long, default_value_t = 256)]
    beats: u64,

    /// Seed for the branch RNG; omit for a different run every time.
    #[arg(long)]
    seed: Option<u64>,

    /// Path to the config file (defaults to the per-user Evermix.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    // ---- tuning overrides; see Evermix.toml for semantics ----
    #[arg(long)]
    max_branches: Option<usize>,
    #[arg(long)]
    max_branch_threshold: Option<u32>,
    #[arg(long)]
    current_threshold: Option<u32>,
    #[arg(long)]
    min_long_branch: Option<usize>,
    #[arg(long)]
    just_backwards: bool,
    #[arg(long)]
    just_long_branches: bool,
    #[arg(long)]
    remove_sequential_branches: bool,
    #[arg(long)]
    no_last_edge: bool,
}

impl Flags {
    fn as_patch(&self) -> EngineConfigPatch {
        EngineConfigPatch {
            max_branches: self.max_branches,
            max_branch_threshold: self.max_branch_threshold,
            current_threshold: self.current_threshold,
            min_long_branch: self.min_long_branch,
            just_backwards: self.just_backwards.then_some(true),
            just_long_branches: self.just_long_branches.then_some(true),
            remove_sequential_branches: self.remove_sequential_branches.then_some(true),
            add_last_edge: self.no_last_edge.then_some(false),
            ..EngineConfigPatch::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let flags = Flags::parse();

    let config_path = match &flags.config {
        Some(path) => path.clone(),
        None => Settings::get_config_path().context("locating the config file")?,
    };
    let settings = Settings::init(config_path).context("loading settings")?;

    init_logger(settings.log_level);
    tracing::subscriber::set_global_default(init_tracing())
        .context("installing tracing subscriber")?;

    let file = File::open(&flags.analysis)
        .with_context(|| format!("opening analysis {}", flags.analysis.display()))?;
    let raw = RawAnalysis::from_reader(BufReader::new(file)).context("parsing analysis")?;
    anyhow::ensure!(!raw.beats.is_empty(), "the analysis contains no beats");
    info!(
        "track: {} ({} beats, {} segments)",
        raw.track.title.as_deref().unwrap_or("untitled"),
        raw.beats.len(),
        raw.segments.len(),
    );

    let mut patch = flags.as_patch();
    // the config file supplies the baseline; cli flags override it
    let mut base = EngineConfigPatch {
        max_branches: Some(settings.engine.max_branches),
        max_branch_threshold: Some(settings.engine.max_branch_threshold),
        current_threshold: Some(settings.engine.current_threshold),
        add_last_edge: Some(settings.engine.add_last_edge),
        just_backwards: Some(settings.engine.just_backwards),
        just_long_branches: Some(settings.engine.just_long_branches),
        remove_sequential_branches: Some(settings.engine.remove_sequential_branches),
        min_random_branch_chance: Some(settings.engine.min_random_branch_chance),
        max_random_branch_chance: Some(settings.engine.max_random_branch_chance),
        random_branch_chance_delta: Some(settings.engine.random_branch_chance_delta),
        min_long_branch: settings.engine.min_long_branch,
    };
    merge_patches(&mut base, &patch);
    patch = base;

    if flags.simulate {
        simulate(raw, &patch, flags.seed.unwrap_or(0xE7E2), flags.beats)
    } else {
        let audio = flags.audio.expect("clap enforces --audio without --simulate");
        run_live(raw, &patch, flags.seed, &audio)
    }
}

fn merge_patches(base: &mut EngineConfigPatch, overrides: &EngineConfigPatch) {
    macro_rules! merge {
        ($($field:ident),* $(,)?) => {
            $(if overrides.$field.is_some() {
                base.$field = overrides.$field;
            })*
        };
    }
    merge!(
        max_branches,
        max_branch_threshold,
        current_threshold,
        add_last_edge,
        just_backwards,
        just_long_branches,
        remove_sequential_branches,
        min_random_branch_chance,
        max_random_branch_chance,
        random_branch_chance_delta,
        min_long_branch,
    );
}

/// Play through the default audio device until interrupted.
fn run_live(
    raw: RawAnalysis,
    patch: &EngineConfigPatch,
    seed: Option<u64>,
    audio: &PathBuf,
) -> anyhow::Result<()> {
    let mut player = RodioPlayer::new().context("opening the audio device")?;
    player
        .load_file(audio, &mut |percent| info!("loading audio ... {percent}%"))
        .with_context(|| format!("loading audio {}", audio.display()))?;

    let (event_tx, event_rx) = mpsc::channel();
    let sender = match seed {
        Some(seed) => JukeboxSender::start_seeded(player, event_tx, seed),
        None => JukeboxSender::start(player, event_tx),
    };
    sender.send(EngineCommand::UpdateConfig(Box::new(*patch)));
    sender.send(EngineCommand::LoadAnalysis(Box::new(raw)));
    sender.send(EngineCommand::StartJukebox);
    sender.send(EngineCommand::Play);

    // runs until ctrl-c kills the process (the channel never closes while
    // the engine thread lives)
    let mut printer = JumpPrinter::default();
    for update in event_rx {
        printer.print(&update);
    }
    Ok(())
}

/// Step a synthetic clock through `beats` beats and print the branch
/// pattern.
fn simulate(raw: RawAnalysis, patch: &EngineConfigPatch, seed: u64, beats: u64) -> anyhow::Result<()> {
    let (event_tx, event_rx) = mpsc::channel();
    let mut jukebox = Jukebox::seeded(MockPlayer::new(), event_tx, seed);
    jukebox.update_config(patch);
    jukebox.load_analysis(raw);
    anyhow::ensure!(
        jukebox.graph().total_beats > 0,
        "the analysis contains no playable beats"
    );
    jukebox.start_jukebox()?;
    jukebox.play();

    info!(
        "simulating with threshold {} and last branch point {}",
        jukebox.graph().current_threshold,
        jukebox.graph().last_branch_point,
    );

    let step = TICK_INTERVAL.as_secs_f64();
    let mut printer = JumpPrinter::default();
    while beats == 0 || jukebox.runtime_state().beats_played < beats {
        jukebox.player_mut().advance(step);
        jukebox.tick();
        for update in event_rx.try_iter() {
            printer.print(&update);
        }
    }

    let state = jukebox.runtime_state();
    info!(
        "simulated {} beats, {} jumps in {}s",
        state.beats_played,
        printer.jumps,
        uptime(),
    );
    Ok(())
}

/// Prints each jump exactly once as updates stream past.
#[derive(Default)]
struct JumpPrinter {
    last_jump_time: Option<f64>,
    jumps: u64,
}

impl JumpPrinter {
    fn print(&mut self, update: &EngineUpdate) {
        if !update.last_jumped || update.last_jump_time == self.last_jump_time {
            return;
        }
        self.last_jump_time = update.last_jump_time;
        self.jumps += 1;
        let (Some(from), Some(to)) = (update.last_jump_from_index, update.current_beat_index)
        else {
            return;
        };
        println!(
            "jump {from:>5} -> {to:<5} at {:>8.2}s ({} beats played)",
            update.last_jump_time.unwrap_or_default(),
            update.beats_played,
        );
    }
}
