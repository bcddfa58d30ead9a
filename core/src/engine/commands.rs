//! This module contains the commands that can be sent to the jukebox engine.
#![allow(clippy::module_name_repetitions)]

use std::fmt::Display;

use crate::config::EngineConfigPatch;
use crate::state::EngineUpdate;
use crate::viz::{BeatView, VisualizationData};
use evermix_analysis::RawAnalysis;

/// Commands that can be sent to the jukebox engine.
#[derive(Debug)]
pub enum EngineCommand {
    /// Normalize a raw analysis, build its graph, and make it the current
    /// track.
    LoadAnalysis(Box<RawAnalysis>),
    /// Rebuild the graph under the current config.
    RebuildGraph,
    /// Shallow-merge tuning changes; does not rebuild.
    UpdateConfig(Box<EngineConfigPatch>),
    /// Arm the tick loop.
    StartJukebox,
    /// Disarm the tick loop and stop the player.
    StopJukebox,
    Play,
    Pause,
    /// Seek the player to the start of a beat.
    SeekToBeat(usize),
    /// Seek the player to a raw time in seconds.
    SeekToTime(f64),
    /// Delete the edge between two beats (and its reverse); survives
    /// rebuilds.
    DeleteEdge { src: usize, dest: usize },
    /// Forget all user edge deletions.
    ClearDeletedEdges,
    /// Force a branch on the next advance.
    SetForceBranch(bool),
    /// Look up the beat containing a time.
    BeatAtTime(f64, tokio::sync::oneshot::Sender<Option<BeatView>>),
    /// Snapshot the beats and live edges for rendering.
    Visualization(tokio::sync::oneshot::Sender<VisualizationData>),
    /// Report the current runtime state.
    ReportStatus(tokio::sync::oneshot::Sender<EngineUpdate>),
    /// Stop the engine thread.
    Exit,
}

impl PartialEq for EngineCommand {
    #[allow(clippy::missing_inline_in_public_items)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::RebuildGraph, Self::RebuildGraph)
            | (Self::StartJukebox, Self::StartJukebox)
            | (Self::StopJukebox, Self::StopJukebox)
            | (Self::Play, Self::Play)
            | (Self::Pause, Self::Pause)
            | (Self::ClearDeletedEdges, Self::ClearDeletedEdges)
            | (Self::BeatAtTime(_, _), Self::BeatAtTime(_, _))
            | (Self::Visualization(_), Self::Visualization(_))
            | (Self::ReportStatus(_), Self::ReportStatus(_))
            | (Self::Exit, Self::Exit) => true,
            (Self::LoadAnalysis(a), Self::LoadAnalysis(b)) => a == b,
            (Self::UpdateConfig(a), Self::UpdateConfig(b)) => a == b,
            (Self::SeekToBeat(a), Self::SeekToBeat(b)) => a == b,
            (Self::SeekToTime(a), Self::SeekToTime(b)) => a == b,
            (Self::SetForceBranch(a), Self::SetForceBranch(b)) => a == b,
            (
                Self::DeleteEdge { src: a, dest: b },
                Self::DeleteEdge { src: c, dest: d },
            ) => a == c && b == d,
            _ => false,
        }
    }
}

impl Display for EngineCommand {
    #[allow(clippy::missing_inline_in_public_items)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadAnalysis(raw) => write!(f, "Load Analysis ({} beats)", raw.beats.len()),
            Self::RebuildGraph => write!(f, "Rebuild Graph"),
            Self::UpdateConfig(_) => write!(f, "Update Config"),
            Self::StartJukebox => write!(f, "Start Jukebox"),
            Self::StopJukebox => write!(f, "Stop Jukebox"),
            Self::Play => write!(f, "Play"),
            Self::Pause => write!(f, "Pause"),
            Self::SeekToBeat(index) => write!(f, "Seek to beat {index}"),
            Self::SeekToTime(t) => write!(f, "Seek to {t:.3}s"),
            Self::DeleteEdge { src, dest } => write!(f, "Delete edge {src} -> {dest}"),
            Self::ClearDeletedEdges => write!(f, "Clear Deleted Edges"),
            Self::SetForceBranch(on) => write!(f, "Force Branch: {on}"),
            Self::BeatAtTime(t, _) => write!(f, "Beat at {t:.3}s"),
            Self::Visualization(_) => write!(f, "Visualization"),
            Self::ReportStatus(_) => write!(f, "Report Status"),
            Self::Exit => write!(f, "Exit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_str_eq;
    use rstest::rstest;

    #[rstest]
    #[case(EngineCommand::Play, EngineCommand::Play, true)]
    #[case(EngineCommand::Play, EngineCommand::Pause, false)]
    #[case(EngineCommand::RebuildGraph, EngineCommand::RebuildGraph, true)]
    #[case(EngineCommand::StartJukebox, EngineCommand::StopJukebox, false)]
    #[case(EngineCommand::SeekToBeat(3), EngineCommand::SeekToBeat(3), true)]
    #[case(EngineCommand::SeekToBeat(3), EngineCommand::SeekToBeat(4), false)]
    #[case(EngineCommand::SeekToTime(1.5), EngineCommand::SeekToTime(1.5), true)]
    #[case(EngineCommand::SeekToTime(1.5), EngineCommand::SeekToBeat(1), false)]
    #[case(
        EngineCommand::DeleteEdge { src: 1, dest: 2 },
        EngineCommand::DeleteEdge { src: 1, dest: 2 },
        true
    )]
    #[case(
        EngineCommand::DeleteEdge { src: 1, dest: 2 },
        EngineCommand::DeleteEdge { src: 2, dest: 1 },
        false
    )]
    #[case(EngineCommand::SetForceBranch(true), EngineCommand::SetForceBranch(true), true)]
    #[case(EngineCommand::SetForceBranch(true), EngineCommand::SetForceBranch(false), false)]
    #[case(
        EngineCommand::LoadAnalysis(Box::default()),
        EngineCommand::LoadAnalysis(Box::default()),
        true
    )]
    #[case(EngineCommand::Exit, EngineCommand::Exit, true)]
    #[case(EngineCommand::Exit, EngineCommand::Play, false)]
    fn test_engine_command_equality(
        #[case] lhs: EngineCommand,
        #[case] rhs: EngineCommand,
        #[case] expected: bool,
    ) {
        assert_eq!(lhs == rhs, expected);
        assert_eq!(rhs == lhs, expected);
    }

    #[rstest]
    #[case(EngineCommand::Play, "Play")]
    #[case(EngineCommand::Pause, "Pause")]
    #[case(EngineCommand::RebuildGraph, "Rebuild Graph")]
    #[case(EngineCommand::StartJukebox, "Start Jukebox")]
    #[case(EngineCommand::StopJukebox, "Stop Jukebox")]
    #[case(EngineCommand::LoadAnalysis(Box::default()), "Load Analysis (0 beats)")]
    #[case(EngineCommand::UpdateConfig(Box::default()), "Update Config")]
    #[case(EngineCommand::SeekToBeat(12), "Seek to beat 12")]
    #[case(EngineCommand::SeekToTime(1.5), "Seek to 1.500s")]
    #[case(EngineCommand::DeleteEdge { src: 8, dest: 2 }, "Delete edge 8 -> 2")]
    #[case(EngineCommand::ClearDeletedEdges, "Clear Deleted Edges")]
    #[case(EngineCommand::SetForceBranch(true), "Force Branch: true")]
    #[case(
        EngineCommand::BeatAtTime(0.25, tokio::sync::oneshot::channel().0),
        "Beat at 0.250s"
    )]
    #[case(
        EngineCommand::Visualization(tokio::sync::oneshot::channel().0),
        "Visualization"
    )]
    #[case(
        EngineCommand::ReportStatus(tokio::sync::oneshot::channel().0),
        "Report Status"
    )]
    #[case(EngineCommand::Exit, "Exit")]
    fn test_engine_command_display(#[case] command: EngineCommand, #[case] expected: &str) {
        assert_str_eq!(command.to_string(), expected);
    }
}
