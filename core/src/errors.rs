use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EngineError {
    #[error("no analysis is loaded")]
    NotLoaded,
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Failed to open file: {0}")]
    FileOpen(#[from] std::io::Error),
    #[error("Failed to decode audio: {0}")]
    Decode(String),
    #[error("No audio output device: {0}")]
    Device(String),
}
