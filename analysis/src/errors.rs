use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to read analysis payload: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse analysis payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
