use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::vault::VaultError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{stage}: {message}")]
    Processing { stage: &'static str, message: String },
    #[error("{stage}: timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("DOM smoothie error: {0}")]
    DomSmoothie(#[from] dom_smoothie::ReadabilityError),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Tags an error with the pipeline stage it surfaced in. Stage-tagged
    /// errors pass through unchanged so the original tag is preserved.
    pub fn stage(stage: &'static str, err: AppError) -> AppError {
        match err {
            AppError::Processing { .. } | AppError::Timeout { .. } => err,
            other => AppError::Processing {
                stage,
                message: other.to_string(),
            },
        }
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        AppError::InvalidCredential(err.to_string())
    }
}
