use std::path::PathBuf;
use thiserror::Error;

/// Root error type for every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum WizError {
    #[error("invalid version {0:?}")]
    InvalidVersion(String),

    #[error("invalid requirement {0:?}")]
    InvalidRequirement(String),

    #[error("incorrect definition '{identifier}': {reason}")]
    IncorrectDefinition { identifier: String, reason: String },

    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("graph resolution failed: {0}")]
    GraphResolution(String),

    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WizError>;
