//! Error type shared by the reconstruction, encoding, storage and detection stages.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, storing or scoring call-stack arrays
#[derive(Error, Debug)]
pub enum CallStackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode call-stack array: {0}")]
    Encode(String),

    #[error("Failed to decode call-stack array: {0}")]
    Decode(String),

    #[error("Invalid array store header: {0}")]
    Header(String),

    #[error("No root calls found at depth {target_depth}")]
    NoRootCalls { target_depth: u32 },

    #[error("Array store is not initialized for {0}")]
    NotInitialized(&'static str),

    #[error("Array store is inconsistent: {0}")]
    Inconsistent(String),

    #[error("Missing artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<rmp_serde::encode::Error> for CallStackError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CallStackError::Encode(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CallStackError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CallStackError::Decode(e.to_string())
    }
}

/// Result type for call-stack analysis operations
pub type Result<T> = std::result::Result<T, CallStackError>;
