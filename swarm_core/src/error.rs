use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while creating, reading or writing a transfer descriptor.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid descriptor: {0}")]
    Invalid(String),
}
