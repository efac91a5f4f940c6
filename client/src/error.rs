use std::io;
use std::path::PathBuf;
use swarm_core::DescriptorError;
use thiserror::Error;

/// Failures that stop a download before any chunk work starts.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("failed to load descriptor '{}': {source}", .path.display())]
    DescriptorLoad {
        path: PathBuf,
        source: DescriptorError,
    },
    #[error("failed to prepare download directory: {0}")]
    Storage(#[source] io::Error),
    #[error("failed to create output file '{}': {source}", .path.display())]
    OutputCreate { path: PathBuf, source: io::Error },
}

/// Why a fetched chunk was not committed to the output file.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("chunk {0} is not part of this download")]
    UnknownChunk(usize),
    #[error("hash mismatch for chunk {index}: expected {expected}, got {actual}")]
    HashMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("incomplete write for chunk {index}: wrote {written} of {expected} bytes")]
    ShortWrite {
        index: usize,
        written: usize,
        expected: usize,
    },
    #[error("failed to write chunk {index}: {source}")]
    Write { index: usize, source: io::Error },
}
