//! Swarm downloader.
//!
//! Fetches the chunks listed in a transfer descriptor from every known peer,
//! verifies each against its SHA-256 digest and writes it into a pre-sized
//! output file, retrying whatever is still missing over a bounded number of
//! passes.

pub mod cli;
pub mod downloader;
pub mod error;
pub mod peer;
pub mod storage;

pub use downloader::{DownloadConfig, DownloadReport, Downloader};
pub use error::{CommitError, SetupError};
pub use peer::{ChunkFetcher, FetchError, TcpChunkClient};
