mod assembler;
mod init;
mod manager;
mod state;
mod stats;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{Applied, Assembler, PassOutcome};
pub use state::{ChunkRequest, ChunkResult, CompletionTracker, Downloader};
pub use stats::{DownloadReport, RunStats, StatsSnapshot};
pub use worker::{DispatchSummary, WorkerPool, WorkerSettings, dispatch};

use crate::error::SetupError;
use crate::peer::{ChunkFetcher, TcpChunkClient};
use std::path::{Path, PathBuf};
use std::time::Duration;
use swarm_core::TransferDescriptor;

/// Tunables for one download run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Concurrent chunk workers per pass.
    pub workers: usize,
    /// Capacity of the request queue.
    pub request_queue: usize,
    /// Capacity of the result queue.
    pub result_queue: usize,
    /// How long a worker waits to hand a result to the assembler.
    pub result_send_timeout: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Upper bound on full passes over the missing chunks.
    pub max_passes: usize,
    /// How often a progress line is printed.
    pub report_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            request_queue: 100,
            result_queue: 100,
            result_send_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_passes: 3,
            report_interval: Duration::from_secs(3),
        }
    }
}

impl Downloader<TcpChunkClient> {
    /// Loads the descriptor at `descriptor_path` and prepares a TCP download
    /// into `output` (or `./downloads`).
    pub async fn new(
        descriptor_path: &Path,
        output: Option<PathBuf>,
        config: DownloadConfig,
    ) -> Result<Self, SetupError> {
        let descriptor = init::load_descriptor(descriptor_path).await?;
        let fetcher = TcpChunkClient {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        };
        init::prepare(descriptor, output, config, fetcher).await
    }
}

impl<F: ChunkFetcher> Downloader<F> {
    /// Prepares a download of an already loaded descriptor over `fetcher`.
    pub async fn with_fetcher(
        descriptor: TransferDescriptor,
        output: Option<PathBuf>,
        config: DownloadConfig,
        fetcher: F,
    ) -> Result<Self, SetupError> {
        init::prepare(descriptor, output, config, fetcher).await
    }

    /// Runs passes until every chunk is in place or the pass limit is hit.
    /// Per-chunk failures never abort the run; they show up in the report.
    pub async fn run(&self) -> DownloadReport {
        manager::run(self).await
    }
}
