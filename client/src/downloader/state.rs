use super::DownloadConfig;
use super::stats::RunStats;
use crate::peer::{FetchError, TcpChunkClient};
use std::path::PathBuf;
use std::sync::Arc;
use swarm_core::TransferDescriptor;
use tokio::fs::File;
use tokio::sync::{Mutex, RwLock};

/// One unit of dispatch: fetch chunk `index` from `peer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub index: usize,
    pub peer: String,
    /// Exact length of the chunk, from the descriptor layout.
    pub len: usize,
}

/// The outcome of one [`ChunkRequest`].
#[derive(Debug)]
pub struct ChunkResult {
    pub index: usize,
    pub peer: String,
    pub outcome: Result<Vec<u8>, FetchError>,
}

/// Which chunks have been verified and written to disk.
///
/// Entries only ever go from `false` to `true`. This record alone decides
/// whether the download is finished and which chunks the next pass asks for.
#[derive(Debug)]
pub struct CompletionTracker {
    chunks: RwLock<Vec<bool>>,
}

impl CompletionTracker {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            chunks: RwLock::new(vec![false; total_chunks]),
        }
    }

    /// Marks `index` complete. Returns `true` only for the call that flipped it.
    pub async fn mark_complete(&self, index: usize) -> bool {
        let mut chunks = self.chunks.write().await;
        match chunks.get_mut(index) {
            Some(done) if !*done => {
                *done = true;
                true
            }
            _ => false,
        }
    }

    pub async fn is_complete(&self, index: usize) -> bool {
        self.chunks
            .read()
            .await
            .get(index)
            .copied()
            .unwrap_or(false)
    }

    /// Indices still missing, in ascending order.
    pub async fn incomplete(&self) -> Vec<usize> {
        self.chunks
            .read()
            .await
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
            .collect()
    }

    pub async fn completed_count(&self) -> usize {
        self.chunks.read().await.iter().filter(|done| **done).count()
    }

    pub async fn all_complete(&self) -> bool {
        self.chunks.read().await.iter().all(|done| *done)
    }
}

/// The state of one download run.
///
/// Shared between the pass orchestrator, the worker pool and the assembler.
/// Only the assembler writes to `file` and flips entries in `completion`.
pub struct Downloader<F = TcpChunkClient> {
    /// The loaded, validated descriptor.
    pub descriptor: Arc<TransferDescriptor>,
    pub config: DownloadConfig,
    /// Where the file is being assembled.
    pub output_path: PathBuf,
    /// The pre-sized output file.
    pub file: Arc<Mutex<File>>,
    /// Authoritative per-chunk completion record.
    pub completion: Arc<CompletionTracker>,
    /// Observational counters for progress and the final summary.
    pub stats: Arc<RunStats>,
    /// Transport used by the workers.
    pub fetcher: Arc<F>,
}
