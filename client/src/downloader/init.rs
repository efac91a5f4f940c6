use super::DownloadConfig;
use super::state::{CompletionTracker, Downloader};
use super::stats::RunStats;
use crate::error::SetupError;
use crate::peer::ChunkFetcher;
use crate::storage::Storage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swarm_core::{DescriptorError, TransferDescriptor};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Reads and validates a descriptor file without blocking the runtime.
pub async fn load_descriptor(path: &Path) -> Result<TransferDescriptor, SetupError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SetupError::DescriptorLoad {
            path: path.to_path_buf(),
            source: DescriptorError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
    let descriptor =
        TransferDescriptor::from_json(&bytes).map_err(|source| SetupError::DescriptorLoad {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), chunks = descriptor.total_chunks, "descriptor loaded");
    Ok(descriptor)
}

/// Builds a [`Downloader`] ready to run.
///
/// This:
/// 1. Initializes the download directory.
/// 2. Creates the output file, truncated and sized to the final length.
/// 3. Starts every chunk as incomplete and zeroes the run statistics.
pub async fn prepare<F: ChunkFetcher>(
    descriptor: TransferDescriptor,
    output: Option<PathBuf>,
    config: DownloadConfig,
    fetcher: F,
) -> Result<Downloader<F>, SetupError> {
    let storage = Storage::new(output).await.map_err(SetupError::Storage)?;

    let (output_path, file) = storage
        .create_output(&descriptor.file_name, descriptor.file_size)
        .await
        .map_err(|source| SetupError::OutputCreate {
            path: storage.get_file_path(&descriptor.file_name),
            source,
        })?;
    info!(
        file = %descriptor.file_name,
        size = descriptor.file_size,
        chunks = descriptor.total_chunks,
        output = %output_path.display(),
        "output file ready"
    );

    let total = descriptor.total_chunks;
    Ok(Downloader {
        descriptor: Arc::new(descriptor),
        config,
        output_path,
        file: Arc::new(Mutex::new(file)),
        completion: Arc::new(CompletionTracker::new(total)),
        stats: Arc::new(RunStats::new(total)),
        fetcher: Arc::new(fetcher),
    })
}
