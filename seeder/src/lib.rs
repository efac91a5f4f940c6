//! Chunk responder for the swarm transfer protocol.
//!
//! A seeder owns one source file and its descriptor, and answers each TCP
//! connection with the raw bytes of the single chunk the peer asks for.

pub mod server;
pub mod stats;

pub use server::{ChunkServer, ShutdownHandle};
pub use stats::SeederStats;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swarm_core::{DescriptorError, TransferDescriptor};
use thiserror::Error;
use tracing::info;

/// Errors raised by the seeder.
#[derive(Error, Debug)]
pub enum SeederError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("descriptor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Settings for the chunk responder.
#[derive(Debug, Clone)]
pub struct SeederConfig {
    /// Interface to listen on.
    pub bind_host: String,
    /// TCP port to listen on; `0` picks a free port.
    pub port: u16,
    /// Hard wall-clock limit on the accept loop. `None` serves until shut down.
    pub shutdown_after: Option<Duration>,
    /// Deadline for reading the request and writing the chunk on one connection.
    pub io_timeout: Duration,
    /// How often serving statistics are printed.
    pub stats_interval: Duration,
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_after: Some(Duration::from_secs(60)),
            io_timeout: Duration::from_secs(30),
            stats_interval: Duration::from_secs(10),
        }
    }
}

impl SeederConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Hashes `source`, writes its descriptor into `torrents_dir`, then serves
/// chunks until the configured deadline or a shutdown.
///
/// The descriptor advertises `127.0.0.1:<port>` as its only peer.
pub async fn seed(
    source: &Path,
    chunk_size: u64,
    torrents_dir: &Path,
    config: SeederConfig,
) -> Result<(), SeederError> {
    let (descriptor, _) = create_descriptor(
        source.to_path_buf(),
        chunk_size,
        vec![format!("127.0.0.1:{}", config.port)],
        torrents_dir.to_path_buf(),
    )
    .await?;
    info!(
        file = %descriptor.file_name,
        chunks = descriptor.total_chunks,
        "seeding"
    );

    let stats = Arc::new(SeederStats::new());
    let server = ChunkServer::new(source.to_path_buf(), descriptor, config, stats);

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
            handle.shutdown();
        }
    });

    server.run().await
}

/// Runs the blocking hashing pass off the async runtime and saves the result.
/// Returns the descriptor and the path it was written to.
pub async fn create_descriptor(
    source: PathBuf,
    chunk_size: u64,
    peers: Vec<String>,
    torrents_dir: PathBuf,
) -> Result<(TransferDescriptor, PathBuf), SeederError> {
    let saved = tokio::task::spawn_blocking(move || {
        let descriptor = TransferDescriptor::create(&source, chunk_size, peers)?;
        let path = descriptor.save(&torrents_dir)?;
        info!(path = %path.display(), "descriptor written");
        Ok::<_, DescriptorError>((descriptor, path))
    })
    .await??;
    Ok(saved)
}
