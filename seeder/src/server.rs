//! TCP chunk server.
//!
//! Each connection carries exactly one request: the decimal chunk index as
//! ASCII followed by a newline. The server answers with that chunk's raw
//! bytes and closes its side of the stream; the close is the only
//! end-of-chunk signal the client gets.

use crate::stats::{SeederStats, report_stats};
use crate::{SeederConfig, SeederError};
use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swarm_core::TransferDescriptor;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Longest request line accepted, newline included.
const MAX_REQUEST_LEN: u64 = 32;

/// Cancels a running [`ChunkServer`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Serves the chunks of one source file.
pub struct ChunkServer {
    /// The file whose chunks are served.
    pub source: Arc<PathBuf>,
    /// Layout of `source`; requests past `total_chunks` are refused.
    pub descriptor: Arc<TransferDescriptor>,
    pub config: SeederConfig,
    /// Serving statistics, shared with the reporter task.
    pub stats: Arc<SeederStats>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ChunkServer {
    pub fn new(
        source: PathBuf,
        descriptor: TransferDescriptor,
        config: SeederConfig,
        stats: Arc<SeederStats>,
    ) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            source: Arc::new(source),
            descriptor: Arc::new(descriptor),
            config,
            stats,
            shutdown: Arc::new(tx),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown.clone(),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener, SeederError> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| SeederError::Bind { addr, source })
    }

    /// Binds the configured address and serves until shut down.
    pub async fn run(&self) -> Result<(), SeederError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until the shutdown deadline expires
    /// or [`ShutdownHandle::shutdown`] is called.
    ///
    /// Connections already accepted keep running on their own tasks and are
    /// bounded by `io_timeout`.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), SeederError> {
        let local = listener.local_addr()?;
        info!(addr = %local, "seeder listening");

        let mut shutdown_rx = self.shutdown.subscribe();
        let reporter = tokio::spawn(report_stats(
            self.stats.clone(),
            self.config.stats_interval,
            self.shutdown.subscribe(),
        ));

        let deadline = shutdown_deadline(self.config.shutdown_after);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    info!("seeder deadline reached, shutting down");
                    break;
                }
                _ = stop_requested(&mut shutdown_rx) => {
                    info!("seeder shutdown requested");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.stats.connection_opened().await;
                        let source = self.source.clone();
                        let descriptor = self.descriptor.clone();
                        let stats = self.stats.clone();
                        let io_timeout = self.config.io_timeout;
                        tokio::spawn(async move {
                            handle_connection(stream, peer, source, descriptor, stats, io_timeout)
                                .await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept error");
                    }
                },
            }
        }

        self.shutdown.send_replace(true);
        let _ = reporter.await;
        println!("{}", self.stats.snapshot().await);
        Ok(())
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
pub(crate) async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_deadline(after: Option<Duration>) {
    match after {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    source: Arc<PathBuf>,
    descriptor: Arc<TransferDescriptor>,
    stats: Arc<SeederStats>,
    io_timeout: Duration,
) {
    match tokio::time::timeout(io_timeout, serve_chunk(stream, &source, &descriptor)).await {
        Ok(Ok((index, bytes))) => {
            stats.chunk_served(bytes).await;
            debug!(%peer, index, bytes, "served chunk");
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "request not served");
        }
        Err(_) => {
            debug!(%peer, "connection timed out");
        }
    }
    stats.connection_closed().await;
}

/// Reads one request from `stream` and answers it. Returns the chunk index
/// and the number of bytes written.
async fn serve_chunk(
    stream: TcpStream,
    source: &Path,
    descriptor: &TransferDescriptor,
) -> Result<(usize, usize), SeederError> {
    let (reader, mut writer) = stream.into_split();

    let mut line = String::new();
    BufReader::new(reader.take(MAX_REQUEST_LEN))
        .read_line(&mut line)
        .await?;
    let index = parse_index(&line, descriptor.total_chunks)?;

    let mut file = tokio::fs::File::open(source).await?;
    file.seek(SeekFrom::Start(descriptor.chunk_offset(index)))
        .await?;

    let mut buf = vec![0u8; descriptor.chunk_len(index) as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    writer.write_all(&buf[..filled]).await?;
    writer.shutdown().await?;
    Ok((index, filled))
}

/// Parses a request line into a chunk index below `total_chunks`.
pub fn parse_index(line: &str, total_chunks: usize) -> Result<usize, SeederError> {
    let trimmed = line.trim();
    let index: usize = trimmed
        .parse()
        .map_err(|_| SeederError::BadRequest(format!("not a chunk index: {:?}", trimmed)))?;
    if index >= total_chunks {
        return Err(SeederError::BadRequest(format!(
            "chunk {} out of range (have {})",
            index, total_chunks
        )));
    }
    Ok(index)
}
