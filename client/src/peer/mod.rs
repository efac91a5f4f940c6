//! Chunk transfer client: one round-trip to fetch one chunk from one peer.
//!
//! Wire format: the client writes the decimal chunk index followed by `\n`,
//! the peer answers with the chunk's raw bytes and closes the stream. There
//! is no length prefix, so a final chunk shorter than `chunk_size` and a
//! connection dropped mid-chunk look the same here; the assembler's digest
//! check is what tells them apart.

use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};

/// Why a single chunk attempt failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("connection to {peer} failed: {source}")]
    Connect { peer: String, source: io::Error },
    #[error("sending request to {peer} failed: {source}")]
    RequestWrite { peer: String, source: io::Error },
    #[error("reading from {peer} failed: {source}")]
    Read { peer: String, source: io::Error },
    #[error("no data received from {peer}")]
    NoDataReceived { peer: String },
}

/// Fetches the raw bytes of one chunk from one peer.
///
/// Implementations perform exactly one attempt; retry policy belongs to the
/// caller.
pub trait ChunkFetcher: Send + Sync + 'static {
    fn fetch_chunk(
        &self,
        peer: &str,
        index: usize,
        expected_len: usize,
    ) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// [`ChunkFetcher`] speaking the plaintext index protocol over TCP.
#[derive(Debug, Clone)]
pub struct TcpChunkClient {
    /// Limit on establishing the connection.
    pub connect_timeout: Duration,
    /// Limit on the whole exchange after connecting.
    pub read_timeout: Duration,
}

impl Default for TcpChunkClient {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", what))
}

impl ChunkFetcher for TcpChunkClient {
    async fn fetch_chunk(
        &self,
        peer: &str,
        index: usize,
        expected_len: usize,
    ) -> Result<Vec<u8>, FetchError> {
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(FetchError::Connect {
                    peer: peer.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(FetchError::Connect {
                    peer: peer.to_string(),
                    source: timed_out("connect"),
                });
            }
        };
        let deadline = Instant::now() + self.read_timeout;

        let request = format!("{}\n", index);
        match timeout_at(deadline, stream.write_all(request.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(FetchError::RequestWrite {
                    peer: peer.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(FetchError::RequestWrite {
                    peer: peer.to_string(),
                    source: timed_out("request"),
                });
            }
        }

        let mut buf = vec![0u8; expected_len];
        let mut total = 0;
        while total < expected_len {
            let source = match timeout_at(deadline, stream.read(&mut buf[total..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    total += n;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => timed_out("read"),
            };
            // whatever arrived before the stream ended is the chunk
            if total > 0 {
                break;
            }
            return Err(FetchError::Read {
                peer: peer.to_string(),
                source,
            });
        }

        if total == 0 {
            return Err(FetchError::NoDataReceived {
                peer: peer.to_string(),
            });
        }
        buf.truncate(total);
        Ok(buf)
    }
}
