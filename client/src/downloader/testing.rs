//! In-memory peers and fixtures for downloader tests.

use super::{DownloadConfig, Downloader};
use crate::peer::{ChunkFetcher, FetchError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swarm_core::{TransferDescriptor, digest_hex};

/// Serves slices of one byte buffer, with knobs for misbehaving peers.
pub struct FakePeers {
    data: Vec<u8>,
    chunk_size: usize,
    down: HashSet<String>,
    refuse_all: bool,
    empty: HashSet<usize>,
    tampered: Mutex<HashMap<usize, usize>>,
    pub calls: AtomicUsize,
    largest_request: AtomicUsize,
}

impl FakePeers {
    pub fn serving(data: &[u8], chunk_size: usize) -> Self {
        Self {
            data: data.to_vec(),
            chunk_size,
            down: HashSet::new(),
            refuse_all: false,
            empty: HashSet::new(),
            tampered: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            largest_request: AtomicUsize::new(0),
        }
    }

    /// Every connection attempt is refused.
    pub fn unreachable() -> Self {
        let mut peers = Self::serving(b"", 1);
        peers.refuse_all = true;
        peers
    }

    /// Connections to `peer` are refused.
    pub fn with_down_peer(mut self, peer: &str) -> Self {
        self.down.insert(peer.to_string());
        self
    }

    /// The next `times` replies for `index` have a flipped first byte.
    pub fn with_tampered(self, index: usize, times: usize) -> Self {
        self.tampered.lock().unwrap().insert(index, times);
        self
    }

    /// Requests for `index` end without any bytes.
    pub fn with_empty(mut self, index: usize) -> Self {
        self.empty.insert(index);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The biggest expected length any fetch was asked for.
    pub fn largest_request(&self) -> usize {
        self.largest_request.load(Ordering::SeqCst)
    }
}

impl ChunkFetcher for FakePeers {
    async fn fetch_chunk(
        &self,
        peer: &str,
        index: usize,
        expected_len: usize,
    ) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_request.fetch_max(expected_len, Ordering::SeqCst);
        if self.refuse_all || self.down.contains(peer) {
            return Err(FetchError::Connect {
                peer: peer.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        let start = index * self.chunk_size;
        if self.empty.contains(&index) || start >= self.data.len() {
            return Err(FetchError::NoDataReceived {
                peer: peer.to_string(),
            });
        }
        let end = (start + self.chunk_size).min(self.data.len());
        let mut chunk = self.data[start..end].to_vec();

        let mut tampered = self.tampered.lock().unwrap();
        if let Some(left) = tampered.get_mut(&index) {
            if *left > 0 {
                *left -= 1;
                chunk[0] ^= 0xff;
            }
        }
        Ok(chunk)
    }
}

/// A descriptor for `data` split into `chunk_size` chunks.
pub fn descriptor_for(data: &[u8], chunk_size: usize, peers: &[&str]) -> TransferDescriptor {
    let hashes: Vec<String> = data.chunks(chunk_size).map(digest_hex).collect();
    TransferDescriptor {
        file_name: "payload.bin".to_string(),
        file_size: data.len() as u64,
        chunk_size: chunk_size as u64,
        total_chunks: hashes.len(),
        hashes,
        peers: peers.iter().map(|p| p.to_string()).collect(),
        created_at: 0,
    }
}

/// Defaults with timers short enough for tests.
pub fn test_config() -> DownloadConfig {
    DownloadConfig {
        result_send_timeout: Duration::from_secs(1),
        report_interval: Duration::from_secs(60),
        ..DownloadConfig::default()
    }
}

/// A downloader writing into `dir`, fed by `fetcher`.
pub async fn downloader_in(
    dir: &std::path::Path,
    descriptor: TransferDescriptor,
    fetcher: FakePeers,
) -> Downloader<FakePeers> {
    Downloader::with_fetcher(descriptor, Some(dir.to_path_buf()), test_config(), fetcher)
        .await
        .expect("setup should succeed")
}
