//! Request dispatcher and chunk worker pool for one pass.

use super::state::{ChunkRequest, ChunkResult};
use super::stats::RunStats;
use crate::peer::ChunkFetcher;
use std::sync::Arc;
use std::time::Duration;
use swarm_core::TransferDescriptor;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How many requests one dispatch admitted into the queue and how many it
/// had to drop because the queue was full.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub admitted: usize,
    pub dropped: usize,
}

/// Queues one request per (pending chunk, descriptor peer) pair without ever
/// waiting.
///
/// A full queue drops that particular request. The sender is consumed, so the
/// queue closes once the workers have drained what was admitted.
pub fn dispatch(
    pending: &[usize],
    descriptor: &TransferDescriptor,
    requests: mpsc::Sender<ChunkRequest>,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for &index in pending {
        let len = descriptor.chunk_len(index) as usize;
        for peer in &descriptor.peers {
            let request = ChunkRequest {
                index,
                peer: peer.clone(),
                len,
            };
            match requests.try_send(request) {
                Ok(()) => summary.admitted += 1,
                Err(_) => summary.dropped += 1,
            }
        }
    }
    summary
}

/// Settings shared by every worker in a pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub workers: usize,
    pub result_send_timeout: Duration,
}

/// A fixed set of workers draining one request queue.
///
/// The result queue closes when the last worker exits, which is how the
/// assembler learns the pass is over.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<F: ChunkFetcher>(
        settings: WorkerSettings,
        fetcher: Arc<F>,
        requests: mpsc::Receiver<ChunkRequest>,
        results: mpsc::Sender<ChunkResult>,
        stats: Arc<RunStats>,
    ) -> Self {
        let requests = Arc::new(Mutex::new(requests));
        let handles = (0..settings.workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    settings,
                    fetcher.clone(),
                    requests.clone(),
                    results.clone(),
                    stats.clone(),
                ))
            })
            .collect();
        Self { handles }
    }

    /// Waits for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "chunk worker panicked");
            }
        }
    }
}

async fn worker<F: ChunkFetcher>(
    id: usize,
    settings: WorkerSettings,
    fetcher: Arc<F>,
    requests: Arc<Mutex<mpsc::Receiver<ChunkRequest>>>,
    results: mpsc::Sender<ChunkResult>,
    stats: Arc<RunStats>,
) {
    loop {
        let next = requests.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };

        let outcome = fetcher
            .fetch_chunk(&request.peer, request.index, request.len)
            .await;
        let result = ChunkResult {
            index: request.index,
            peer: request.peer,
            outcome,
        };

        match tokio::time::timeout(settings.result_send_timeout, results.send(result)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                debug!(worker = id, "result queue closed, stopping");
                break;
            }
            Err(_) => {
                warn!(
                    worker = id,
                    index = request.index,
                    "timeout sending chunk result, dropping it"
                );
                stats.record_result_dropped().await;
            }
        }
    }
    debug!(worker = id, "chunk worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{FakePeers, descriptor_for};

    #[tokio::test]
    async fn test_dispatch_broadcasts_to_every_peer() {
        let descriptor = descriptor_for(b"abcdefghij", 4, &["a:1", "b:2"]);
        let (tx, mut rx) = mpsc::channel(16);
        let summary = dispatch(&[0, 2], &descriptor, tx);
        assert_eq!(summary, DispatchSummary { admitted: 4, dropped: 0 });

        let mut got = Vec::new();
        while let Some(req) = rx.recv().await {
            got.push((req.index, req.peer, req.len));
        }
        assert_eq!(
            got,
            vec![
                (0, "a:1".to_string(), 4),
                (0, "b:2".to_string(), 4),
                (2, "a:1".to_string(), 2),
                (2, "b:2".to_string(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_uses_file_length_when_chunk_size_is_larger() {
        let descriptor = descriptor_for(b"0123456789", 1 << 44, &["a:1"]);
        let (tx, mut rx) = mpsc::channel(4);
        dispatch(&[0], &descriptor, tx);

        let req = rx.recv().await.unwrap();
        assert_eq!(req.len, 10);
    }

    #[tokio::test]
    async fn test_dispatch_drops_when_queue_full() {
        let descriptor = descriptor_for(&[7u8; 20], 4, &["a:1"]);
        let (tx, _rx) = mpsc::channel(3);
        let summary = dispatch(&[0, 1, 2, 3, 4], &descriptor, tx);
        assert_eq!(summary, DispatchSummary { admitted: 3, dropped: 2 });
    }

    #[tokio::test]
    async fn test_dispatch_without_peers_sends_nothing() {
        let descriptor = descriptor_for(b"abcdefgh", 4, &[]);
        let (tx, mut rx) = mpsc::channel(3);
        let summary = dispatch(&[0, 1], &descriptor, tx);
        assert_eq!(summary.admitted, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_pool_answers_every_request_then_closes() {
        let data = b"abcdefghij";
        let fetcher = Arc::new(FakePeers::serving(data, 4));
        let stats = Arc::new(RunStats::new(3));
        let (req_tx, req_rx) = mpsc::channel(16);
        let (res_tx, mut res_rx) = mpsc::channel(16);

        let pool = WorkerPool::spawn(
            WorkerSettings {
                workers: 3,
                result_send_timeout: Duration::from_secs(1),
            },
            fetcher.clone(),
            req_rx,
            res_tx,
            stats,
        );
        dispatch(&[0, 1, 2], &descriptor_for(data, 4, &["a:1", "b:2"]), req_tx);

        let mut results = Vec::new();
        while let Some(r) = res_rx.recv().await {
            results.push((r.index, r.outcome.unwrap()));
        }
        pool.join().await;

        results.sort();
        assert_eq!(results.len(), 6);
        assert_eq!(results[0], (0, b"abcd".to_vec()));
        assert_eq!(results[5], (2, b"ij".to_vec()));
        assert_eq!(fetcher.largest_request(), 4);
    }

    #[tokio::test]
    async fn test_result_send_timeout_drops_result() {
        let fetcher = Arc::new(FakePeers::serving(b"abcd", 4));
        let stats = Arc::new(RunStats::new(1));
        let (req_tx, req_rx) = mpsc::channel(16);
        // room for one result; nobody reads until the workers are done
        let (res_tx, mut res_rx) = mpsc::channel(1);

        let pool = WorkerPool::spawn(
            WorkerSettings {
                workers: 1,
                result_send_timeout: Duration::from_millis(50),
            },
            fetcher,
            req_rx,
            res_tx,
            stats.clone(),
        );
        dispatch(&[0], &descriptor_for(b"abcd", 4, &["a:1", "b:2", "c:3"]), req_tx);

        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("workers must not block on a full result queue");

        assert_eq!(stats.snapshot().await.results_dropped, 2);
        assert!(res_rx.recv().await.is_some());
        assert!(res_rx.recv().await.is_none());
    }
}
