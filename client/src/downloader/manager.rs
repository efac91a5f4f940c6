use super::assembler::{Assembler, PassOutcome};
use super::state::Downloader;
use super::stats::{DownloadReport, report_progress};
use super::worker::{DispatchSummary, WorkerPool, WorkerSettings, dispatch};
use crate::peer::ChunkFetcher;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub async fn run<F: ChunkFetcher>(downloader: &Downloader<F>) -> DownloadReport {
    let (stop_tx, stop_rx) = watch::channel(false);
    let reporter = tokio::spawn(report_progress(
        downloader.stats.clone(),
        downloader.config.report_interval,
        stop_rx,
    ));

    let max_passes = downloader.config.max_passes.max(1);
    let mut passes = 0;
    for pass in 1..=max_passes {
        passes = pass;
        let outcome = run_pass(downloader, pass).await;
        info!(
            pass,
            committed = outcome.committed,
            failed = outcome.failed,
            duplicates = outcome.duplicates,
            "pass finished"
        );
        if outcome.complete {
            break;
        }
        if pass == max_passes {
            warn!(pass, "reached maximum passes with chunks still missing");
        }
    }

    {
        let mut file = downloader.file.lock().await;
        if let Err(e) = file.flush().await {
            warn!(error = %e, "failed to flush output file");
        }
        if let Err(e) = file.sync_all().await {
            warn!(error = %e, "failed to sync output file");
        }
    }

    let _ = stop_tx.send(true);
    if let Err(e) = reporter.await {
        warn!(error = %e, "progress reporter panicked");
    }

    DownloadReport {
        stats: downloader.stats.snapshot().await,
        missing: downloader.completion.incomplete().await,
        output_path: downloader.output_path.clone(),
        passes,
    }
}

/// One dispatch, fetch and assemble cycle over the chunks still missing.
pub(crate) async fn run_pass<F: ChunkFetcher>(
    downloader: &Downloader<F>,
    pass: usize,
) -> PassOutcome {
    let pending = downloader.completion.incomplete().await;
    if pending.is_empty() {
        return PassOutcome {
            complete: true,
            ..PassOutcome::default()
        };
    }
    info!(pass, pending = pending.len(), "starting pass");

    let config = &downloader.config;
    let (req_tx, req_rx) = mpsc::channel(config.request_queue.max(1));
    let (res_tx, res_rx) = mpsc::channel(config.result_queue.max(1));

    let pool = WorkerPool::spawn(
        WorkerSettings {
            workers: config.workers,
            result_send_timeout: config.result_send_timeout,
        },
        downloader.fetcher.clone(),
        req_rx,
        res_tx,
        downloader.stats.clone(),
    );

    let descriptor = downloader.descriptor.clone();
    let dispatcher = tokio::spawn(async move { dispatch(&pending, &descriptor, req_tx) });

    let outcome = {
        let mut file = downloader.file.lock().await;
        Assembler::new(&downloader.descriptor, &downloader.completion, &downloader.stats)
            .assemble(res_rx, &mut *file)
            .await
    };

    pool.join().await;
    let summary = match dispatcher.await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(pass, error = %e, "dispatcher task failed");
            DispatchSummary::default()
        }
    };
    debug!(pass, admitted = summary.admitted, "requests dispatched");
    if summary.dropped > 0 {
        downloader.stats.record_requests_dropped(summary.dropped).await;
        warn!(
            pass,
            dropped = summary.dropped,
            admitted = summary.admitted,
            "request queue full, some requests were dropped"
        );
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{FakePeers, descriptor_for, downloader_in};
    use std::time::Duration;
    use tempfile::tempdir;

    const DATA: &[u8] = b"0123456789";

    #[tokio::test]
    async fn test_scenario_a_single_pass_completes() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1"]);
        let downloader = downloader_in(dir.path(), descriptor, FakePeers::serving(DATA, 4)).await;

        let report = downloader.run().await;

        assert_eq!(report.passes, 1);
        assert!(report.is_complete());
        assert_eq!(report.stats.completed, 3);
        assert_eq!(report.stats.failed, 0);
        assert_eq!(report.stats.bytes_downloaded, 10);
        let written = tokio::fs::read(&report.output_path).await.unwrap();
        assert_eq!(written, DATA);
    }

    #[tokio::test]
    async fn test_scenario_b_tampered_chunk_recovers_next_pass() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1"]);
        let fetcher = FakePeers::serving(DATA, 4).with_tampered(1, 1);
        let downloader = downloader_in(dir.path(), descriptor, fetcher).await;

        let first = run_pass(&downloader, 1).await;
        assert!(!first.complete);
        assert!(!downloader.completion.is_complete(1).await);
        assert!(downloader.completion.is_complete(0).await);
        assert!(downloader.stats.snapshot().await.failed >= 1);

        let second = run_pass(&downloader, 2).await;
        assert!(second.complete);
        assert_eq!(second.received, 1);
        assert!(downloader.completion.is_complete(1).await);

        let report = downloader.run().await;
        assert!(report.missing.is_empty());
        let written = tokio::fs::read(&report.output_path).await.unwrap();
        assert_eq!(written, DATA);
    }

    #[tokio::test]
    async fn test_scenario_c_unreachable_peer_terminates() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1"]);
        let downloader = downloader_in(dir.path(), descriptor, FakePeers::unreachable()).await;

        let report = tokio::time::timeout(Duration::from_secs(10), downloader.run())
            .await
            .expect("run must terminate");

        assert_eq!(report.passes, 3);
        assert_eq!(report.missing, vec![0, 1, 2]);
        assert_eq!(report.stats.completed, 0);
        assert_eq!(report.stats.failed, 9);
        assert!(report.to_string().contains("WARNING: 3 chunks are missing"));
        assert_eq!(downloader.fetcher.calls(), 9);
    }

    #[tokio::test]
    async fn test_chunk_size_beyond_file_size_fetches_file_length() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 1 << 44, &["p:1"]);
        assert!(descriptor.validate().is_ok());
        let downloader =
            downloader_in(dir.path(), descriptor, FakePeers::serving(DATA, 1 << 44)).await;

        let report = downloader.run().await;

        assert!(report.is_complete());
        assert_eq!(downloader.fetcher.largest_request(), DATA.len());
        let written = tokio::fs::read(&report.output_path).await.unwrap();
        assert_eq!(written, DATA);
    }

    #[tokio::test]
    async fn test_two_peers_deliver_each_chunk_once() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1", "p:2"]);
        let downloader = downloader_in(dir.path(), descriptor, FakePeers::serving(DATA, 4)).await;

        let report = downloader.run().await;

        assert!(report.is_complete());
        assert_eq!(report.stats.completed, 3);
        assert_eq!(report.stats.bytes_downloaded, 10);
        assert_eq!(downloader.fetcher.calls(), 6);
    }

    #[tokio::test]
    async fn test_down_peer_is_covered_by_other_peer() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1", "p:2"]);
        let fetcher = FakePeers::serving(DATA, 4).with_down_peer("p:1");
        let downloader = downloader_in(dir.path(), descriptor, fetcher).await;

        let report = downloader.run().await;

        assert!(report.is_complete());
        assert_eq!(report.passes, 1);
        assert_eq!(report.stats.completed, 3);
        let written = tokio::fs::read(&report.output_path).await.unwrap();
        assert_eq!(written, DATA);
    }

    #[tokio::test]
    async fn test_empty_reply_is_never_a_success() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1"]);
        let fetcher = FakePeers::serving(DATA, 4).with_empty(2);
        let downloader = downloader_in(dir.path(), descriptor, fetcher).await;

        let report = downloader.run().await;

        assert_eq!(report.missing, vec![2]);
        assert_eq!(report.stats.completed, 2);
        assert_eq!(report.stats.failed, 3);
        assert!(!downloader.completion.is_complete(2).await);
    }

    #[tokio::test]
    async fn test_full_request_queue_is_counted() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1", "p:2"]);
        let mut downloader =
            downloader_in(dir.path(), descriptor, FakePeers::serving(DATA, 4)).await;
        downloader.config.request_queue = 2;

        let report = downloader.run().await;

        // six requests into a queue of two; later passes pick up the rest
        assert!(report.stats.requests_dropped > 0);
        assert!(report.is_complete());
        assert!(report.to_string().contains("Dropped:"));
    }

    #[tokio::test]
    async fn test_complete_download_skips_further_passes() {
        let dir = tempdir().unwrap();
        let descriptor = descriptor_for(DATA, 4, &["p:1"]);
        let downloader = downloader_in(dir.path(), descriptor, FakePeers::serving(DATA, 4)).await;

        downloader.run().await;
        let calls = downloader.fetcher.calls();
        let again = run_pass(&downloader, 4).await;

        assert!(again.complete);
        assert_eq!(again.received, 0);
        assert_eq!(downloader.fetcher.calls(), calls);
    }
}
