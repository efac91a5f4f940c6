use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};

const MIB: f64 = 1024.0 * 1024.0;

/// Shortest period the progress reporter ticks at.
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    completed: usize,
    failed: usize,
    bytes_downloaded: u64,
    requests_dropped: usize,
    results_dropped: usize,
}

/// Counters for one download run.
///
/// Duplicate and retried attempts mean these can drift from the true per-chunk
/// picture; [`CompletionTracker`](super::CompletionTracker) is authoritative.
#[derive(Debug)]
pub struct RunStats {
    total_chunks: usize,
    started: Instant,
    counters: RwLock<Counters>,
}

/// A point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub total_chunks: usize,
    pub completed: usize,
    pub failed: usize,
    pub bytes_downloaded: u64,
    pub requests_dropped: usize,
    pub results_dropped: usize,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            total_chunks,
            started: Instant::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    pub async fn record_completed(&self, bytes: usize) {
        let mut c = self.counters.write().await;
        c.completed += 1;
        c.bytes_downloaded += bytes as u64;
    }

    pub async fn record_failed(&self) {
        self.counters.write().await.failed += 1;
    }

    pub async fn record_requests_dropped(&self, count: usize) {
        self.counters.write().await.requests_dropped += count;
    }

    pub async fn record_result_dropped(&self) {
        self.counters.write().await.results_dropped += 1;
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let c = *self.counters.read().await;
        StatsSnapshot {
            total_chunks: self.total_chunks,
            completed: c.completed,
            failed: c.failed,
            bytes_downloaded: c.bytes_downloaded,
            requests_dropped: c.requests_dropped,
            results_dropped: c.results_dropped,
            elapsed: self.started.elapsed(),
        }
    }
}

impl StatsSnapshot {
    /// Share of chunks completed, in percent. An empty file is 100% done.
    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total_chunks as f64 * 100.0
    }

    /// Average download rate in MiB/s since the run started.
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_downloaded as f64 / MIB / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Progress: {:.1}% ({}/{} chunks, {} failed, {:.2} MB/s)",
            self.progress_percent(),
            self.completed,
            self.total_chunks,
            self.failed,
            self.throughput_mib_s()
        )
    }
}

/// Prints a progress line every `interval` until every chunk is completed
/// or `stop` flips to `true`.
pub async fn report_progress(
    stats: Arc<RunStats>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(MIN_REPORT_INTERVAL));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = stats.snapshot().await;
                if snap.completed >= snap.total_chunks {
                    return;
                }
                println!("{}", snap);
            }
            _ = stopped(&mut stop) => return,
        }
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// The result of a finished download run.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub stats: StatsSnapshot,
    /// Chunks still missing after the last pass, ascending.
    pub missing: Vec<usize>,
    pub output_path: PathBuf,
    /// Number of passes actually run.
    pub passes: usize,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        if !self.missing.is_empty() {
            let list: Vec<String> = self.missing.iter().map(|i| i.to_string()).collect();
            writeln!(f, "Missing chunks: {}", list.join(", "))?;
        }
        writeln!(f, "Download finished after {} pass(es)", self.passes)?;
        writeln!(
            f,
            "Chunks: {}/{} completed, {} failed, {} missing",
            s.completed,
            s.total_chunks,
            s.failed,
            self.missing.len()
        )?;
        writeln!(f, "Size: {:.2} MB", s.bytes_downloaded as f64 / MIB)?;
        writeln!(f, "Time: {}s", s.elapsed.as_secs())?;
        writeln!(f, "Average speed: {:.2} MB/s", s.throughput_mib_s())?;
        writeln!(f, "Progress: {:.1}%", s.progress_percent())?;
        write!(f, "File saved to: {}", self.output_path.display())?;
        if s.requests_dropped > 0 || s.results_dropped > 0 {
            write!(
                f,
                "\nDropped: {} requests (queue full), {} results (send timeout)",
                s.requests_dropped, s.results_dropped
            )?;
        }
        if !self.missing.is_empty() {
            write!(
                f,
                "\nWARNING: {} chunks are missing, file may be corrupted",
                self.missing.len()
            )?;
        }
        Ok(())
    }
}
