use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    chunks_served: u64,
    bytes_served: u64,
    connections: u64,
}

/// Serving statistics for one seeder instance.
#[derive(Debug)]
pub struct SeederStats {
    started: Instant,
    counters: RwLock<Counters>,
}

/// A point-in-time copy of [`SeederStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeederSnapshot {
    pub chunks_served: u64,
    pub bytes_served: u64,
    pub active_connections: u64,
    pub uptime: Duration,
}

impl SeederStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    pub async fn chunk_served(&self, bytes: usize) {
        let mut c = self.counters.write().await;
        c.chunks_served += 1;
        c.bytes_served += bytes as u64;
    }

    pub async fn connection_opened(&self) {
        self.counters.write().await.connections += 1;
    }

    pub async fn connection_closed(&self) {
        let mut c = self.counters.write().await;
        c.connections = c.connections.saturating_sub(1);
    }

    pub async fn snapshot(&self) -> SeederSnapshot {
        let c = *self.counters.read().await;
        SeederSnapshot {
            chunks_served: c.chunks_served,
            bytes_served: c.bytes_served,
            active_connections: c.connections,
            uptime: self.started.elapsed(),
        }
    }
}

impl Default for SeederStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SeederSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats: {} chunks served, {:.2} MB uploaded, {} active connections, uptime: {}s",
            self.chunks_served,
            self.bytes_served as f64 / (1024.0 * 1024.0),
            self.active_connections,
            self.uptime.as_secs()
        )
    }
}

/// Prints a stats line every `interval` until `stop` flips to `true`.
pub async fn report_stats(
    stats: Arc<SeederStats>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("{}", stats.snapshot().await);
            }
            _ = crate::server::stop_requested(&mut stop) => break,
        }
    }
}
