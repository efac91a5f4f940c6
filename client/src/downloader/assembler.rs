//! Chunk assembler: the single consumer of a pass's results.
//!
//! Results are applied strictly one at a time, which is what keeps output
//! writes and completion updates race-free without locking byte ranges.

use super::state::{ChunkResult, CompletionTracker};
use super::stats::RunStats;
use crate::error::CommitError;
use std::collections::HashSet;
use std::io::{self, SeekFrom};
use swarm_core::{TransferDescriptor, digest_hex};
use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Hex characters of a digest shown in mismatch reports.
const DIGEST_PREFIX_LEN: usize = 16;

/// What happened to a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The chunk was already done; nothing was written.
    Duplicate,
    /// The chunk was verified, written and marked complete.
    Committed,
    /// The fetch failed or the payload could not be committed.
    Failed,
}

/// Tally of one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub received: usize,
    pub committed: usize,
    pub failed: usize,
    pub duplicates: usize,
    /// Whether every chunk was complete when the pass ended.
    pub complete: bool,
}

pub struct Assembler<'a> {
    descriptor: &'a TransferDescriptor,
    completion: &'a CompletionTracker,
    stats: &'a RunStats,
    finalized: HashSet<usize>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        descriptor: &'a TransferDescriptor,
        completion: &'a CompletionTracker,
        stats: &'a RunStats,
    ) -> Self {
        Self {
            descriptor,
            completion,
            stats,
            finalized: HashSet::new(),
        }
    }

    /// Applies results until the queue closes.
    pub async fn assemble<W>(
        &mut self,
        mut results: mpsc::Receiver<ChunkResult>,
        out: &mut W,
    ) -> PassOutcome
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        let mut outcome = PassOutcome::default();
        while let Some(result) = results.recv().await {
            outcome.received += 1;
            match self.apply(result, out).await {
                Applied::Duplicate => outcome.duplicates += 1,
                Applied::Committed => outcome.committed += 1,
                Applied::Failed => outcome.failed += 1,
            }
        }
        outcome.complete = self.completion.all_complete().await;
        outcome
    }

    /// Applies one result: skip if already done, otherwise verify, write and
    /// mark complete.
    pub async fn apply<W>(&mut self, result: ChunkResult, out: &mut W) -> Applied
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        let ChunkResult {
            index,
            peer,
            outcome,
        } = result;

        if self.finalized.contains(&index) || self.completion.is_complete(index).await {
            debug!(index, %peer, "chunk already complete, discarding");
            return Applied::Duplicate;
        }

        let payload = match outcome {
            Ok(payload) => payload,
            Err(e) => {
                warn!(index, error = %e, "failed to download chunk");
                self.stats.record_failed().await;
                return Applied::Failed;
            }
        };

        if let Err(e) = self.commit(index, &payload, out).await {
            warn!(index, %peer, error = %e, "chunk rejected");
            self.stats.record_failed().await;
            return Applied::Failed;
        }

        self.completion.mark_complete(index).await;
        self.finalized.insert(index);
        self.stats.record_completed(payload.len()).await;
        info!(index, %peer, bytes = payload.len(), "downloaded chunk");
        Applied::Committed
    }

    async fn commit<W>(&self, index: usize, payload: &[u8], out: &mut W) -> Result<(), CommitError>
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        let expected = self
            .descriptor
            .hashes
            .get(index)
            .ok_or(CommitError::UnknownChunk(index))?;
        let actual = digest_hex(payload);
        if actual != *expected {
            return Err(CommitError::HashMismatch {
                index,
                expected: prefix(expected),
                actual: prefix(&actual),
            });
        }

        let offset = self.descriptor.chunk_offset(index);
        let written = write_at(out, offset, payload)
            .await
            .map_err(|source| CommitError::Write { index, source })?;
        if written != payload.len() {
            return Err(CommitError::ShortWrite {
                index,
                written,
                expected: payload.len(),
            });
        }
        Ok(())
    }
}

fn prefix(digest: &str) -> String {
    digest.chars().take(DIGEST_PREFIX_LEN).collect()
}

/// Writes `data` at `offset` and returns how many bytes the sink accepted.
/// Stops early if the sink accepts nothing.
async fn write_at<W>(out: &mut W, offset: u64, data: &[u8]) -> io::Result<usize>
where
    W: AsyncWrite + AsyncSeek + Unpin,
{
    out.seek(SeekFrom::Start(offset)).await?;
    let mut written = 0;
    while written < data.len() {
        let n = out.write(&data[written..]).await?;
        if n == 0 {
            break;
        }
        written += n;
    }
    out.flush().await?;
    Ok(written)
}
