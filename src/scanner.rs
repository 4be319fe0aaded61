//! Historical range scanning
//!
//! Drives the block processor over a closed interval of block numbers with
//! bounded concurrent fetches, while emitting results strictly in ascending
//! block-number order. Out-of-order completions wait in a reorder buffer
//! keyed by block number and are released in sequence.

use crate::aggregator::ChainEvent;
use crate::error::ProcessError;
use crate::processor::{BlockProcessor, BlockResult};
use crate::retry::{Backoff, BackoffPolicy};
use crate::rpc::ChainSource;
use crate::watermark::Watermark;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often scan progress is reported.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(15);

/// Fetch-ahead window as a multiple of the concurrency limit. Caps the
/// reorder buffer while the head-of-line block is stuck in retry.
const FETCH_AHEAD_FACTOR: usize = 4;

/// Ordered, restartable scanner over a block-number interval.
pub struct RangeScanner<C> {
    chain: String,
    processor: BlockProcessor<C>,
    watermark: Arc<Watermark>,
    out: mpsc::Sender<ChainEvent>,
    concurrency: usize,
    policy: BackoffPolicy,
    cancel: CancellationToken,
}

impl<C: ChainSource + 'static> RangeScanner<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: impl Into<String>,
        processor: BlockProcessor<C>,
        watermark: Arc<Watermark>,
        out: mpsc::Sender<ChainEvent>,
        concurrency: usize,
        policy: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chain: chain.into(),
            processor,
            watermark,
            out,
            concurrency: concurrency.max(1),
            policy,
            cancel,
        }
    }

    /// Scan `[start, end]`, emitting one BlockResult per block in ascending
    /// order. The watermark is advanced before each result is forwarded, so
    /// interrupting after block k and recommencing at k+1 reproduces the
    /// remainder exactly.
    pub async fn scan(&self, start: u64, end: u64) -> Result<()> {
        if start > end {
            return Ok(());
        }

        let total = end - start + 1;
        info!(
            chain = %self.chain,
            start,
            end,
            total,
            "scanning block range"
        );

        let mut tasks: JoinSet<(u64, Result<Option<BlockResult>, ProcessError>)> = JoinSet::new();
        let mut buffer: BTreeMap<u64, BlockResult> = BTreeMap::new();
        let mut next_fetch = start;
        let mut next_emit = start;
        let mut completed = 0u64;
        let started = Instant::now();
        let mut last_progress = started;

        let fetch_ahead = (self.concurrency * FETCH_AHEAD_FACTOR) as u64;

        loop {
            while tasks.len() < self.concurrency
                && next_fetch <= end
                && next_fetch < next_emit.saturating_add(fetch_ahead)
            {
                let processor = self.processor.clone();
                let policy = self.policy.clone();
                let cancel = self.cancel.clone();
                let number = next_fetch;
                tasks.spawn(async move {
                    let result = process_with_retry(&processor, number, &policy, &cancel).await;
                    (number, result)
                });
                next_fetch += 1;
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    info!(chain = %self.chain, "scan cancelled");
                    return Ok(());
                }
                joined = tasks.join_next() => {
                    let (number, result) = match joined {
                        Some(Ok(pair)) => pair,
                        Some(Err(e)) => return Err(e).context("scan worker panicked"),
                        None => break,
                    };
                    let result = result
                        .with_context(|| format!("chain {}: block {} failed to process", self.chain, number))?;
                    let Some(result) = result else {
                        // cancelled mid-retry
                        tasks.abort_all();
                        return Ok(());
                    };
                    buffer.insert(number, result);

                    // release the contiguous prefix in order
                    while let Some(result) = buffer.remove(&next_emit) {
                        self.watermark.advance(result.number);
                        let event = ChainEvent {
                            chain: self.chain.clone(),
                            result,
                        };
                        if self.out.send(event).await.is_err() {
                            debug!(chain = %self.chain, "result channel closed, stopping scan");
                            return Ok(());
                        }
                        next_emit += 1;
                        completed += 1;

                        if last_progress.elapsed() >= PROGRESS_INTERVAL {
                            log_progress(&self.chain, completed, total, started);
                            last_progress = Instant::now();
                        }
                    }
                }
            }
        }

        info!(
            chain = %self.chain,
            blocks = total,
            elapsed_secs = started.elapsed().as_secs(),
            "scan complete"
        );
        Ok(())
    }
}

/// Process one block, retrying transient failures under the backoff policy.
///
/// Returns `Ok(None)` if cancelled while waiting. Inconsistent blocks get
/// exactly one immediate retry; a recurrence surfaces the error so the block
/// fails loudly instead of being skipped.
pub(crate) async fn process_with_retry<C: ChainSource>(
    processor: &BlockProcessor<C>,
    number: u64,
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
) -> Result<Option<BlockResult>, ProcessError> {
    let mut backoff = Backoff::new(policy.clone());
    let mut inconsistent_retried = false;

    loop {
        match processor.process(number).await {
            Ok(result) => return Ok(Some(result)),
            Err(e) if e.is_inconsistency() => {
                if inconsistent_retried {
                    return Err(e);
                }
                warn!(block = number, error = %e, "inconsistent block data, retrying once");
                inconsistent_retried = true;
            }
            Err(ProcessError::Client(e)) if e.is_retryable() => {
                let Some(delay) = backoff.next_delay() else {
                    warn!(block = number, error = %e, "retry budget exhausted");
                    return Err(ProcessError::Client(e));
                };
                debug!(
                    block = number,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Ok(None),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn log_progress(chain: &str, completed: u64, total: u64, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    let percentage = completed as f64 / total as f64 * 100.0;
    let eta_secs = if completed > 0 {
        elapsed / completed as f64 * (total - completed) as f64
    } else {
        0.0
    };
    info!(
        chain = %chain,
        completed,
        total,
        "progress: {:.2}%, estimated {:.0}s remaining",
        percentage,
        eta_secs
    );
}
