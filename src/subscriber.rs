//! Live head following
//!
//! Follows `newHeads` announcements for one chain and turns them into the
//! same ordered per-block results the range scanner produces. Announced
//! heads are only triggers: every block between the watermark and the head
//! is processed through the scanner, so missed announcements during a
//! disconnect become a backfill instead of a gap, and re-announced heads at
//! or below the watermark are dropped instead of reprocessed.

use crate::retry::{Backoff, BackoffPolicy};
use crate::rpc::ChainSource;
use crate::scanner::RangeScanner;
use crate::watermark::Watermark;
use crate::ws::{Head, HeadConnector, HeadStream};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a connection's head stream stopped yielding.
enum StreamEnd {
    /// Shutdown was requested; the subscriber is done.
    Stopped,
    /// The connection failed; reconnect after a backoff delay.
    Lost,
}

/// Follows live heads for one chain, reconnecting on connection loss.
pub struct LiveSubscriber<C, K> {
    chain: String,
    connector: K,
    scanner: RangeScanner<C>,
    watermark: Arc<Watermark>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
}

impl<C, K> LiveSubscriber<C, K>
where
    C: ChainSource + 'static,
    K: HeadConnector,
{
    pub fn new(
        chain: impl Into<String>,
        connector: K,
        scanner: RangeScanner<C>,
        watermark: Arc<Watermark>,
        policy: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            chain: chain.into(),
            connector,
            scanner,
            watermark,
            policy,
            cancel,
        }
    }

    /// Run until shutdown. Returns an error only when the chain cannot make
    /// progress: the reconnect budget is exhausted, or a block repeatedly
    /// fails to process.
    pub async fn run(&self) -> Result<()> {
        let mut backoff = Backoff::new(self.policy.clone());

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                c = self.connector.connect() => c,
            };

            match connected {
                Ok(mut stream) => {
                    info!(chain = %self.chain, "head stream connected");
                    match self.stream_heads(&mut stream, &mut backoff).await? {
                        StreamEnd::Stopped => return Ok(()),
                        StreamEnd::Lost => {}
                    }
                }
                Err(e) => {
                    warn!(chain = %self.chain, error = %e, "head stream connect failed");
                }
            }

            let Some(delay) = backoff.next_delay() else {
                bail!(
                    "chain {}: reconnect budget exhausted after {} consecutive failures",
                    self.chain,
                    backoff.failures()
                );
            };
            debug!(
                chain = %self.chain,
                delay_ms = delay.as_millis() as u64,
                "reconnecting after delay"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// Consume heads from one connection until it fails or shutdown is
    /// requested. Processing errors are fatal and propagate; connection
    /// errors end the stream for reconnection.
    async fn stream_heads<S: HeadStream>(
        &self,
        stream: &mut S,
        backoff: &mut Backoff,
    ) -> Result<StreamEnd> {
        loop {
            let head = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(StreamEnd::Stopped),
                next = stream.next_head() => match next {
                    Ok(head) => head,
                    Err(e) => {
                        warn!(chain = %self.chain, error = %e, "head stream lost");
                        return Ok(StreamEnd::Lost);
                    }
                },
            };

            if self.handle_head(head).await? {
                backoff.reset();
            }

            if self.cancel.is_cancelled() {
                return Ok(StreamEnd::Stopped);
            }
        }
    }

    /// Process everything from the watermark up to the announced head.
    /// Returns false when the head was a duplicate and nothing ran.
    async fn handle_head(&self, head: Head) -> Result<bool> {
        let start = match self.watermark.get() {
            Some(mark) if head.number <= mark => {
                debug!(
                    chain = %self.chain,
                    head = head.number,
                    mark,
                    "duplicate head, already processed"
                );
                return Ok(false);
            }
            Some(mark) => {
                if head.number > mark + 1 {
                    info!(
                        chain = %self.chain,
                        from = mark + 1,
                        to = head.number - 1,
                        "backfilling missed blocks before head"
                    );
                }
                mark + 1
            }
            // First head observed on an unseeded chain; start there.
            None => {
                info!(chain = %self.chain, head = head.number, "first head observed");
                head.number
            }
        };

        self.scanner.scan(start, head.number).await?;
        Ok(true)
    }
}
