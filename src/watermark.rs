//! Per-chain processing cursor
//!
//! The watermark is the highest block number fully processed and committed
//! for one chain. It is the only state shared across retry and reconnect
//! boundaries: single writer (the chain's driver task), readable from
//! anywhere, seedable by the caller for external persistence.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically non-decreasing per-chain cursor.
///
/// Stored internally as `last + 1` so that zero can mean "unset"; block
/// zero is representable.
#[derive(Debug)]
pub struct Watermark {
    chain: String,
    next: AtomicU64,
}

impl Watermark {
    /// Create an unset watermark for a chain.
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            next: AtomicU64::new(0),
        }
    }

    /// Chain label this watermark belongs to.
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Last fully processed block number, if any block was processed.
    pub fn get(&self) -> Option<u64> {
        self.next.load(Ordering::SeqCst).checked_sub(1)
    }

    /// Seed the initial position, e.g. from externally persisted state.
    /// Equivalent to "block `number` has already been processed".
    pub fn seed(&self, number: u64) {
        self.advance(number);
    }

    /// Record that `number` is fully committed downstream.
    ///
    /// Never moves backwards; a lower number than the current position is
    /// a no-op, which makes duplicate-suppression after reconnects free.
    pub fn advance(&self, number: u64) {
        self.next.fetch_max(number + 1, Ordering::SeqCst);
    }
}
