//! Error taxonomy for the ingestion engine
//!
//! Components surface typed errors at their seams; the drivers
//! (range scanner, live subscriber) decide whether to retry or escalate.

use thiserror::Error;

/// Errors produced by the chain client (HTTP RPC and WebSocket subscription).
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transient network or connection failure. Retried with backoff by the caller.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The requested block is not available on the node (yet).
    #[error("block {0} not found")]
    NotFound(u64),

    /// Provider throttling (HTTP 429 or JSON-RPC rate-limit code).
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// The node answered, but with a JSON-RPC error or an unparseable result.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ClientError {
    /// Whether the caller may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connectivity(_) | ClientError::RateLimit(_) | ClientError::NotFound(_)
        )
    }
}

/// A log whose topic0 matched the Transfer signature but whose layout is
/// inconsistent with `Transfer(address,address,uint256)`. Logged and
/// skipped, never fatal to block processing.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("transfer log has {0} topics, expected 3")]
    MissingTopics(usize),

    #[error("transfer topic is not a 32-byte word: {0}")]
    BadTopic(String),

    #[error("transfer data is {0} bytes, expected at least 32")]
    TruncatedData(usize),
}

/// Errors surfaced by the block processor to its driver.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Receipt count does not match transaction count. The driver retries
    /// the block once; a second occurrence makes the block fail loudly
    /// instead of being skipped.
    #[error("block {block}: {txs} transactions but {receipts} receipts")]
    Inconsistent {
        block: u64,
        txs: usize,
        receipts: usize,
    },

    /// A receipt does not reference the transaction at the same position,
    /// so positional pairing would misattribute gas. Same retry treatment
    /// as a count mismatch.
    #[error("block {block}: receipt {index} does not match the transaction at that position")]
    Misordered { block: u64, index: usize },
}

impl ProcessError {
    /// Whether this error reports contradictory node responses, which the
    /// driver retries once before surfacing.
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            ProcessError::Inconsistent { .. } | ProcessError::Misordered { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Connectivity("reset".into()).is_retryable());
        assert!(ClientError::RateLimit("429".into()).is_retryable());
        assert!(ClientError::NotFound(7).is_retryable());
        assert!(!ClientError::Rpc("bad params".into()).is_retryable());
    }

    #[test]
    fn test_process_error_wraps_client() {
        let e: ProcessError = ClientError::NotFound(12).into();
        assert!(matches!(e, ProcessError::Client(ClientError::NotFound(12))));
    }

    #[test]
    fn test_inconsistency_classification() {
        assert!(ProcessError::Inconsistent {
            block: 1,
            txs: 2,
            receipts: 1
        }
        .is_inconsistency());
        assert!(ProcessError::Misordered { block: 1, index: 0 }.is_inconsistency());
        assert!(!ProcessError::Client(ClientError::NotFound(1)).is_inconsistency());
    }
}
