//! mevwatch - multichain MEV bot P&L tracker
//!
//! This library ingests EVM blocks from historical ranges and live newHeads
//! streams, decodes ERC20 Transfer activity around a watched bot address,
//! and produces deterministic per-block profit-and-loss records with no
//! gaps or duplicates.

pub mod aggregator;
pub mod config;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod pnl;
pub mod processor;
pub mod retry;
pub mod rpc;
pub mod scanner;
pub mod subscriber;
pub mod types;
pub mod watermark;
pub mod ws;

#[cfg(test)]
pub mod testutil;

// Re-export the main types for convenience
pub use aggregator::{AggregationSnapshot, Aggregator, ChainEvent, ChainTotals};
pub use config::{ChainSpec, Config};
pub use error::{ClientError, DecodeError, ProcessError};
pub use processor::{BlockProcessor, BlockResult};
pub use rpc::{ChainClient, ChainSource};
pub use scanner::RangeScanner;
pub use subscriber::LiveSubscriber;
pub use watermark::Watermark;
