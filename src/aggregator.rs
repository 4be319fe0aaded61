//! Running P&L aggregation
//!
//! Folds BlockResults into per-chain totals and hands out periodic
//! snapshots to the reporting layer. Folding is associative and, across
//! chains, commutative; the final totals do not depend on arrival order.

use crate::pnl::{format_units, format_units_unsigned};
use crate::processor::BlockResult;
use alloy_primitives::{I256, U256};
use std::collections::BTreeMap;
use std::time::SystemTime;
use tracing::{error, info, warn};

/// A BlockResult tagged with the chain it came from.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub chain: String,
    pub result: BlockResult,
}

/// Accumulated totals for one chain within the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTotals {
    /// Blocks ingested, including blocks with no relevant transactions.
    pub blocks: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub total_pnl: I256,
    pub total_gas: U256,
}

impl Default for ChainTotals {
    fn default() -> Self {
        Self {
            blocks: 0,
            success_count: 0,
            fail_count: 0,
            total_pnl: I256::ZERO,
            total_gas: U256::ZERO,
        }
    }
}

impl ChainTotals {
    fn fold(&mut self, result: &BlockResult) {
        self.blocks += 1;
        for tx in &result.txs {
            if tx.success {
                self.success_count += 1;
            } else {
                self.fail_count += 1;
            }
            self.total_gas = self.total_gas.saturating_add(tx.gas_cost);
        }
        self.total_pnl = self.total_pnl.saturating_add(result.block_pnl);
    }
}

/// Snapshot of one reporting window, cleared from the aggregator on flush.
#[derive(Debug, Clone)]
pub struct AggregationSnapshot {
    pub window_start: SystemTime,
    pub window_end: SystemTime,
    pub per_chain: BTreeMap<String, ChainTotals>,
}

impl AggregationSnapshot {
    /// True when no block carried a relevant transaction this window.
    pub fn is_quiet(&self) -> bool {
        self.per_chain
            .values()
            .all(|t| t.success_count == 0 && t.fail_count == 0)
    }
}

/// Accumulates BlockResults between flushes. Owned exclusively by the
/// aggregation task; results arrive by value over a channel.
pub struct Aggregator {
    /// Token decimals per chain, for display only.
    decimals: BTreeMap<String, u8>,
    window_start: SystemTime,
    per_chain: BTreeMap<String, ChainTotals>,
}

impl Aggregator {
    pub fn new(decimals: BTreeMap<String, u8>) -> Self {
        Self {
            decimals,
            window_start: SystemTime::now(),
            per_chain: BTreeMap::new(),
        }
    }

    fn chain_decimals(&self, chain: &str) -> u8 {
        self.decimals.get(chain).copied().unwrap_or(18)
    }

    /// Fold one BlockResult into the current window, logging the block
    /// outcome when it involved the watched address.
    pub fn ingest(&mut self, event: &ChainEvent) {
        if !event.result.txs.is_empty() {
            self.log_block(event);
        }
        self.per_chain
            .entry(event.chain.clone())
            .or_default()
            .fold(&event.result);
    }

    /// Return the current window and reset to empty.
    pub fn flush(&mut self) -> AggregationSnapshot {
        let now = SystemTime::now();
        let snapshot = AggregationSnapshot {
            window_start: self.window_start,
            window_end: now,
            per_chain: std::mem::take(&mut self.per_chain),
        };
        self.window_start = now;
        snapshot
    }

    /// Log the window totals in token units. The external notifier consumes
    /// the snapshot value itself; this is the operator-facing trace.
    pub fn report(&self, snapshot: &AggregationSnapshot) {
        for (chain, totals) in &snapshot.per_chain {
            let decimals = self.chain_decimals(chain);
            let txs = totals.success_count + totals.fail_count;
            info!(
                chain = %chain,
                blocks = totals.blocks,
                "window total: {} ({} successful / {} txs, gas {})",
                format_units(totals.total_pnl, decimals),
                totals.success_count,
                txs,
                format_units_unsigned(totals.total_gas, decimals),
            );
        }
    }

    /// One leveled line per relevant block: warn when a member tx failed,
    /// error when the block lost value, info otherwise.
    fn log_block(&self, event: &ChainEvent) {
        let result = &event.result;
        let decimals = self.chain_decimals(&event.chain);

        let hashes = result
            .txs
            .iter()
            .map(|t| format!("0x{:x}", t.tx_hash))
            .collect::<Vec<_>>()
            .join(", ");
        let inflow: U256 = result
            .txs
            .iter()
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.inflow));
        let outflow: U256 = result
            .txs
            .iter()
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.outflow));
        let gas: U256 = result
            .txs
            .iter()
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.gas_cost));

        let summary = format!(
            "block {}: txs [{}], in {}, out {}, gas {}, net {}",
            result.number,
            hashes,
            format_units_unsigned(inflow, decimals),
            format_units_unsigned(outflow, decimals),
            format_units_unsigned(gas, decimals),
            format_units(result.block_pnl, decimals),
        );

        if result.has_failures() {
            warn!(chain = %event.chain, "{}", summary);
        } else if result.block_pnl.is_negative() {
            error!(chain = %event.chain, "{}", summary);
        } else {
            info!(chain = %event.chain, "{}", summary);
        }
    }
}
