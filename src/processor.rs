//! Per-block processing pipeline
//!
//! Fetches one block with its receipts and token logs, decodes transfers,
//! selects relevant transactions, and folds their P&L into a BlockResult.
//! Pure function of the block number for fixed chain state: reprocessing a
//! block yields an identical result, which is what makes retries and
//! gap-backfill safe.

use crate::decoder::{self, TransferEvent};
use crate::error::ProcessError;
use crate::filter;
use crate::pnl::{self, TxResult};
use crate::rpc::ChainSource;
use alloy_primitives::{Address, B256, I256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// P&L ledger entry for one processed block; the atomic unit of progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResult {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
    /// Results for transactions involving the watched address, in block order.
    pub txs: Vec<TxResult>,
    /// Sum of member tx pnl.
    pub block_pnl: I256,
}

impl BlockResult {
    /// Whether any member transaction reverted.
    pub fn has_failures(&self) -> bool {
        self.txs.iter().any(|t| !t.success)
    }
}

/// Orchestrates decode + filter + calculate for single blocks.
pub struct BlockProcessor<C> {
    source: Arc<C>,
    watched: Address,
    token: Address,
}

impl<C> Clone for BlockProcessor<C> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            watched: self.watched,
            token: self.token,
        }
    }
}

impl<C: ChainSource> BlockProcessor<C> {
    pub fn new(source: Arc<C>, watched: Address, token: Address) -> Self {
        Self {
            source,
            watched,
            token,
        }
    }

    /// Process one block into a BlockResult.
    ///
    /// Surfaces client errors and receipt/transaction count mismatches to
    /// the caller; malformed Transfer logs are logged and skipped without
    /// aborting the block.
    pub async fn process(&self, number: u64) -> Result<BlockResult, ProcessError> {
        let block = self.source.block(number).await?;
        let receipts = self.source.block_receipts(number).await?;

        if receipts.len() != block.transactions.len() {
            return Err(ProcessError::Inconsistent {
                block: number,
                txs: block.transactions.len(),
                receipts: receipts.len(),
            });
        }

        // Receipts pair with transactions by position; a receipt that names
        // a different transaction would silently misattribute gas.
        for (index, (tx, receipt)) in block.transactions.iter().zip(&receipts).enumerate() {
            if let Some(hash) = receipt.transaction_hash {
                if hash != tx.hash {
                    return Err(ProcessError::Misordered {
                        block: number,
                        index,
                    });
                }
            }
        }

        let logs = self.source.logs(number, Some(self.token)).await?;

        let mut transfers_by_tx: HashMap<B256, Vec<TransferEvent>> = HashMap::new();
        for log in &logs {
            match decoder::decode(log) {
                Ok(Some(event)) => match log.transaction_hash {
                    Some(tx_hash) => transfers_by_tx.entry(tx_hash).or_default().push(event),
                    None => {
                        warn!(block = number, "transfer log without transaction hash, skipping")
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(block = number, error = %e, "skipping malformed transfer log");
                }
            }
        }
        // logIndex order within each transaction
        for events in transfers_by_tx.values_mut() {
            events.sort_by_key(|e| e.log_index);
        }

        let relevant = filter::select(
            self.watched,
            self.token,
            &block.transactions,
            &transfers_by_tx,
        );

        let mut txs = Vec::with_capacity(relevant.len());
        let mut block_pnl = I256::ZERO;
        for (index, transfers) in relevant {
            let result = pnl::compute(
                &block.transactions[index],
                &receipts[index],
                block.base_fee_per_gas,
                &transfers,
                self.watched,
            );
            block_pnl = block_pnl.saturating_add(result.pnl);
            txs.push(result);
        }

        Ok(BlockResult {
            number: block.number,
            hash: block.hash,
            timestamp: block.timestamp,
            txs,
            block_pnl,
        })
    }
}
