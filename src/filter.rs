//! Relevant-transaction selection
//!
//! Picks out the transactions in a block that involve the watched address,
//! either directly (tx sender/recipient) or as a counterparty of a decoded
//! Transfer of the watched token. Block order is preserved.

use crate::decoder::TransferEvent;
use crate::types::Transaction;
use alloy_primitives::{Address, B256};
use std::collections::HashMap;

/// Select relevant transactions, in ascending transaction-index order.
///
/// Returns `(index into transactions, transfers of that tx)` pairs. The
/// transfer list of a relevant transaction may be empty (plain native
/// transfer touching the watched address).
pub fn select(
    watched: Address,
    token: Address,
    transactions: &[Transaction],
    transfers_by_tx: &HashMap<B256, Vec<TransferEvent>>,
) -> Vec<(usize, Vec<TransferEvent>)> {
    let mut relevant = Vec::new();

    for (index, tx) in transactions.iter().enumerate() {
        let transfers: Vec<TransferEvent> = transfers_by_tx
            .get(&tx.hash)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.token == token)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let direct = tx.from == watched || tx.to == Some(watched);
        let via_transfer = transfers
            .iter()
            .any(|e| e.from == watched || e.to == watched);

        if direct || via_transfer {
            relevant.push((index, transfers));
        }
    }

    relevant
}
