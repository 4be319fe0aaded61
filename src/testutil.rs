//! In-memory chain source and fixture builders for tests.

use crate::error::ClientError;
use crate::rpc::ChainSource;
use crate::types::{Block, Log, Receipt, Transaction};
use alloy_primitives::{address, Address, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub const WATCHED: Address = address!("0000000000deadbeef00112233445566778899aa");
pub const TOKEN: Address = address!("82af49447d8a07e3bd95bd0d56f35241523fbab1");
pub const STRANGER: Address = address!("389938cf14be379217570d8e4619e51fbdafaa21");

const TRANSFER_SIG: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Everything the chain source returns for one block.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub block: Block,
    pub receipts: Vec<Receipt>,
    pub logs: Vec<Log>,
}

/// Deterministic in-memory chain with optional transient-failure injection.
pub struct MockChain {
    data: HashMap<u64, BlockData>,
    // remaining connectivity failures to inject per block number
    failures: Mutex<HashMap<u64, u32>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&mut self, data: BlockData) {
        self.data.insert(data.block.number, data);
    }

    /// Make the next `times` fetches of `number` fail with a connectivity error.
    pub fn fail_times(&self, number: u64, times: u32) {
        self.failures.lock().unwrap().insert(number, times);
    }

    fn maybe_fail(&self, number: u64) -> Result<(), ClientError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::Connectivity(format!(
                    "injected failure for block {}",
                    number
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block(&self, number: u64) -> Result<Block, ClientError> {
        self.maybe_fail(number)?;
        self.data
            .get(&number)
            .map(|d| d.block.clone())
            .ok_or(ClientError::NotFound(number))
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<Receipt>, ClientError> {
        self.data
            .get(&number)
            .map(|d| d.receipts.clone())
            .ok_or(ClientError::NotFound(number))
    }

    async fn logs(&self, number: u64, address: Option<Address>) -> Result<Vec<Log>, ClientError> {
        let data = self.data.get(&number).ok_or(ClientError::NotFound(number))?;
        Ok(data
            .logs
            .iter()
            .filter(|l| address.map_or(true, |a| l.address == a))
            .cloned()
            .collect())
    }
}

/// Deterministic per-block hash.
pub fn block_hash(number: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&number.to_be_bytes());
    bytes[31] = 0xbb;
    B256::from(bytes)
}

/// Deterministic per-transaction hash.
pub fn tx_hash(block: u64, index: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&block.to_be_bytes());
    bytes[31] = index;
    B256::from(bytes)
}

fn address_topic(addr: Address) -> String {
    format!("0x000000000000000000000000{}", hex::encode(addr))
}

/// Build a canonical Transfer log.
pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
    tx: B256,
    log_index: u64,
) -> Log {
    Log {
        address: token,
        topics: vec![
            TRANSFER_SIG.to_string(),
            address_topic(from),
            address_topic(to),
        ],
        data: amount.to_be_bytes::<32>().to_vec(),
        log_index: Some(log_index),
        transaction_hash: Some(tx),
    }
}

fn make_tx(block: u64, index: u8, from: Address, to: Address) -> Transaction {
    Transaction {
        hash: tx_hash(block, index),
        from,
        to: Some(to),
        value: U256::ZERO,
        gas_price: Some(U256::from(50u64)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
    }
}

fn make_receipt(block: u64, index: u8, gas_used: u64, price: u64) -> Receipt {
    Receipt {
        transaction_hash: Some(tx_hash(block, index)),
        status: 1,
        gas_used: U256::from(gas_used),
        effective_gas_price: Some(U256::from(price)),
        logs: vec![],
    }
}

fn make_block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: block_hash(number),
        timestamp: 1_700_000_000 + number,
        base_fee_per_gas: None,
        transactions,
    }
}

/// A block with no transactions.
pub fn empty_block(number: u64) -> BlockData {
    BlockData {
        block: make_block(number, vec![]),
        receipts: vec![],
        logs: vec![],
    }
}

/// A block with one watched-sender transaction transferring `amount`
/// of the token out, 21000 gas at price 50.
pub fn block_with_outgoing(number: u64, amount: u64) -> BlockData {
    let tx = make_tx(number, 0, WATCHED, STRANGER);
    let log = transfer_log(
        TOKEN,
        WATCHED,
        STRANGER,
        U256::from(amount),
        tx.hash,
        0,
    );
    BlockData {
        block: make_block(number, vec![tx]),
        receipts: vec![make_receipt(number, 0, 21_000, 50)],
        logs: vec![log],
    }
}

/// A block with an outgoing watched tx (1000 out) followed by a stranger
/// tx that sends 2500 of the token to the watched address.
pub fn block_with_two_watched_txs(number: u64) -> BlockData {
    let tx0 = make_tx(number, 0, WATCHED, STRANGER);
    let tx1 = make_tx(number, 1, STRANGER, STRANGER);
    let logs = vec![
        transfer_log(TOKEN, WATCHED, STRANGER, U256::from(1_000u64), tx0.hash, 0),
        transfer_log(TOKEN, STRANGER, WATCHED, U256::from(2_500u64), tx1.hash, 1),
    ];
    BlockData {
        block: make_block(number, vec![tx0, tx1]),
        receipts: vec![
            make_receipt(number, 0, 21_000, 50),
            make_receipt(number, 1, 21_000, 50),
        ],
        logs,
    }
}
