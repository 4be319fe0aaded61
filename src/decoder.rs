//! ERC20 Transfer log decoding
//!
//! Turns raw log entries into typed Transfer records. Logs whose topic0
//! is not the Transfer signature are not an error; logs that claim to be
//! Transfers but have a malformed layout are.

use crate::error::DecodeError;
use crate::types::Log;
use alloy_primitives::{Address, U256};

/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: [u8; 32] = [
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d,
    0xaa, 0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23,
    0xb3, 0xef,
];

/// A decoded ERC20 Transfer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Token contract that emitted the event.
    pub token: Address,
    pub from: Address,
    pub to: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// Position of the log within its block, orders transfers within a tx.
    pub log_index: u64,
}

/// Decode a raw log into a Transfer event.
///
/// Returns `Ok(None)` when topic0 does not match the Transfer signature,
/// `Err(DecodeError)` when it matches but the topic/data layout is
/// inconsistent with `Transfer(address,address,uint256)`.
pub fn decode(log: &Log) -> Result<Option<TransferEvent>, DecodeError> {
    if !is_transfer_topic(log) {
        return Ok(None);
    }

    if log.topics.len() < 3 {
        return Err(DecodeError::MissingTopics(log.topics.len()));
    }

    let from = parse_address_from_topic(&log.topics[1])?;
    let to = parse_address_from_topic(&log.topics[2])?;

    if log.data.len() < 32 {
        return Err(DecodeError::TruncatedData(log.data.len()));
    }
    let amount = U256::from_be_slice(&log.data[0..32]);

    Ok(Some(TransferEvent {
        token: log.address,
        from,
        to,
        amount,
        log_index: log.log_index.unwrap_or(0),
    }))
}

/// Check whether a log's topic0 is the ERC20 Transfer signature.
fn is_transfer_topic(log: &Log) -> bool {
    let Some(topic0) = log.topics.first() else {
        return false;
    };
    let topic0 = topic0.strip_prefix("0x").unwrap_or(topic0);
    if topic0.len() != 64 {
        return false;
    }
    let bytes = match hex::decode(topic0) {
        Ok(b) => b,
        Err(_) => return false,
    };
    bytes.as_slice() == TRANSFER_TOPIC
}

/// Parse a 32-byte hex topic into an Address (last 20 bytes).
fn parse_address_from_topic(topic: &str) -> Result<Address, DecodeError> {
    let s = topic.strip_prefix("0x").unwrap_or(topic);
    let bytes = hex::decode(s).map_err(|_| DecodeError::BadTopic(topic.to_string()))?;
    if bytes.len() != 32 {
        return Err(DecodeError::BadTopic(topic.to_string()));
    }
    Ok(Address::from_slice(&bytes[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_address;

    const TRANSFER_SIG: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

    fn weth() -> Address {
        parse_address("0x82af49447d8a07e3bd95bd0d56f35241523fbab1").unwrap()
    }

    fn transfer_log(topics: Vec<&str>, data: &str) -> Log {
        Log {
            address: weth(),
            topics: topics.into_iter().map(String::from).collect(),
            data: hex::decode(data.strip_prefix("0x").unwrap_or(data)).unwrap(),
            log_index: Some(3),
            transaction_hash: None,
        }
    }

    #[test]
    fn test_decode_canonical_transfer() {
        // Real Arbitrum WETH transfer layout
        let log = transfer_log(
            vec![
                TRANSFER_SIG,
                "0x000000000000000000000000389938cf14be379217570d8e4619e51fbdafaa21",
                "0x0000000000000000000000000000000000deadbeef00112233445566778899aa",
            ],
            "0x000000000000000000000000000000000000000000000000008bc909c5707ec5",
        );

        let event = decode(&log).unwrap().unwrap();
        assert_eq!(event.token, weth());
        assert_eq!(
            event.from,
            parse_address("0x389938cf14be379217570d8e4619e51fbdafaa21").unwrap()
        );
        assert_eq!(
            event.to,
            parse_address("0x0000000000deadbeef00112233445566778899aa").unwrap()
        );
        assert_eq!(event.amount, U256::from(0x8bc909c5707ec5u64));
        assert_eq!(event.log_index, 3);
    }

    #[test]
    fn test_non_transfer_topic_is_none() {
        // Some other event on the same contract, not an error
        let log = transfer_log(
            vec![
                "0x19b47279256b2a23a1665c810c8d55a1758940ee09377d4f8d26497a3577dc83",
                "0x0000000000000000000000000000000000deadbeef00112233445566778899aa",
                "0x000000000000000000000000aa89ba37d1975ae294974ebb33db9d4b5324f2f2",
            ],
            "0x00000000",
        );
        assert!(decode(&log).unwrap().is_none());
    }

    #[test]
    fn test_no_topics_is_none() {
        let log = Log {
            address: weth(),
            topics: vec![],
            data: vec![],
            log_index: None,
            transaction_hash: None,
        };
        assert!(decode(&log).unwrap().is_none());
    }

    #[test]
    fn test_missing_indexed_topics_is_error() {
        let log = transfer_log(vec![TRANSFER_SIG], "0x00");
        assert!(matches!(decode(&log), Err(DecodeError::MissingTopics(1))));
    }

    #[test]
    fn test_truncated_data_is_error() {
        let log = transfer_log(
            vec![
                TRANSFER_SIG,
                "0x000000000000000000000000389938cf14be379217570d8e4619e51fbdafaa21",
                "0x0000000000000000000000000000000000deadbeef00112233445566778899aa",
            ],
            "0x008bc909",
        );
        assert!(matches!(decode(&log), Err(DecodeError::TruncatedData(4))));
    }

    #[test]
    fn test_short_topic_is_error() {
        let log = transfer_log(
            vec![TRANSFER_SIG, "0xdeadbeef", "0xdeadbeef"],
            "0x000000000000000000000000000000000000000000000000008bc909c5707ec5",
        );
        assert!(matches!(decode(&log), Err(DecodeError::BadTopic(_))));
    }
}
