//! Per-transaction P&L calculation
//!
//! Computes net token delta and gas cost for a relevant transaction,
//! producing a signed result in the token's smallest unit. Display
//! normalization by token decimals happens here too; decimals come from
//! configuration, never from an on-chain query.

use crate::decoder::TransferEvent;
use crate::types::{Receipt, Transaction};
use alloy_primitives::{Address, B256, I256, U256};

/// Deterministic P&L record for one relevant transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub tx_hash: B256,
    /// False when the transaction reverted. Gas is still charged.
    pub success: bool,
    /// Sum of transfer amounts received by the watched address.
    pub inflow: U256,
    /// Sum of transfer amounts sent by the watched address.
    pub outflow: U256,
    /// gas_used x effective gas price, zero unless the watched address sent the tx.
    pub gas_cost: U256,
    /// inflow - outflow - gas_cost, in the token's smallest unit.
    pub pnl: I256,
}

/// Compute the P&L record for one transaction.
pub fn compute(
    tx: &Transaction,
    receipt: &Receipt,
    base_fee_per_gas: Option<U256>,
    transfers: &[TransferEvent],
    watched: Address,
) -> TxResult {
    let mut inflow = U256::ZERO;
    let mut outflow = U256::ZERO;

    for event in transfers {
        if event.to == watched {
            inflow = inflow.saturating_add(event.amount);
        }
        if event.from == watched {
            outflow = outflow.saturating_add(event.amount);
        }
    }

    // Only the sender pays gas.
    let gas_cost = if tx.from == watched {
        let price = effective_gas_price(tx, receipt, base_fee_per_gas);
        receipt.gas_used.saturating_mul(price)
    } else {
        U256::ZERO
    };

    let pnl = to_signed(inflow)
        .saturating_sub(to_signed(outflow))
        .saturating_sub(to_signed(gas_cost));

    TxResult {
        tx_hash: tx.hash,
        success: receipt.is_success(),
        inflow,
        outflow,
        gas_cost,
        pnl,
    }
}

/// Determine the effective gas price for a transaction.
///
/// Priority order:
/// 1. `effectiveGasPrice` from the receipt (post-London, most accurate)
/// 2. `gasPrice` for legacy transactions
/// 3. EIP-1559: `min(max_fee, base_fee + max_priority_fee)`
pub fn effective_gas_price(
    tx: &Transaction,
    receipt: &Receipt,
    base_fee_per_gas: Option<U256>,
) -> U256 {
    if let Some(egp) = receipt.effective_gas_price {
        return egp;
    }

    if tx.is_legacy() {
        return tx.gas_price.unwrap_or(U256::ZERO);
    }

    if tx.is_eip1559() {
        let base_fee = base_fee_per_gas.unwrap_or(U256::ZERO);
        let max_fee = tx.max_fee_per_gas.unwrap_or(U256::ZERO);
        let max_priority_fee = tx.max_priority_fee_per_gas.unwrap_or(U256::ZERO);
        let calculated = base_fee.saturating_add(max_priority_fee);
        return if calculated > max_fee { max_fee } else { calculated };
    }

    U256::ZERO
}

fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// Format a smallest-unit value as a decimal token amount with six
/// fractional digits, e.g. `-2.050000`.
pub fn format_units(value: I256, decimals: u8) -> String {
    let negative = value.is_negative();
    let abs = value.unsigned_abs();

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let integer = abs / divisor;
    let fraction = abs % divisor;

    let fraction6 = if decimals >= 6 {
        fraction / U256::from(10u64).pow(U256::from(decimals - 6))
    } else {
        fraction * U256::from(10u64).pow(U256::from(6 - decimals))
    };

    format!(
        "{}{}.{:06}",
        if negative { "-" } else { "" },
        integer,
        fraction6.to::<u64>()
    )
}

/// Format an unsigned smallest-unit value (inflow/outflow/gas displays).
pub fn format_units_unsigned(value: U256, decimals: u8) -> String {
    format_units(to_signed(value), decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    const WATCHED: Address = address!("0000000000deadbeef00112233445566778899aa");
    const STRANGER: Address = address!("389938cf14be379217570d8e4619e51fbdafaa21");
    const TOKEN: Address = address!("82af49447d8a07e3bd95bd0d56f35241523fbab1");

    const TX_HASH: B256 =
        b256!("befc153d4cf017b1579a17af23bb27d543c58cbd37b3b3dd196dc044292f6336");

    fn make_tx(from: Address) -> Transaction {
        Transaction {
            hash: TX_HASH,
            from,
            to: Some(STRANGER),
            value: U256::ZERO,
            gas_price: None,
            max_fee_per_gas: Some(U256::from(100u64)),
            max_priority_fee_per_gas: Some(U256::from(2u64)),
        }
    }

    fn make_receipt(status: u64, gas_used: u64, egp: Option<u64>) -> Receipt {
        Receipt {
            transaction_hash: Some(TX_HASH),
            status,
            gas_used: U256::from(gas_used),
            effective_gas_price: egp.map(U256::from),
            logs: vec![],
        }
    }

    fn transfer(from: Address, to: Address, amount: u64) -> TransferEvent {
        TransferEvent {
            token: TOKEN,
            from,
            to,
            amount: U256::from(amount),
            log_index: 0,
        }
    }

    #[test]
    fn test_outflow_with_gas() {
        // Worked example: sender watched, 21000 gas at price 50,
        // one outgoing transfer of 1,000,000 units
        let tx = make_tx(WATCHED);
        let receipt = make_receipt(1, 21_000, Some(50));
        let transfers = vec![transfer(WATCHED, STRANGER, 1_000_000)];

        let result = compute(&tx, &receipt, None, &transfers, WATCHED);
        assert_eq!(result.inflow, U256::ZERO);
        assert_eq!(result.outflow, U256::from(1_000_000u64));
        assert_eq!(result.gas_cost, U256::from(1_050_000u64));
        assert_eq!(result.pnl, I256::try_from(-2_050_000i64).unwrap());
        assert!(result.success);
    }

    #[test]
    fn test_inflow_no_gas_for_recipient() {
        // Watched address receives tokens but did not send the tx
        let tx = make_tx(STRANGER);
        let receipt = make_receipt(1, 21_000, Some(50));
        let transfers = vec![transfer(STRANGER, WATCHED, 500_000)];

        let result = compute(&tx, &receipt, None, &transfers, WATCHED);
        assert_eq!(result.inflow, U256::from(500_000u64));
        assert_eq!(result.gas_cost, U256::ZERO);
        assert_eq!(result.pnl, I256::try_from(500_000i64).unwrap());
    }

    #[test]
    fn test_reverted_tx_still_pays_gas() {
        let tx = make_tx(WATCHED);
        let receipt = make_receipt(0, 21_000, Some(50));

        let result = compute(&tx, &receipt, None, &[], WATCHED);
        assert!(!result.success);
        assert_eq!(result.pnl, I256::try_from(-1_050_000i64).unwrap());
    }

    #[test]
    fn test_self_transfer_nets_to_gas_only() {
        let tx = make_tx(WATCHED);
        let receipt = make_receipt(1, 21_000, Some(50));
        let transfers = vec![transfer(WATCHED, WATCHED, 777)];

        let result = compute(&tx, &receipt, None, &transfers, WATCHED);
        assert_eq!(result.inflow, U256::from(777u64));
        assert_eq!(result.outflow, U256::from(777u64));
        assert_eq!(result.pnl, I256::try_from(-1_050_000i64).unwrap());
    }

    #[test]
    fn test_effective_gas_price_receipt_priority() {
        let tx = make_tx(WATCHED);
        let receipt = make_receipt(1, 21_000, Some(15));
        assert_eq!(
            effective_gas_price(&tx, &receipt, Some(U256::from(10u64))),
            U256::from(15u64)
        );
    }

    #[test]
    fn test_effective_gas_price_eip1559_fallback() {
        let tx = make_tx(WATCHED);
        let receipt = make_receipt(1, 21_000, None);
        // min(max_fee=100, base 10 + priority 2) = 12
        assert_eq!(
            effective_gas_price(&tx, &receipt, Some(U256::from(10u64))),
            U256::from(12u64)
        );
        // min(max_fee=100, base 120 + priority 2) = 100, capped
        assert_eq!(
            effective_gas_price(&tx, &receipt, Some(U256::from(120u64))),
            U256::from(100u64)
        );
    }

    #[test]
    fn test_effective_gas_price_legacy_fallback() {
        let mut tx = make_tx(WATCHED);
        tx.max_fee_per_gas = None;
        tx.max_priority_fee_per_gas = None;
        tx.gas_price = Some(U256::from(20u64));
        let receipt = make_receipt(1, 21_000, None);
        assert_eq!(effective_gas_price(&tx, &receipt, None), U256::from(20u64));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(
            format_units(I256::try_from(-2_050_000i64).unwrap(), 6),
            "-2.050000"
        );
        assert_eq!(
            format_units(I256::try_from(1_500_000_000_000_000_000i64).unwrap(), 18),
            "1.500000"
        );
        assert_eq!(format_units(I256::ZERO, 18), "0.000000");
        // Fewer decimals than display precision
        assert_eq!(format_units(I256::try_from(5i64).unwrap(), 2), "0.050000");
    }
}
