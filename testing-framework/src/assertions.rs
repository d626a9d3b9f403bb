//! Ledger assertion helpers for integration testing
//!
//! Each helper returns `Err` with a descriptive message instead of
//! panicking, so tests read as a sequence of `?`-propagated checks.

use anyhow::{Context, Result};

use para_common::{
    crypto::Address,
    event::{EventMatcher, LedgerEvent},
    extrinsic::Receipt,
};

use crate::ledger::{storage, LedgerClient};

fn dump(receipt: &Receipt) -> String {
    serde_json::to_string_pretty(receipt).unwrap_or_else(|_| format!("{:?}", receipt))
}

/// Assert that account has expected free balance
///
/// # Errors
///
/// Returns an error if:
/// - The storage query fails
/// - Actual balance doesn't match expected
///
/// # Example
///
/// ```rust,ignore
/// assert_free_balance(&ledger, &bob, 5 * UNIT).await?;
/// ```
pub async fn assert_free_balance<C: LedgerClient + ?Sized>(
    client: &C,
    address: &Address,
    expected: u128,
) -> Result<()> {
    let actual = storage::free_balance(client, address)
        .await
        .with_context(|| format!("Failed to get balance for address {}", address))?;

    if actual != expected {
        anyhow::bail!(
            "Balance mismatch for address {}: expected {}, got {}",
            address,
            expected,
            actual
        );
    }

    Ok(())
}

/// Assert that free balance is within tolerance
///
/// Useful when fees make the exact value awkward to compute.
///
/// # Example
///
/// ```rust,ignore
/// // Allow for a few transaction fees
/// assert_free_balance_within(&ledger, &alith, expected, 5 * TRANSACTION_FEE).await?;
/// ```
pub async fn assert_free_balance_within<C: LedgerClient + ?Sized>(
    client: &C,
    address: &Address,
    expected: u128,
    tolerance: u128,
) -> Result<()> {
    let actual = storage::free_balance(client, address)
        .await
        .with_context(|| format!("Failed to get balance for address {}", address))?;

    let min = expected.saturating_sub(tolerance);
    let max = expected.saturating_add(tolerance);

    if actual < min || actual > max {
        anyhow::bail!(
            "Balance for address {} outside tolerance: expected {} ± {}, got {} (range: {}-{})",
            address,
            expected,
            tolerance,
            actual,
            min,
            max
        );
    }

    Ok(())
}

/// Assert that account has expected next nonce (pool included)
pub async fn assert_nonce<C: LedgerClient + ?Sized>(
    client: &C,
    address: &Address,
    expected: u32,
) -> Result<()> {
    let actual = client
        .get_account_nonce(address)
        .await
        .with_context(|| format!("Failed to get nonce for address {}", address))?;

    if actual != expected {
        anyhow::bail!(
            "Nonce mismatch for address {}: expected {}, got {}",
            address,
            expected,
            actual
        );
    }

    Ok(())
}

/// Assert that the ledger accepted and successfully applied the transaction.
pub fn assert_success(receipt: &Receipt) -> Result<()> {
    if !receipt.success {
        anyhow::bail!(
            "Extrinsic {} failed: {}\n{}",
            receipt.tx_hash,
            receipt
                .error
                .as_ref()
                .map_or_else(|| "unknown error".to_string(), ToString::to_string),
            dump(receipt)
        );
    }
    Ok(())
}

/// Assert that the transaction was rejected with `module.error`.
///
/// # Example
///
/// ```rust,ignore
/// assert_rejected_with(&outcome.receipt, "Multisig", "AlreadyApproved")?;
/// ```
pub fn assert_rejected_with(receipt: &Receipt, module: &str, error: &str) -> Result<()> {
    if receipt.success {
        anyhow::bail!(
            "Expected extrinsic {} to fail with {}.{}, but it succeeded",
            receipt.tx_hash,
            module,
            error
        );
    }
    if !receipt.is_rejected_with(module, error) {
        anyhow::bail!(
            "Expected {}.{} rejection, got {:?}\n{}",
            module,
            error,
            receipt.error,
            dump(receipt)
        );
    }
    Ok(())
}

/// Assert that the receipt carries an event matching `matcher`, and return it.
pub fn assert_event_in_receipt<'r>(
    receipt: &'r Receipt,
    matcher: &EventMatcher,
) -> Result<&'r LedgerEvent> {
    receipt
        .events
        .iter()
        .find(|e| matcher.matches(e))
        .with_context(|| format!("Event {} not found in receipt\n{}", matcher, dump(receipt)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use crate::ledger::{SubmitOptions, TestLedger, TestLedgerBuilder};
    use para_common::calls;
    use para_common::config::{ALITH_SECRET, TRANSACTION_FEE, UNIT};
    use para_common::crypto::KeyPair;

    fn alith() -> KeyPair {
        KeyPair::from_secret_hex(ALITH_SECRET).unwrap()
    }

    async fn create_test_ledger() -> TestLedger {
        TestLedgerBuilder::new()
            .with_default_balance(10 * UNIT)
            .with_dev_accounts()
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_assert_free_balance() {
        let ledger = create_test_ledger().await;
        let who = alith().address();
        assert!(assert_free_balance(&ledger, &who, 10 * UNIT).await.is_ok());
        let err = assert_free_balance(&ledger, &who, UNIT).await.unwrap_err();
        assert!(err.to_string().contains("Balance mismatch"));
    }

    #[tokio::test]
    async fn test_assert_free_balance_within() {
        let ledger = create_test_ledger().await;
        let who = alith().address();
        assert!(assert_free_balance_within(&ledger, &who, 10 * UNIT - 5, 10).await.is_ok());
        assert!(assert_free_balance_within(&ledger, &who, 9 * UNIT, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_receipt_assertions() {
        let ledger = create_test_ledger().await;
        let bob = Address::new([0xB0; 20]);

        let ok = ledger
            .submit_signed(
                calls::transfer_allow_death(bob, UNIT),
                &alith(),
                SubmitOptions::default(),
            )
            .await
            .unwrap();
        assert_success(&ok).unwrap();
        assert!(assert_rejected_with(&ok, "Balances", "InsufficientBalance").is_err());

        let event = assert_event_in_receipt(
            &ok,
            &EventMatcher::new("Balances", "Transfer").field("to", bob),
        )
        .unwrap();
        assert_eq!(event.field("amount").and_then(|v| v.as_u128()), Some(UNIT));
        assert!(assert_event_in_receipt(&ok, &EventMatcher::new("Balances", "Burned")).is_err());

        assert_nonce(&ledger, &alith().address(), 1).await.unwrap();
        assert_free_balance(&ledger, &alith().address(), 9 * UNIT - TRANSACTION_FEE)
            .await
            .unwrap();
    }
}
