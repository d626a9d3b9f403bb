// Integration tests for BatchBuilder against the in-process ledger.
// Covers atomic rollback, best-effort prefixes and the asset setup flow.

#![allow(clippy::disallowed_methods)]

use anyhow::Result;
use para_common::extrinsic::TokenError;
use para_testing_framework::prelude::*;

const ASSET_ID: u128 = 42;

struct Setup {
    ledger: TestLedger,
    dev: DevAccounts,
}

async fn setup() -> Result<Setup> {
    let _ = env_logger::builder().is_test(true).try_init();
    let ledger = TestLedgerBuilder::new()
        .with_dev_accounts()
        .build()
        .await?;
    Ok(Setup {
        ledger,
        dev: DevAccounts::load()?,
    })
}

fn builder(setup: &Setup) -> BatchBuilder {
    BatchBuilder::new(Arc::new(setup.ledger.clone()), setup.dev.alith.clone())
}

#[tokio::test]
async fn test_atomic_asset_setup() -> Result<()> {
    let setup = setup().await?;
    let alith = setup.dev.alith.address();
    let bob = setup.dev.baltathar.address();

    let mut batch = builder(&setup);
    batch.append(calls::asset_create(ASSET_ID, alith, 1))?;
    batch.append(calls::asset_mint(ASSET_ID, alith, 1_000))?;
    batch.append(calls::asset_transfer(ASSET_ID, bob, 250))?;

    let receipt = batch.execute(BatchMode::Atomic).await?;
    assert_success(&receipt)?;
    assert!(receipt.has_event("Utility", "BatchCompleted"));
    assert_event_in_receipt(
        &receipt,
        &EventMatcher::new("Assets", "Issued").field("owner", alith),
    )?;

    assert_eq!(storage::asset_balance(&setup.ledger, ASSET_ID, &alith).await?, 750);
    assert_eq!(storage::asset_balance(&setup.ledger, ASSET_ID, &bob).await?, 250);
    Ok(())
}

#[tokio::test]
async fn test_asset_supply_overflow_is_rejected() -> Result<()> {
    let setup = setup().await?;
    let alith = setup.dev.alith.address();

    let mut batch = builder(&setup);
    batch.append(calls::asset_create(9, alith, 1))?;
    batch.append(calls::asset_mint(9, alith, u128::MAX))?;
    assert_success(&batch.execute(BatchMode::Atomic).await?)?;

    let mut batch = builder(&setup);
    batch.append(calls::asset_mint(9, alith, 1))?;
    let receipt = batch.execute(BatchMode::Atomic).await?;
    assert!(!receipt.success);
    assert!(receipt.block.is_some());
    assert_eq!(
        receipt.error,
        Some(Rejection::Dispatch(DispatchError::Other(
            "Arithmetic overflow".to_string()
        )))
    );
    assert_eq!(storage::asset_balance(&setup.ledger, 9, &alith).await?, u128::MAX);
    Ok(())
}

#[tokio::test]
async fn test_atomic_failure_reverts_every_call() -> Result<()> {
    let setup = setup().await?;
    let alith = setup.dev.alith.address();
    let charleth = setup.dev.charleth.address();
    let alith_before = storage::free_balance(&setup.ledger, &alith).await?;
    let charleth_before = storage::free_balance(&setup.ledger, &charleth).await?;

    let mut batch = builder(&setup);
    batch.append(calls::transfer_allow_death(charleth, UNIT))?;
    batch.append(calls::transfer_allow_death(charleth, 1_000_000 * UNIT))?;

    let receipt = batch.execute(BatchMode::Atomic).await?;
    assert!(!receipt.success);
    assert_eq!(
        receipt.error,
        Some(Rejection::Dispatch(DispatchError::Token(TokenError::FundsUnavailable)))
    );
    // Included, so the fee is charged, but no transfer took effect
    assert!(receipt.block.is_some());
    assert_free_balance(&setup.ledger, &charleth, charleth_before).await?;
    assert_free_balance(&setup.ledger, &alith, alith_before - TRANSACTION_FEE).await?;
    assert!(!receipt.has_event("Balances", "Transfer"));
    Ok(())
}

#[tokio::test]
async fn test_best_effort_keeps_prefix() -> Result<()> {
    let setup = setup().await?;
    let charleth = setup.dev.charleth.address();
    let charleth_before = storage::free_balance(&setup.ledger, &charleth).await?;

    let mut batch = builder(&setup);
    batch.append(calls::transfer_allow_death(charleth, UNIT))?;
    batch.append(calls::transfer_allow_death(charleth, 2 * UNIT))?;
    batch.append(calls::transfer_allow_death(charleth, 1_000_000 * UNIT))?;
    batch.append(calls::transfer_allow_death(charleth, 4 * UNIT))?;

    let receipt = batch.execute(BatchMode::BestEffort).await?;
    assert!(!receipt.success);
    match &receipt.error {
        Some(Rejection::BatchInterrupted { index, error }) => {
            assert_eq!(*index, 2);
            assert_eq!(*error, DispatchError::Token(TokenError::FundsUnavailable));
        }
        other => panic!("expected an interrupted batch, got {:?}", other),
    }

    // Calls 0 and 1 stay applied, call 3 never ran
    assert_free_balance(&setup.ledger, &charleth, charleth_before + 3 * UNIT).await?;
    let completed = receipt
        .events
        .iter()
        .filter(|e| e.is("Utility", "ItemCompleted"))
        .count();
    assert_eq!(completed, 2);
    Ok(())
}

#[tokio::test]
async fn test_best_effort_without_failure_succeeds() -> Result<()> {
    let setup = setup().await?;
    let mut batch = builder(&setup);
    batch.append(calls::remark_with_event(b"a".to_vec()))?;
    batch.append(calls::remark_with_event(b"b".to_vec()))?;

    let receipt = batch.execute(BatchMode::BestEffort).await?;
    assert_success(&receipt)?;
    assert!(receipt.error.is_none());
    assert!(receipt.has_event("Utility", "BatchCompleted"));
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_is_a_valid_extrinsic() -> Result<()> {
    let setup = setup().await?;
    let mut batch = builder(&setup);
    assert!(batch.is_empty());

    let receipt = batch.execute(BatchMode::Atomic).await?;
    assert_success(&receipt)?;
    assert_nonce(&setup.ledger, &setup.dev.alith.address(), 1).await?;
    Ok(())
}

#[tokio::test]
async fn test_pooled_batch_lands_in_next_block() -> Result<()> {
    let setup = setup().await?;
    let bob = setup.dev.baltathar.address();
    let bob_before = storage::free_balance(&setup.ledger, &bob).await?;

    let mut batch = builder(&setup).with_options(SubmitOptions {
        wait_for_inclusion: false,
        ..SubmitOptions::default()
    });
    batch.append(calls::transfer_keep_alive(bob, UNIT))?;
    let receipt = batch.execute(BatchMode::Atomic).await?;
    assert!(receipt.success);
    assert!(receipt.block.is_none());
    assert_eq!(setup.ledger.pool_len().await, 1);

    // Nothing applied until a block is sealed
    assert_free_balance(&setup.ledger, &bob, bob_before).await?;
    let height = setup.ledger.seal_block().await?;
    assert_eq!(setup.ledger.pool_len().await, 0);
    assert_free_balance(&setup.ledger, &bob, bob_before + UNIT).await?;

    let events = setup.ledger.get_events(height).await?;
    assert!(events
        .iter()
        .any(|e| e.is("Utility", "BatchCompleted") && e.extrinsic_index == Some(1)));
    Ok(())
}

#[tokio::test]
async fn test_single_use_refuses_second_execution() -> Result<()> {
    let setup = setup().await?;
    let mut batch = builder(&setup).single_use();
    batch.append(calls::remark(b"once".to_vec()))?;
    assert_success(&batch.execute(BatchMode::Atomic).await?)?;

    assert_eq!(
        batch.append(calls::remark(b"twice".to_vec())),
        Err(BatchError::AlreadyExecuted)
    );
    let err = batch.execute(BatchMode::Atomic).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<BatchError>(),
        Some(&BatchError::AlreadyExecuted)
    );
    Ok(())
}
