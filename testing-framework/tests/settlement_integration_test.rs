// Integration tests for SettlementWatcher: cross-chain transfers between two
// sibling ledgers on a shared paused clock.

#![allow(clippy::disallowed_methods)]

use anyhow::Result;
use para_testing_framework::prelude::*;

const ORIGIN_PARA: u32 = 1000;
const DEST_PARA: u32 = 2000;
const BLOCK_TIME: Duration = Duration::from_secs(12);

struct Siblings {
    clock: Arc<PausedClock>,
    origin: TestLedger,
    dest: Arc<dyn LedgerClient>,
    dev: DevAccounts,
}

/// Origin seals on submission only; the destination produces a block every
/// `dest_block_time` (never when `None`).
async fn siblings(dest_block_time: Option<Duration>, delivery_delay: u32) -> Result<Siblings> {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(PausedClock::new());

    let origin = TestLedgerBuilder::new()
        .with_clock(clock.clone())
        .with_para_id(ORIGIN_PARA)
        .with_dev_accounts()
        .build()
        .await?;

    let mut dest = TestLedgerBuilder::new()
        .with_clock(clock.clone())
        .with_para_id(DEST_PARA)
        .with_xcm_delivery_delay(delivery_delay)
        .sibling_of(&origin);
    if let Some(block_time) = dest_block_time {
        dest = dest.with_block_time(block_time);
    }
    let dest = dest.build().await?;

    Ok(Siblings {
        clock,
        origin,
        dest: Arc::new(dest),
        dev: DevAccounts::load()?,
    })
}

impl Siblings {
    fn watcher(&self, policy: SettlementPolicy) -> SettlementWatcher {
        SettlementWatcher::new(self.dest.clone(), self.clock.clone(), policy)
    }

    /// Send `amount` to `beneficiary` on the destination, returning the
    /// message hash.
    async fn send(&self, beneficiary: Address, amount: u128) -> Result<Value> {
        let receipt = self
            .origin
            .submit_signed(
                calls::xtokens_transfer(DEST_PARA, beneficiary, amount),
                &self.dev.alith,
                SubmitOptions::default(),
            )
            .await?;
        assert_success(&receipt)?;
        let sent = assert_event_in_receipt(
            &receipt,
            &EventMatcher::new("XcmpQueue", "XcmpMessageSent"),
        )?;
        Ok(sent
            .field("message_hash")
            .cloned()
            .expect("message hash"))
    }
}

#[tokio::test]
async fn test_cross_chain_transfer_settles_on_next_block() -> Result<()> {
    let siblings = siblings(Some(BLOCK_TIME), 1).await?;
    let bob = siblings.dev.baltathar.address();
    let watcher = siblings.watcher(SettlementPolicy::from_blocks(10, 1, BLOCK_TIME / 2));

    let query = SettlementQuery::capture(
        "bob's balance on the destination",
        readers::free_balance(siblings.dest.clone(), bob),
    )
    .await?;
    assert_eq!(*query.baseline(), 0);

    let start = siblings.clock.now();
    let hash = siblings.send(bob, 5 * UNIT).await?;

    // Nothing on the destination until it seals a block
    assert_eq!(storage::free_balance(siblings.dest.as_ref(), &bob).await?, 0);

    let settled = watcher.wait_for_change(query).await?;
    assert_eq!(settled, 5 * UNIT);
    assert_eq!(siblings.clock.now() - start, BLOCK_TIME);

    // The delivery is recorded as a block-level event in block #1
    let event = watcher
        .wait_for_event_since(
            &EventMatcher::new("XcmpQueue", "Success").field("message_hash", hash),
            1,
            Duration::ZERO,
        )
        .await?;
    assert_eq!(event.extrinsic_index, None);

    let events = siblings.dest.get_events(1).await?;
    assert!(events
        .iter()
        .any(|e| e.is("Balances", "Minted") && e.field("who") == Some(&Value::Account(bob))));
    Ok(())
}

#[tokio::test]
async fn test_delivery_delay_spans_several_blocks() -> Result<()> {
    let siblings = siblings(Some(Duration::from_secs(6)), 3).await?;
    let charleth = siblings.dev.charleth.address();
    let watcher = siblings.watcher(SettlementPolicy::new(20, Duration::from_secs(6)));
    let start = siblings.clock.now();

    let hash = siblings.send(charleth, UNIT).await?;
    let matcher = EventMatcher::new("XcmpQueue", "Success").field("message_hash", hash);

    let event = watcher
        .wait_for_event(&matcher, Duration::from_secs(60))
        .await?;
    assert!(event.is("XcmpQueue", "Success"));
    assert_eq!(siblings.clock.now() - start, Duration::from_secs(18));
    assert_eq!(siblings.dest.current_block_height().await?, 3);
    assert_free_balance(siblings.dest.as_ref(), &charleth, UNIT).await?;
    Ok(())
}

#[tokio::test]
async fn test_stalled_destination_times_out() -> Result<()> {
    let siblings = siblings(None, 1).await?;
    let bob = siblings.dev.baltathar.address();
    let policy = SettlementPolicy::new(5, Duration::from_secs(6));
    let watcher = siblings.watcher(policy);

    let query = SettlementQuery::capture(
        "bob's balance on a stalled destination",
        readers::free_balance(siblings.dest.clone(), bob),
    )
    .await?;
    siblings.send(bob, UNIT).await?;

    let start = siblings.clock.now();
    let err = watcher.wait_for_change(query).await.unwrap_err();
    assert!(err.is_timeout());
    match err {
        SettlementError::Timeout {
            description,
            attempts,
        } => {
            assert_eq!(attempts, 5);
            assert!(description.contains("stalled"));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(siblings.clock.now() - start, policy.budget());
    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_is_observable() -> Result<()> {
    let siblings = siblings(Some(BLOCK_TIME), 1).await?;
    let fresh = Address::new([0x77; 20]);
    let watcher = siblings.watcher(SettlementPolicy::from_blocks(4, 1, BLOCK_TIME));

    // Below the existential deposit of a fresh account
    let hash = siblings.send(fresh, EXISTENTIAL_DEPOSIT - 1).await?;

    let failed = watcher
        .wait_for_event(
            &EventMatcher::new("XcmpQueue", "Fail").field("message_hash", hash),
            BLOCK_TIME * 2,
        )
        .await?;
    assert!(failed.field("error").is_some());

    // The balance never moves
    let err = watcher
        .wait_for_change(
            SettlementQuery::new(
                "fresh account endowment",
                readers::free_balance(siblings.dest.clone(), fresh),
                0u128,
            )
            .with_policy(SettlementPolicy::new(3, BLOCK_TIME)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    Ok(())
}

#[tokio::test]
async fn test_storage_reader_sees_asset_creation() -> Result<()> {
    let siblings = siblings(None, 1).await?;
    let alith = siblings.dev.alith.address();
    let origin: Arc<dyn LedgerClient> = Arc::new(siblings.origin.clone());
    let watcher = SettlementWatcher::new(
        origin.clone(),
        siblings.clock.clone(),
        SettlementPolicy::new(3, BLOCK_TIME),
    );

    let query = SettlementQuery::capture(
        "asset 9 details",
        readers::storage_value(origin.clone(), "Assets", "Asset", vec![Value::U128(9)]),
    )
    .await?;
    assert!(query.baseline().is_none());

    // Submitted without waiting: applied once a block is sealed
    let receipt = origin
        .submit_signed(
            calls::asset_create(9, alith, 1),
            &siblings.dev.alith,
            SubmitOptions {
                wait_for_inclusion: false,
                ..SubmitOptions::default()
            },
        )
        .await?;
    assert!(receipt.block.is_none());
    siblings.origin.seal_block().await?;

    let details = watcher.wait_for_change(query).await?;
    assert!(details.is_some());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_ledger_is_not_a_timeout() -> Result<()> {
    let siblings = siblings(Some(BLOCK_TIME), 1).await?;
    let watcher = SettlementWatcher::new(
        Arc::new(siblings.origin.clone()),
        siblings.clock.clone(),
        SettlementPolicy::default(),
    );
    siblings.origin.set_offline(true);

    let err = watcher
        .wait_for_event(&EventMatcher::new("System", "Remarked"), BLOCK_TIME)
        .await
        .unwrap_err();
    assert!(!err.is_timeout());
    assert!(err.to_string().contains("unreachable"));
    Ok(())
}
