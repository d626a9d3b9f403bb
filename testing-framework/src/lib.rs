//! # Parachain Testing Framework
//!
//! Transaction orchestration for integration tests against a Substrate
//! parachain with an EVM layer.
//!
//! ## Components
//!
//! - **[`BatchBuilder`]**: several calls in one signed extrinsic, atomic
//!   (`Utility.batch_all`) or best-effort (`Utility.batch`)
//! - **[`MultisigCoordinator`]**: derive threshold wallets and drive
//!   proposals through propose, approve and execute
//! - **[`SettlementWatcher`]**: bounded polling for effects that land after
//!   the triggering block, such as cross-chain deliveries
//!
//! Every component talks to the chain through [`LedgerClient`]. The
//! in-process [`TestLedger`] implements it with block production, a
//! transaction pool and XCM delivery between sibling ledgers.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use para_testing_framework::prelude::*;
//!
//! #[tokio::test]
//! async fn test_atomic_batch() {
//!     let dev = DevAccounts::load().unwrap();
//!     let ledger = TestLedgerBuilder::new()
//!         .with_dev_accounts()
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let mut batch = BatchBuilder::new(Arc::new(ledger), dev.alith.clone());
//!     batch.append(calls::asset_create(7, dev.alith.address(), 1)).unwrap();
//!     batch.append(calls::asset_mint(7, dev.baltathar.address(), 100)).unwrap();
//!     assert!(batch.execute(BatchMode::Atomic).await.unwrap().success);
//! }
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: all waiting goes through [`Clock`]; [`PausedClock`]
//!    makes block production and polling instant
//! 2. **Ledger is the source of truth**: no component caches chain state
//! 3. **Rejections are values**: a refused transaction is a [`Receipt`] with
//!    `success == false`, only infrastructure failures are `Err`

#![warn(clippy::all)]

/// Core orchestration: Clock abstraction
pub mod orchestrator;

/// Ledger client seam and the in-process test ledger
pub mod ledger;

pub mod batch;
pub mod multisig;
pub mod settlement;

pub mod assertions;
pub mod config;
pub mod error;

/// Shared account helpers
pub mod utilities;

// Convenient re-exports for common usage
pub mod prelude;

// Re-export commonly used types at crate root
pub use batch::{BatchBuilder, BatchMode};
pub use error::SettlementError;
pub use ledger::{LedgerClient, TestLedger, TestLedgerBuilder};
pub use multisig::MultisigCoordinator;
pub use orchestrator::{Clock, PausedClock, SystemClock};
pub use para_common::extrinsic::Receipt;
pub use settlement::{SettlementPolicy, SettlementQuery, SettlementWatcher};

/// Framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
