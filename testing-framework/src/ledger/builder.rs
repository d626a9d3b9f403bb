//! TestLedgerBuilder - Fluent API for configuring TestLedger instances

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::time::Duration;

use para_common::{
    config::{ALITH_SECRET, BALTATHAR_SECRET, CHARLETH_SECRET, DOROTHY_SECRET, UNIT},
    crypto::{Address, KeyPair},
};

use super::runtime::RuntimeState;
use super::storage::AccountInfo;
use super::test_ledger::TestLedger;
use super::xcm::XcmRouter;
use crate::orchestrator::{Clock, SystemClock};

/// Default parachain id of a standalone ledger.
pub const DEFAULT_PARA_ID: u32 = 1000;

/// Builder for TestLedger instances with fluent API
///
/// # Example
///
/// ```rust,ignore
/// use para_testing_framework::ledger::TestLedgerBuilder;
///
/// let origin = TestLedgerBuilder::new()
///     .with_clock(clock.clone())
///     .with_block_time(Duration::from_secs(12))
///     .with_dev_accounts()
///     .build()
///     .await?;
///
/// let sibling = TestLedgerBuilder::new()
///     .with_clock(clock)
///     .with_para_id(2000)
///     .sibling_of(&origin)
///     .build()
///     .await?;
/// ```
pub struct TestLedgerBuilder {
    clock: Option<Arc<dyn Clock>>,
    para_id: u32,
    funded_accounts: Vec<(Address, Option<u128>)>,
    default_balance: u128,
    block_time: Option<Duration>,
    xcm_delivery_delay: u32,
    router: Option<XcmRouter>,
}

impl TestLedgerBuilder {
    /// Create new builder with defaults
    ///
    /// Default configuration:
    /// - SystemClock (real time)
    /// - para id 1000, no funded accounts
    /// - instant sealing only
    pub fn new() -> Self {
        Self {
            clock: None,
            para_id: DEFAULT_PARA_ID,
            funded_accounts: Vec::new(),
            default_balance: 1_000 * UNIT,
            block_time: None,
            xcm_delivery_delay: 1,
            router: None,
        }
    }

    /// Set clock implementation. If not set, uses `SystemClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_para_id(mut self, para_id: u32) -> Self {
        self.para_id = para_id;
        self
    }

    /// Fund `address` at genesis.
    pub fn with_funded_account(mut self, address: Address, balance: u128) -> Self {
        self.funded_accounts.push((address, Some(balance)));
        self
    }

    /// Fund the four development accounts (alith, baltathar, charleth,
    /// dorothy) with the default balance.
    pub fn with_dev_accounts(mut self) -> Self {
        for secret in [ALITH_SECRET, BALTATHAR_SECRET, CHARLETH_SECRET, DOROTHY_SECRET] {
            if let Ok(keypair) = KeyPair::from_secret_hex(secret) {
                self.funded_accounts.push((keypair.address(), None));
            }
        }
        self
    }

    /// Balance of accounts funded without an explicit amount.
    pub fn with_default_balance(mut self, balance: u128) -> Self {
        self.default_balance = balance;
        self
    }

    /// Produce a block every `block_time` of clock time, in addition to
    /// instant sealing on waited submissions.
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = Some(block_time);
        self
    }

    /// Blocks this ledger must seal before an inbound message is executed.
    pub fn with_xcm_delivery_delay(mut self, blocks: u32) -> Self {
        self.xcm_delivery_delay = blocks;
        self
    }

    /// Join the message router of `other` so the two can exchange XCM.
    pub fn sibling_of(mut self, other: &TestLedger) -> Self {
        self.router = Some(other.router().clone());
        self
    }

    /// Build the TestLedger instance
    ///
    /// # Errors
    ///
    /// Returns an error if another ledger on the same router already uses
    /// this para id.
    pub async fn build(self) -> Result<TestLedger> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let router = self.router.unwrap_or_default();

        if !router.register(self.para_id, self.xcm_delivery_delay) {
            bail!("Para id {} is already registered with this router", self.para_id);
        }

        let mut runtime = RuntimeState::default();
        for (address, balance) in self.funded_accounts {
            let account = runtime.accounts.entry(address).or_insert(AccountInfo::default());
            account.free = balance.unwrap_or(self.default_balance);
        }

        log::debug!(
            "Built ledger for para {} with {} funded accounts",
            self.para_id,
            runtime.accounts.len()
        );

        Ok(TestLedger::new(
            self.para_id,
            clock,
            self.block_time,
            router,
            runtime,
        ))
    }
}

impl Default for TestLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
