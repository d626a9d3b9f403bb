//! Bounded polling for effects that land after the triggering transaction:
//! cross-chain deliveries, scheduled or time-delayed state changes.
//!
//! All sleeping goes through the injected [`Clock`], so under
//! [`PausedClock`](crate::orchestrator::PausedClock) a full polling budget
//! completes without real waiting.

use anyhow::Result;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

use para_common::{
    config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETTLEMENT_ATTEMPTS},
    event::{EventMatcher, LedgerEvent},
    extrinsic::BlockHeight,
};

use crate::error::SettlementError;
use crate::ledger::LedgerClient;
use crate::orchestrator::Clock;

/// Retry budget of a settlement wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
}

impl SettlementPolicy {
    pub fn new(max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            max_attempts,
            poll_interval,
        }
    }

    /// Poll every `blocks_per_poll` blocks of `block_time`.
    pub fn from_blocks(max_attempts: u32, blocks_per_poll: u32, block_time: Duration) -> Self {
        Self::new(max_attempts, block_time * blocks_per_poll)
    }

    /// Longest time a wait under this policy can take.
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_SETTLEMENT_ATTEMPTS,
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        )
    }
}

/// A value expected to move away from `baseline`.
pub struct SettlementQuery<T, F> {
    description: String,
    read: F,
    baseline: T,
    policy: Option<SettlementPolicy>,
}

impl<T, F, Fut> SettlementQuery<T, F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub fn new(description: impl Into<String>, read: F, baseline: T) -> Self {
        Self {
            description: description.into(),
            read,
            baseline,
            policy: None,
        }
    }

    /// Read the baseline now. Call this before triggering the action.
    pub async fn capture(description: impl Into<String>, mut read: F) -> Result<Self> {
        let baseline = read().await?;
        Ok(Self::new(description, read, baseline))
    }

    /// Override the watcher's default policy for this query.
    pub fn with_policy(mut self, policy: SettlementPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn baseline(&self) -> &T {
        &self.baseline
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

pub struct SettlementWatcher {
    client: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    policy: SettlementPolicy,
}

impl SettlementWatcher {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        policy: SettlementPolicy,
    ) -> Self {
        Self {
            client,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    /// Read until the value differs from the baseline and return it.
    ///
    /// At most `max_attempts` reads (at least one), with `poll_interval`
    /// between consecutive reads and no sleep after the last one. A failed
    /// read aborts the wait immediately.
    pub async fn wait_for_change<T, F, Fut>(
        &self,
        mut query: SettlementQuery<T, F>,
    ) -> Result<T, SettlementError>
    where
        T: PartialEq + Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = query.policy.unwrap_or(self.policy);
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let value = (query.read)().await?;
            if value != query.baseline {
                log::info!(
                    "Settled: {} changed {:?} -> {:?} on attempt {}/{}",
                    query.description,
                    query.baseline,
                    value,
                    attempt,
                    attempts
                );
                return Ok(value);
            }

            log::trace!("{} unchanged on attempt {}/{}", query.description, attempt, attempts);
            if attempt < attempts {
                self.clock.sleep(policy.poll_interval).await;
            }
        }

        log::warn!("{} did not settle after {} attempts", query.description, attempts);
        Err(SettlementError::Timeout {
            description: query.description,
            attempts,
        })
    }

    /// Wait for a matching event in a block produced after this call.
    pub async fn wait_for_event(
        &self,
        matcher: &EventMatcher,
        timeout: Duration,
    ) -> Result<LedgerEvent, SettlementError> {
        let head = self.client.current_block_height().await?;
        self.wait_for_event_since(matcher, head + 1, timeout).await
    }

    /// Wait for a matching event in any block from `from_height` on,
    /// including blocks that already exist.
    ///
    /// Polls `ceil(timeout / poll_interval)` times (at least once); each
    /// poll scans the blocks sealed since the previous one.
    pub async fn wait_for_event_since(
        &self,
        matcher: &EventMatcher,
        from_height: BlockHeight,
        timeout: Duration,
    ) -> Result<LedgerEvent, SettlementError> {
        let interval = self.policy.poll_interval.as_nanos().max(1);
        let attempts = timeout.as_nanos().div_ceil(interval).clamp(1, u32::MAX as u128) as u32;
        let mut next = from_height;

        for attempt in 1..=attempts {
            let head = self.client.current_block_height().await?;
            while next <= head {
                let events = self.client.get_events(next).await?;
                if let Some(event) = events.into_iter().find(|e| matcher.matches(e)) {
                    log::info!("Observed {} in block #{} on attempt {}", event, next, attempt);
                    return Ok(event);
                }
                next += 1;
            }

            if attempt < attempts {
                self.clock.sleep(self.policy.poll_interval).await;
            }
        }

        Err(SettlementError::Timeout {
            description: format!("event {}", matcher),
            attempts,
        })
    }
}

/// Ready-made readers for [`SettlementQuery`] that own their client, so the
/// query does not borrow from the test body.
pub mod readers {
    use anyhow::Result;
    use futures::future::BoxFuture;
    use std::sync::Arc;

    use para_common::{call::Value, crypto::Address};

    use crate::ledger::{storage, LedgerClient};

    pub fn free_balance(
        client: Arc<dyn LedgerClient>,
        who: Address,
    ) -> impl FnMut() -> BoxFuture<'static, Result<u128>> {
        move || {
            let client = client.clone();
            Box::pin(async move { storage::free_balance(client.as_ref(), &who).await })
        }
    }

    pub fn asset_balance(
        client: Arc<dyn LedgerClient>,
        asset_id: u128,
        who: Address,
    ) -> impl FnMut() -> BoxFuture<'static, Result<u128>> {
        move || {
            let client = client.clone();
            Box::pin(async move { storage::asset_balance(client.as_ref(), asset_id, &who).await })
        }
    }

    /// Raw storage entry.
    pub fn storage_value(
        client: Arc<dyn LedgerClient>,
        module: &'static str,
        item: &'static str,
        keys: Vec<Value>,
    ) -> impl FnMut() -> BoxFuture<'static, Result<Option<Value>>> {
        move || {
            let client = client.clone();
            let keys = keys.clone();
            Box::pin(async move { client.query(module, item, &keys).await })
        }
    }
}
