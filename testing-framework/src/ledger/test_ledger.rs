//! TestLedger - In-process parachain double
//!
//! Implements [`LedgerClient`] over an in-memory runtime so harness components
//! can be exercised without a running node. Blocks are produced either
//! instantly (on every waited submission or an explicit [`TestLedger::seal_block`])
//! or from the injected clock when a block time is configured.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parity_scale_codec::Encode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use para_common::{
    call::{CallDescriptor, Value},
    config::{FIRST_EXTRINSIC_INDEX, TRANSACTION_FEE},
    crypto::{blake2_256, Address, Hash, Hashable, KeyPair},
    event::LedgerEvent,
    extrinsic::{
        BlockHeight, BlockRef, DispatchError, InvalidTransaction, Mortality, Nonce, Receipt,
        Rejection, SignedTransaction,
    },
    multisig::Timepoint,
};

use super::runtime::{is_known_call, DispatchContext, RuntimeState};
use super::xcm::XcmRouter;
use super::LedgerClient;
use crate::orchestrator::Clock;

/// Upper bound on blocks produced by a single catch-up, so a paused clock
/// advanced by hours does not stall a test.
const MAX_CATCH_UP_BLOCKS: u32 = 1024;

struct Block {
    hash: Hash,
    events: Vec<LedgerEvent>,
}

/// Result of applying one extrinsic inside a block.
struct Applied {
    tx_hash: Hash,
    extrinsic_index: u32,
    events: Vec<LedgerEvent>,
    result: Result<(), DispatchError>,
}

struct ChainState {
    runtime: RuntimeState,
    /// Index is the block height; block 0 is genesis.
    blocks: Vec<Block>,
    pool: Vec<SignedTransaction>,
    last_block_at: Instant,
}

impl ChainState {
    fn head(&self) -> BlockHeight {
        (self.blocks.len() - 1) as BlockHeight
    }

    fn pending_from(&self, who: &Address) -> u32 {
        self.pool.iter().filter(|tx| tx.signer == *who).count() as u32
    }
}

struct Inner {
    state: Mutex<ChainState>,
    offline: AtomicBool,
    clock: Arc<dyn Clock>,
    block_time: Option<Duration>,
    router: XcmRouter,
    para_id: u32,
    genesis_hash: Hash,
}

/// In-process parachain node.
///
/// Cheap to clone; clones share the same chain.
///
/// # Example
///
/// ```rust,ignore
/// let ledger = TestLedgerBuilder::new()
///     .with_dev_accounts()
///     .build()
///     .await?;
///
/// let receipt = ledger
///     .submit_signed(calls::remark(b"hi".to_vec()), &alith, SubmitOptions::default())
///     .await?;
/// assert_eq!(receipt.timepoint(), Some(Timepoint::new(1, 1)));
/// ```
#[derive(Clone)]
pub struct TestLedger {
    inner: Arc<Inner>,
}

impl TestLedger {
    pub(super) fn new(
        para_id: u32,
        clock: Arc<dyn Clock>,
        block_time: Option<Duration>,
        router: XcmRouter,
        runtime: RuntimeState,
    ) -> Self {
        let genesis_hash = blake2_256(&(b"genesis", para_id).encode());
        let state = ChainState {
            runtime,
            blocks: vec![Block {
                hash: genesis_hash,
                events: Vec::new(),
            }],
            pool: Vec::new(),
            last_block_at: clock.now(),
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                offline: AtomicBool::new(false),
                clock,
                block_time,
                router,
                para_id,
                genesis_hash,
            }),
        }
    }

    pub fn para_id(&self) -> u32 {
        self.inner.para_id
    }

    pub fn genesis_hash(&self) -> Hash {
        self.inner.genesis_hash
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub(super) fn router(&self) -> &XcmRouter {
        &self.inner.router
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Make every client call fail as if the endpoint were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        !self.inner.offline.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if !self.is_online() {
            bail!("Ledger endpoint of para {} is unreachable", self.inner.para_id);
        }
        Ok(())
    }

    // ========================================================================
    // Block production
    // ========================================================================

    /// Seal a block with whatever is in the pool. Returns its height.
    pub async fn seal_block(&self) -> Result<BlockHeight> {
        self.ensure_online()?;
        let mut chain = self.inner.state.lock().await;
        self.catch_up(&mut chain);
        self.seal(&mut chain, None);
        Ok(chain.head())
    }

    /// Number of transactions waiting in the pool.
    pub async fn pool_len(&self) -> usize {
        self.inner.state.lock().await.pool.len()
    }

    /// Produce the blocks the clock says are due since the last one.
    fn catch_up(&self, chain: &mut ChainState) {
        let Some(block_time) = self.inner.block_time else {
            return;
        };

        let elapsed = self.inner.clock.now().saturating_duration_since(chain.last_block_at);
        let due = (elapsed.as_nanos() / block_time.as_nanos().max(1))
            .min(MAX_CATCH_UP_BLOCKS as u128) as u32;
        if due == 0 {
            return;
        }

        log::trace!("para {} producing {} timed blocks", self.inner.para_id, due);
        let last_block_at = chain.last_block_at + block_time * due;
        for _ in 0..due {
            self.seal(chain, None);
        }
        chain.last_block_at = last_block_at;
    }

    /// Build the next block: inbound messages, then the pool, then `extra`.
    /// Returns the outcome of `extra` if it was given; `extra` is refused
    /// when it is no longer valid on top of the pool.
    fn seal(
        &self,
        chain: &mut ChainState,
        extra: Option<SignedTransaction>,
    ) -> Option<Result<Applied, InvalidTransaction>> {
        let height = chain.head() + 1;
        let parent_hash = chain.blocks[chain.head() as usize].hash;

        // Timestamp inherent takes extrinsic index 0
        let mut events = vec![LedgerEvent::new("System", "ExtrinsicSuccess").at_extrinsic(0)];

        for message in self.inner.router.take_due(self.inner.para_id) {
            events.extend(chain.runtime.receive_xcm(&message));
        }

        let mut tx_hashes = Vec::new();
        let mut next_index = FIRST_EXTRINSIC_INDEX;
        for tx in std::mem::take(&mut chain.pool) {
            if let Err(reason) = self.validate(chain, &tx, height, 0) {
                log::warn!("Dropping pooled extrinsic {}: {}", tx.hash(), reason);
                continue;
            }
            match self.apply(chain, &tx, Timepoint::new(height, next_index)) {
                Ok(applied) => {
                    tx_hashes.push(applied.tx_hash);
                    events.extend(applied.events);
                    next_index += 1;
                }
                Err(reason) => log::warn!("Dropping pooled extrinsic {}: {}", tx.hash(), reason),
            }
        }

        // The pool may have spent what `extra` was validated against
        let extra = extra.map(|tx| -> Result<Applied, InvalidTransaction> {
            self.validate(chain, &tx, height, 0)?;
            let applied = self.apply(chain, &tx, Timepoint::new(height, next_index))?;
            tx_hashes.push(applied.tx_hash);
            events.extend(applied.events.iter().cloned());
            Ok(applied)
        });

        for message in std::mem::take(&mut chain.runtime.outbound) {
            self.inner.router.send(message);
        }

        let hash = blake2_256(&(parent_hash, height, tx_hashes).encode());
        log::debug!("para {} sealed block #{} ({})", self.inner.para_id, height, hash);
        chain.blocks.push(Block { hash, events });
        chain.last_block_at = self.inner.clock.now();

        extra
    }

    /// Pool-level checks. `pending` is the number of earlier transactions by
    /// the same signer that will be applied first.
    fn validate(
        &self,
        chain: &ChainState,
        tx: &SignedTransaction,
        inclusion_height: BlockHeight,
        pending: u32,
    ) -> Result<(), InvalidTransaction> {
        if !is_known_call(&tx.call) {
            return Err(InvalidTransaction::Call);
        }

        let birth_hash = match tx.mortality.birth() {
            None => self.inner.genesis_hash,
            Some(birth) => chain
                .blocks
                .get(birth as usize)
                .map(|block| block.hash)
                .ok_or(InvalidTransaction::AncientBirthBlock)?,
        };
        if !tx.mortality.is_valid_at(inclusion_height) {
            return Err(InvalidTransaction::AncientBirthBlock);
        }

        tx.verify(&self.inner.genesis_hash, &birth_hash)
            .map_err(|_| InvalidTransaction::BadProof)?;

        let account = chain.runtime.account(&tx.signer);
        let expected = account.nonce + pending;
        if tx.nonce < expected {
            return Err(InvalidTransaction::Stale);
        }
        if tx.nonce > expected {
            return Err(InvalidTransaction::Future);
        }

        if account.free < TRANSACTION_FEE {
            return Err(InvalidTransaction::Payment);
        }
        Ok(())
    }

    /// Charge the fee, bump the nonce and dispatch. Fails without touching
    /// state when the fee cannot be paid.
    fn apply(
        &self,
        chain: &mut ChainState,
        tx: &SignedTransaction,
        timepoint: Timepoint,
    ) -> Result<Applied, InvalidTransaction> {
        let mut ctx = DispatchContext {
            para_id: self.inner.para_id,
            timepoint,
            router: &self.inner.router,
            events: Vec::new(),
        };
        let runtime = &mut chain.runtime;

        // Fee and nonce are kept even when the call fails
        if let Err(e) = runtime.withdraw(&mut ctx, tx.signer, TRANSACTION_FEE, false) {
            log::debug!("Fee withdrawal from {} failed: {}", tx.signer, e);
            return Err(InvalidTransaction::Payment);
        }
        runtime.accounts.entry(tx.signer).or_default().nonce += 1;

        let result = runtime.transactional(&mut ctx, |state, ctx| {
            state.dispatch(ctx, tx.signer, &tx.call)
        });

        ctx.emit(
            LedgerEvent::new("TransactionPayment", "TransactionFeePaid")
                .with_field("who", tx.signer)
                .with_field("actual_fee", TRANSACTION_FEE)
                .with_field("tip", 0u128),
        );
        match &result {
            Ok(()) => ctx.emit(LedgerEvent::new("System", "ExtrinsicSuccess")),
            Err(e) => ctx.emit(
                LedgerEvent::new("System", "ExtrinsicFailed")
                    .with_field("dispatch_error", e.to_value()),
            ),
        }

        Ok(Applied {
            tx_hash: tx.hash(),
            extrinsic_index: timepoint.index,
            events: ctx.events,
            result,
        })
    }

    async fn lock_current(&self) -> Result<tokio::sync::MutexGuard<'_, ChainState>> {
        self.ensure_online()?;
        let mut chain = self.inner.state.lock().await;
        self.catch_up(&mut chain);
        Ok(chain)
    }
}

#[async_trait]
impl LedgerClient for TestLedger {
    async fn sign(
        &self,
        call: CallDescriptor,
        signer: &KeyPair,
        nonce: Nonce,
        mortality: Mortality,
    ) -> Result<SignedTransaction> {
        self.ensure_online()?;
        let birth_hash = match mortality.birth() {
            None => self.inner.genesis_hash,
            Some(birth) => self.block_hash(birth).await?,
        };
        SignedTransaction::sign(
            call,
            signer,
            nonce,
            mortality,
            &self.inner.genesis_hash,
            &birth_hash,
        )
        .context("Failed to sign transaction")
    }

    async fn submit(&self, tx: SignedTransaction, wait_for_inclusion: bool) -> Result<Receipt> {
        let mut chain = self.lock_current().await?;
        let tx_hash = tx.hash();
        let inclusion_height = chain.head() + 1;

        let pending = chain.pending_from(&tx.signer);
        if let Err(reason) = self.validate(&chain, &tx, inclusion_height, pending) {
            log::debug!("Extrinsic {} refused by the pool: {}", tx_hash, reason);
            return Ok(Receipt::invalid(tx_hash, reason));
        }

        if !wait_for_inclusion {
            chain.pool.push(tx);
            return Ok(Receipt::pooled(tx_hash));
        }

        let applied = match self.seal(&mut chain, Some(tx)) {
            Some(Ok(applied)) => applied,
            Some(Err(reason)) => {
                log::debug!("Extrinsic {} invalid on top of the pool: {}", tx_hash, reason);
                return Ok(Receipt::invalid(tx_hash, reason));
            }
            None => bail!("Extrinsic {} vanished while sealing", tx_hash),
        };
        let height = chain.head();
        let block = BlockRef {
            height,
            hash: chain.blocks[height as usize].hash,
            extrinsic_index: applied.extrinsic_index,
        };

        Ok(match applied.result {
            Ok(()) => Receipt::included(applied.tx_hash, block, applied.events),
            Err(e) => Receipt::failed(
                applied.tx_hash,
                block,
                Rejection::Dispatch(e),
                applied.events,
            ),
        })
    }

    async fn query(
        &self,
        module: &str,
        storage_item: &str,
        keys: &[Value],
    ) -> Result<Option<Value>> {
        let chain = self.lock_current().await?;
        match (module, storage_item, keys) {
            ("System", "Number", []) => Ok(Some(Value::U32(chain.head()))),
            ("ParachainInfo", "ParachainId", []) => Ok(Some(Value::U32(self.inner.para_id))),
            _ => chain.runtime.storage_value(module, storage_item, keys),
        }
    }

    async fn get_events(&self, height: BlockHeight) -> Result<Vec<LedgerEvent>> {
        let chain = self.lock_current().await?;
        chain
            .blocks
            .get(height as usize)
            .map(|block| block.events.clone())
            .ok_or_else(|| anyhow!("Block #{} not found (head is #{})", height, chain.head()))
    }

    async fn get_account_nonce(&self, address: &Address) -> Result<Nonce> {
        let chain = self.lock_current().await?;
        Ok(chain.runtime.account(address).nonce + chain.pending_from(address))
    }

    async fn current_block_height(&self) -> Result<BlockHeight> {
        Ok(self.lock_current().await?.head())
    }

    async fn block_hash(&self, height: BlockHeight) -> Result<Hash> {
        let chain = self.lock_current().await?;
        chain
            .blocks
            .get(height as usize)
            .map(|block| block.hash)
            .ok_or_else(|| anyhow!("Block #{} not found (head is #{})", height, chain.head()))
    }
}
