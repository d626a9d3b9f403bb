//! The ledger seam: everything the harness needs from a node.
//!
//! [`LedgerClient`] is implemented by an RPC client against a live parachain,
//! or by the in-process [`TestLedger`] double.

mod builder;
mod runtime;
pub mod storage;
mod test_ledger;
mod xcm;

pub use builder::TestLedgerBuilder;
pub use storage::AccountInfo;
pub use test_ledger::TestLedger;
pub use xcm::{XcmMessage, XcmRouter};

use anyhow::{Context, Result};
use async_trait::async_trait;
use para_common::{
    call::{CallDescriptor, Value},
    config::DEFAULT_MORTALITY_PERIOD,
    crypto::{Address, Hash, KeyPair},
    event::LedgerEvent,
    extrinsic::{BlockHeight, Mortality, Nonce, Receipt, SignedTransaction},
};

/// How [`LedgerClient::submit_signed`] builds and submits a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Block until the transaction is included.
    pub wait_for_inclusion: bool,
    /// Mortal era length in blocks; `None` signs an immortal transaction.
    pub mortality_period: Option<u32>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            wait_for_inclusion: true,
            mortality_period: Some(DEFAULT_MORTALITY_PERIOD),
        }
    }
}

/// RPC and query interface to a running parachain node.
///
/// Errors returned here are infrastructure failures (endpoint unreachable,
/// unknown block, malformed response) and abort the calling operation. A
/// transaction the ledger refuses is NOT an error: it comes back as a
/// [`Receipt`] with `success == false`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Build a call descriptor. No ledger interaction.
    fn compose_call(
        &self,
        module: &str,
        function: &str,
        params: Vec<(String, Value)>,
    ) -> CallDescriptor {
        CallDescriptor::with_params(module, function, params)
    }

    /// Sign `call` for this chain at the given nonce and validity window.
    async fn sign(
        &self,
        call: CallDescriptor,
        signer: &KeyPair,
        nonce: Nonce,
        mortality: Mortality,
    ) -> Result<SignedTransaction>;

    /// Submit a signed transaction, optionally waiting for inclusion.
    async fn submit(&self, tx: SignedTransaction, wait_for_inclusion: bool) -> Result<Receipt>;

    /// Read a storage item. `None` when the entry does not exist.
    async fn query(
        &self,
        module: &str,
        storage_item: &str,
        keys: &[Value],
    ) -> Result<Option<Value>>;

    /// Events of the block at `height`, in emission order.
    async fn get_events(&self, height: BlockHeight) -> Result<Vec<LedgerEvent>>;

    /// Next nonce of `address`, counting transactions still in the pool.
    async fn get_account_nonce(&self, address: &Address) -> Result<Nonce>;

    async fn current_block_height(&self) -> Result<BlockHeight>;

    async fn block_hash(&self, height: BlockHeight) -> Result<Hash>;

    /// Fetch the nonce, sign with a mortal era born at the current height,
    /// submit, and log the outcome.
    async fn submit_signed(
        &self,
        call: CallDescriptor,
        signer: &KeyPair,
        options: SubmitOptions,
    ) -> Result<Receipt> {
        let who = signer.address();
        let nonce = self
            .get_account_nonce(&who)
            .await
            .with_context(|| format!("Failed to fetch nonce for {}", who))?;
        let mortality = match options.mortality_period {
            Some(period) => Mortality::mortal(period, self.current_block_height().await?),
            None => Mortality::Immortal,
        };

        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Submitting {} from {} (nonce {})", call, who, nonce);
        }

        let tx = self.sign(call, signer, nonce, mortality).await?;
        let receipt = self.submit(tx, options.wait_for_inclusion).await?;

        match (&receipt.error, &receipt.block) {
            (None, Some(block)) => {
                log::info!("Extrinsic {} included at {}", receipt.tx_hash, block)
            }
            (None, None) => log::info!("Extrinsic {} accepted into the pool", receipt.tx_hash),
            (Some(error), _) => log::warn!("Extrinsic {} rejected: {}", receipt.tx_hash, error),
        }

        Ok(receipt)
    }
}
