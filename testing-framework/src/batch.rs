//! Batch composition: several calls signed and submitted as one extrinsic.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use thiserror::Error;

use para_common::{
    call::CallDescriptor,
    calls::{self, UTILITY},
    crypto::KeyPair,
    extrinsic::{DispatchError, Receipt, Rejection},
};

use crate::ledger::{LedgerClient, SubmitOptions};

/// How the ledger treats a failing call inside the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// `Utility.batch_all`: every call succeeds or none takes effect.
    Atomic,
    /// `Utility.batch`: stop at the first failing call, keep the ones before.
    BestEffort,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Single-use batch was already executed")]
    AlreadyExecuted,
}

/// Accumulates calls and submits them as a single signed transaction.
///
/// Calls execute in append order. A reusable builder (the default) is emptied
/// after each execution; a [`single_use`](Self::single_use) builder refuses
/// further appends and executions.
///
/// # Example
///
/// ```rust,ignore
/// let mut batch = BatchBuilder::new(client, alith);
/// batch.append(calls::asset_create(7, alith_address, 1))?;
/// batch.append(calls::asset_mint(7, bob, 1_000))?;
/// let receipt = batch.execute(BatchMode::Atomic).await?;
/// ```
pub struct BatchBuilder {
    client: Arc<dyn LedgerClient>,
    signer: KeyPair,
    calls: Vec<CallDescriptor>,
    options: SubmitOptions,
    reusable: bool,
    executed: bool,
}

impl BatchBuilder {
    pub fn new(client: Arc<dyn LedgerClient>, signer: KeyPair) -> Self {
        Self {
            client,
            signer,
            calls: Vec::new(),
            options: SubmitOptions::default(),
            reusable: true,
            executed: false,
        }
    }

    pub fn single_use(mut self) -> Self {
        self.reusable = false;
        self
    }

    pub fn with_options(mut self, options: SubmitOptions) -> Self {
        self.options = options;
        self
    }

    /// Queue `call`. No ledger interaction.
    pub fn append(&mut self, call: CallDescriptor) -> Result<(), BatchError> {
        self.ensure_usable()?;
        self.calls.push(call);
        Ok(())
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn ensure_usable(&self) -> Result<(), BatchError> {
        if self.executed && !self.reusable {
            return Err(BatchError::AlreadyExecuted);
        }
        Ok(())
    }

    /// Sign and submit the queued calls as one extrinsic.
    ///
    /// Infrastructure failures come back as `Err` and leave the queue intact.
    /// A ledger refusal comes back as a receipt with `success == false`; in
    /// best-effort mode that includes an interrupted batch, reported as
    /// [`Rejection::BatchInterrupted`] with the index of the failing call.
    pub async fn execute(&mut self, mode: BatchMode) -> Result<Receipt> {
        self.ensure_usable()?;

        let batch = match mode {
            BatchMode::Atomic => calls::batch_all(self.calls.clone()),
            BatchMode::BestEffort => calls::batch(self.calls.clone()),
        };
        log::debug!("Executing {:?} batch of {} calls", mode, self.calls.len());

        let mut receipt = self
            .client
            .submit_signed(batch, &self.signer, self.options)
            .await?;

        if mode == BatchMode::BestEffort && receipt.success {
            if let Some(rejection) = interruption(&receipt)? {
                log::info!("Batch {} stopped early: {}", receipt.tx_hash, rejection);
                receipt.success = false;
                receipt.error = Some(rejection);
            }
        }

        self.executed = true;
        if self.reusable {
            self.calls.clear();
        }
        Ok(receipt)
    }
}

/// `Utility.BatchInterrupted` of a best-effort batch, as a rejection.
fn interruption(receipt: &Receipt) -> Result<Option<Rejection>> {
    let Some(event) = receipt.find_event(UTILITY, "BatchInterrupted") else {
        return Ok(None);
    };

    let index = event
        .field("index")
        .and_then(|v| v.as_u32())
        .ok_or_else(|| anyhow!("Malformed BatchInterrupted event: {}", event))?;
    let error = event
        .field("error")
        .and_then(DispatchError::from_value)
        .ok_or_else(|| anyhow!("Malformed BatchInterrupted event: {}", event))?;

    Ok(Some(Rejection::BatchInterrupted { index, error }))
}
