//! Threshold multisignature coordination.
//!
//! The coordinator holds no proposal state of its own: what is pending, and at
//! which timepoint, is always read back from the ledger (receipt events or
//! `Multisig.Multisigs` storage).

use anyhow::{anyhow, Result};
use std::sync::Arc;

use para_common::{
    call::CallDescriptor,
    calls::{self, MULTISIG},
    crypto::{Address, Hash, KeyPair},
    extrinsic::{DispatchError, Receipt, Rejection},
    multisig::{MultisigError, MultisigWallet, Proposal, ProposalState, Timepoint},
};

use crate::ledger::{storage, LedgerClient, SubmitOptions};

/// What an approver submits: the full call (executes once the threshold is
/// reached) or only its hash (records the approval).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOrHash {
    Call(CallDescriptor),
    Hash(Hash),
}

impl CallOrHash {
    pub fn call_hash(&self) -> Hash {
        match self {
            CallOrHash::Call(call) => call.call_hash(),
            CallOrHash::Hash(hash) => *hash,
        }
    }
}

impl From<CallDescriptor> for CallOrHash {
    fn from(call: CallDescriptor) -> Self {
        CallOrHash::Call(call)
    }
}

impl From<Hash> for CallOrHash {
    fn from(hash: Hash) -> Self {
        CallOrHash::Hash(hash)
    }
}

/// Result of one multisig submission.
///
/// When the submission executed the proposal, `receipt` carries the result of
/// the inner call: an inner failure shows up as `success == false` with
/// [`Rejection::Dispatch`] even though the proposal itself is consumed
/// (`state == Executed`).
#[derive(Debug, Clone)]
pub struct MultisigOutcome {
    pub receipt: Receipt,
    pub wallet: MultisigWallet,
    pub call_hash: Hash,
    pub state: ProposalState,
    /// Timepoint of the proposal this submission acted on, if known.
    pub timepoint: Option<Timepoint>,
}

pub struct MultisigCoordinator {
    client: Arc<dyn LedgerClient>,
    options: SubmitOptions,
}

impl MultisigCoordinator {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            options: SubmitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SubmitOptions) -> Self {
        self.options = options;
        self
    }

    /// Shared wallet of `members` at `threshold`. No ledger interaction.
    pub fn derive_wallet(
        members: impl IntoIterator<Item = Address>,
        threshold: u16,
    ) -> Result<MultisigWallet, MultisigError> {
        MultisigWallet::derive(members, threshold)
    }

    /// Open a proposal, or with `timepoint` act as an approval carrying the
    /// full call. With `threshold == 1` the call executes immediately.
    pub async fn propose(
        &self,
        proposer: &KeyPair,
        other_members: &[Address],
        threshold: u16,
        call: CallDescriptor,
        timepoint: Option<Timepoint>,
    ) -> Result<MultisigOutcome> {
        let (wallet, others) = wallet_for(proposer, other_members, threshold)?;
        let call_hash = call.call_hash();

        if threshold == 1 {
            let receipt = self
                .client
                .submit_signed(calls::as_multi_threshold_1(&others, call), proposer, self.options)
                .await?;
            let state = if receipt.success {
                ProposalState::Executed
            } else {
                ProposalState::NoProposal
            };
            let timepoint = receipt.timepoint();
            return Ok(MultisigOutcome {
                receipt,
                wallet,
                call_hash,
                state,
                timepoint,
            });
        }

        log::info!(
            "{} proposing {} on {}-of-{} wallet {}",
            proposer.address(),
            call,
            threshold,
            wallet.members().len(),
            wallet.address()
        );
        let receipt = self
            .client
            .submit_signed(
                calls::as_multi(threshold, &others, timepoint, call),
                proposer,
                self.options,
            )
            .await?;
        self.settle(receipt, wallet, call_hash).await
    }

    /// Approve the proposal opened at `timepoint`.
    pub async fn approve(
        &self,
        approver: &KeyPair,
        other_members: &[Address],
        threshold: u16,
        call: impl Into<CallOrHash>,
        timepoint: Timepoint,
    ) -> Result<MultisigOutcome> {
        let (wallet, others) = wallet_for(approver, other_members, threshold)?;
        let call = call.into();
        let call_hash = call.call_hash();

        let extrinsic = match call {
            CallOrHash::Call(call) => calls::as_multi(threshold, &others, Some(timepoint), call),
            CallOrHash::Hash(hash) => {
                calls::approve_as_multi(threshold, &others, Some(timepoint), hash)
            }
        };
        log::debug!(
            "{} approving {} on wallet {} at {}",
            approver.address(),
            call_hash,
            wallet.address(),
            timepoint
        );

        let receipt = self
            .client
            .submit_signed(extrinsic, approver, self.options)
            .await?;
        self.settle(receipt, wallet, call_hash).await
    }

    /// Withdraw a pending proposal. Only its depositor may cancel.
    pub async fn cancel(
        &self,
        depositor: &KeyPair,
        other_members: &[Address],
        threshold: u16,
        call_hash: Hash,
        timepoint: Timepoint,
    ) -> Result<MultisigOutcome> {
        let (wallet, others) = wallet_for(depositor, other_members, threshold)?;
        let receipt = self
            .client
            .submit_signed(
                calls::cancel_as_multi(threshold, &others, timepoint, call_hash),
                depositor,
                self.options,
            )
            .await?;

        if receipt.success {
            return Ok(MultisigOutcome {
                receipt,
                wallet,
                call_hash,
                state: ProposalState::NoProposal,
                timepoint: Some(timepoint),
            });
        }
        self.from_storage(receipt, wallet, call_hash).await
    }

    /// Pending proposal of `wallet` for `call_hash`, as stored by the ledger.
    pub async fn pending(
        &self,
        wallet: &MultisigWallet,
        call_hash: &Hash,
    ) -> Result<Option<Proposal>> {
        storage::multisig_proposal(self.client.as_ref(), wallet, call_hash).await
    }

    /// Derive the proposal state from the receipt's multisig events.
    async fn settle(
        &self,
        mut receipt: Receipt,
        wallet: MultisigWallet,
        call_hash: Hash,
    ) -> Result<MultisigOutcome> {
        if !receipt.success || receipt.block.is_none() {
            return self.from_storage(receipt, wallet, call_hash).await;
        }

        if let Some(event) = receipt.find_event(MULTISIG, "MultisigExecuted") {
            let result = event
                .field("result")
                .and_then(DispatchError::result_from_value)
                .ok_or_else(|| anyhow!("Malformed MultisigExecuted event: {}", event))?;
            let timepoint = event.field("timepoint").and_then(Timepoint::from_value);

            if let Err(error) = result {
                log::warn!(
                    "Multisig {} executed {} with error: {}",
                    wallet.address(),
                    call_hash,
                    error
                );
                receipt.success = false;
                receipt.error = Some(Rejection::Dispatch(error));
            }
            return Ok(MultisigOutcome {
                receipt,
                wallet,
                call_hash,
                state: ProposalState::Executed,
                timepoint,
            });
        }

        if receipt.has_event(MULTISIG, "NewMultisig") {
            let timepoint = receipt.timepoint();
            return Ok(MultisigOutcome {
                receipt,
                wallet,
                call_hash,
                state: ProposalState::Proposed,
                timepoint,
            });
        }

        if let Some(event) = receipt.find_event(MULTISIG, "MultisigApproval") {
            let timepoint = event.field("timepoint").and_then(Timepoint::from_value);
            return Ok(MultisigOutcome {
                receipt,
                wallet,
                call_hash,
                state: ProposalState::PartiallyApproved,
                timepoint,
            });
        }

        self.from_storage(receipt, wallet, call_hash).await
    }

    async fn from_storage(
        &self,
        receipt: Receipt,
        wallet: MultisigWallet,
        call_hash: Hash,
    ) -> Result<MultisigOutcome> {
        let proposal = self.pending(&wallet, &call_hash).await?;
        Ok(MultisigOutcome {
            receipt,
            wallet,
            call_hash,
            state: proposal
                .as_ref()
                .map_or(ProposalState::NoProposal, Proposal::state),
            timepoint: proposal.map(|p| p.timepoint),
        })
    }
}

/// Wallet of `signer` plus `other_members`, and the other signatories in the
/// canonical order the ledger requires.
fn wallet_for(
    signer: &KeyPair,
    other_members: &[Address],
    threshold: u16,
) -> Result<(MultisigWallet, Vec<Address>), MultisigError> {
    let who = signer.address();
    let wallet = MultisigWallet::derive(
        other_members.iter().copied().chain(std::iter::once(who)),
        threshold,
    )?;
    let others = wallet.other_signatories(&who)?;
    Ok((wallet, others))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use crate::ledger::{TestLedger, TestLedgerBuilder};
    use para_common::config::{ALITH_SECRET, BALTATHAR_SECRET, CHARLETH_SECRET, UNIT};

    fn keypair(secret: &str) -> KeyPair {
        KeyPair::from_secret_hex(secret).unwrap()
    }

    async fn setup() -> (TestLedger, MultisigCoordinator) {
        let ledger = TestLedgerBuilder::new()
            .with_dev_accounts()
            .build()
            .await
            .unwrap();
        let coordinator = MultisigCoordinator::new(Arc::new(ledger.clone()));
        (ledger, coordinator)
    }

    #[test]
    fn test_wallet_for_sorts_and_drops_signer() {
        let alith = keypair(ALITH_SECRET);
        let b = keypair(BALTATHAR_SECRET).address();
        let c = keypair(CHARLETH_SECRET).address();

        let (wallet, others) = wallet_for(&alith, &[c, b, alith.address()], 2).unwrap();
        assert_eq!(wallet.members().len(), 3);
        assert!(!others.contains(&alith.address()));
        let mut sorted = others.clone();
        sorted.sort();
        assert_eq!(others, sorted);
    }

    #[test]
    fn test_derive_wallet_rejects_bad_threshold() {
        let b = keypair(BALTATHAR_SECRET).address();
        assert!(matches!(
            MultisigCoordinator::derive_wallet([b], 2),
            Err(MultisigError::InvalidThreshold { .. })
        ));
    }

    #[tokio::test]
    async fn test_propose_then_approve_by_hash() {
        let (_ledger, coordinator) = setup().await;
        let alith = keypair(ALITH_SECRET);
        let baltathar = keypair(BALTATHAR_SECRET);
        let charleth = keypair(CHARLETH_SECRET);
        let members = [alith.address(), baltathar.address(), charleth.address()];

        let call = calls::remark_with_event(b"governance".to_vec());
        let proposed = coordinator
            .propose(&alith, &members[1..], 3, call, None)
            .await
            .unwrap();
        assert!(proposed.receipt.success);
        assert_eq!(proposed.state, ProposalState::Proposed);
        let timepoint = proposed.timepoint.unwrap();

        let approved = coordinator
            .approve(&baltathar, &[members[0], members[2]], 3, proposed.call_hash, timepoint)
            .await
            .unwrap();
        assert_eq!(approved.state, ProposalState::PartiallyApproved);
        assert_eq!(approved.timepoint, Some(timepoint));

        let pending = coordinator
            .pending(&approved.wallet, &approved.call_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.approvals.len(), 2);
        assert_eq!(pending.depositor, alith.address());
    }

    #[tokio::test]
    async fn test_threshold_one_executes_immediately() {
        let (ledger, coordinator) = setup().await;
        let alith = keypair(ALITH_SECRET);
        let baltathar = keypair(BALTATHAR_SECRET).address();

        let wallet = MultisigCoordinator::derive_wallet([alith.address(), baltathar], 1).unwrap();
        crate::utilities::fund_account(&ledger, &alith, wallet.address(), 10 * UNIT)
            .await
            .unwrap();

        let outcome = coordinator
            .propose(&alith, &[baltathar], 1, calls::remark_with_event(b"x".to_vec()), None)
            .await
            .unwrap();
        assert!(outcome.receipt.success);
        assert_eq!(outcome.state, ProposalState::Executed);
        assert_eq!(outcome.wallet, wallet);
        let remarked = outcome.receipt.find_event("System", "Remarked").unwrap();
        assert_eq!(
            remarked.field("sender"),
            Some(&para_common::call::Value::Account(wallet.address()))
        );
    }

    #[tokio::test]
    async fn test_rejected_approval_reads_state_from_storage() {
        let (_ledger, coordinator) = setup().await;
        let alith = keypair(ALITH_SECRET);
        let baltathar = keypair(BALTATHAR_SECRET).address();

        let proposed = coordinator
            .propose(&alith, &[baltathar], 2, calls::remark(b"x".to_vec()), None)
            .await
            .unwrap();

        // The proposer approving again is refused; the proposal is unchanged
        let again = coordinator
            .approve(&alith, &[baltathar], 2, proposed.call_hash, proposed.timepoint.unwrap())
            .await
            .unwrap();
        assert!(again.receipt.is_rejected_with(MULTISIG, "AlreadyApproved"));
        assert_eq!(again.state, ProposalState::Proposed);
        assert_eq!(again.timepoint, proposed.timepoint);
    }
}
