use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
};
use thiserror::Error;

use crate::{
    call::Value,
    config::{MAX_SIGNATORIES, MULTISIG_ENTROPY_PREFIX},
    crypto::{blake2_256, Address, Hash, ADDRESS_SIZE},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Multisig requires at least one member")]
    NoMembers,

    #[error("Invalid threshold {threshold} for {members} members")]
    InvalidThreshold { threshold: u16, members: usize },

    #[error("Too many signatories: {count}, max: {max}")]
    TooManySignatories { count: usize, max: u16 },

    #[error("{0} is not a member of the multisig")]
    NotAMember(Address),

    #[error("Malformed multisig storage value: {0}")]
    MalformedStorage(String),
}

/// Block height and extrinsic index of the transaction that opened a
/// proposal. Every later approval must quote it back.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Encode,
    Decode,
    Serialize,
    Deserialize,
)]
pub struct Timepoint {
    pub height: u32,
    pub index: u32,
}

impl Timepoint {
    pub const fn new(height: u32, index: u32) -> Self {
        Self { height, index }
    }

    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![Value::U32(self.height), Value::U32(self.index)])
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_tuple()? {
            [height, index] => Some(Self::new(height.as_u32()?, index.as_u32()?)),
            _ => None,
        }
    }
}

impl Display for Timepoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}-{}", self.height, self.index)
    }
}

/// A k-of-n shared account. The address is a pure function of the member
/// set and the threshold; member order never matters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigWallet {
    address: Address,
    members: BTreeSet<Address>,
    threshold: u16,
}

impl MultisigWallet {
    pub fn derive(
        members: impl IntoIterator<Item = Address>,
        threshold: u16,
    ) -> Result<Self, MultisigError> {
        let members: BTreeSet<Address> = members.into_iter().collect();
        if members.is_empty() {
            return Err(MultisigError::NoMembers);
        }
        if members.len() > MAX_SIGNATORIES as usize {
            return Err(MultisigError::TooManySignatories {
                count: members.len(),
                max: MAX_SIGNATORIES,
            });
        }
        if threshold == 0 || threshold as usize > members.len() {
            return Err(MultisigError::InvalidThreshold {
                threshold,
                members: members.len(),
            });
        }

        let address = derive_address(&members, threshold);
        Ok(Self {
            address,
            members,
            threshold,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn members(&self) -> &BTreeSet<Address> {
        &self.members
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn is_member(&self, who: &Address) -> bool {
        self.members.contains(who)
    }

    /// Every member except `who`, in canonical order.
    pub fn other_signatories(&self, who: &Address) -> Result<Vec<Address>, MultisigError> {
        if !self.is_member(who) {
            return Err(MultisigError::NotAMember(*who));
        }
        Ok(self.members.iter().filter(|m| *m != who).copied().collect())
    }
}

/// Ledger-side multisig account derivation: the first 20 bytes of
/// `blake2_256(SCALE(prefix, sorted_members, threshold))`.
///
/// No validation; [`MultisigWallet::derive`] is the checked entry point.
pub fn derive_address(members: &BTreeSet<Address>, threshold: u16) -> Address {
    let sorted: Vec<Address> = members.iter().copied().collect();
    let entropy = (MULTISIG_ENTROPY_PREFIX, &sorted, threshold).using_encoded(blake2_256);
    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(&entropy.as_bytes()[..ADDRESS_SIZE]);
    Address::new(bytes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    NoProposal,
    Proposed,
    /// More than one approval recorded, still awaiting execution.
    PartiallyApproved,
    Executed,
}

/// A pending multisig operation as stored by the ledger under
/// `(wallet, call_hash)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub call_hash: Hash,
    pub timepoint: Timepoint,
    pub depositor: Address,
    pub deposit: u128,
    pub approvals: BTreeSet<Address>,
    pub threshold: u16,
}

impl Proposal {
    pub fn state(&self) -> ProposalState {
        if self.approvals.len() > 1 {
            ProposalState::PartiallyApproved
        } else {
            ProposalState::Proposed
        }
    }

    pub fn is_approved_by(&self, who: &Address) -> bool {
        self.approvals.contains(who)
    }

    pub fn has_quorum(&self) -> bool {
        self.approvals.len() >= self.threshold as usize
    }

    /// Storage layout: `(timepoint, deposit, depositor, approvals)`. The call
    /// hash is part of the key and the threshold is a property of the wallet.
    pub fn to_storage_value(&self) -> Value {
        Value::Tuple(vec![
            self.timepoint.to_value(),
            Value::U128(self.deposit),
            Value::Account(self.depositor),
            Value::accounts(&self.approvals),
        ])
    }

    pub fn from_storage_value(
        call_hash: Hash,
        threshold: u16,
        value: &Value,
    ) -> Result<Self, MultisigError> {
        let malformed = || MultisigError::MalformedStorage(value.to_string());
        let fields = value.as_tuple().ok_or_else(malformed)?;
        let [timepoint, deposit, depositor, approvals] = fields else {
            return Err(malformed());
        };

        Ok(Self {
            call_hash,
            timepoint: Timepoint::from_value(timepoint).ok_or_else(malformed)?,
            depositor: depositor.as_account().ok_or_else(malformed)?,
            deposit: deposit.as_u128().ok_or_else(malformed)?,
            approvals: approvals
                .as_accounts()
                .ok_or_else(malformed)?
                .into_iter()
                .collect(),
            threshold,
        })
    }
}
