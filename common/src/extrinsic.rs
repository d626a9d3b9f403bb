use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{
    call::{CallDescriptor, Value},
    config::MAX_RAW_SIGNING_PAYLOAD,
    crypto::{blake2_256, Address, CryptoError, EcdsaSignature, Hash, Hashable, KeyPair},
    event::LedgerEvent,
    multisig::Timepoint,
};

pub type Nonce = u32;
pub type BlockHeight = u32;

/// Validity window of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum Mortality {
    Immortal,
    /// Valid from `birth` for `period` blocks.
    Mortal { period: u32, birth: BlockHeight },
}

impl Mortality {
    pub fn mortal(period: u32, current_height: BlockHeight) -> Self {
        Mortality::Mortal {
            period,
            birth: current_height,
        }
    }

    pub fn birth(&self) -> Option<BlockHeight> {
        match self {
            Mortality::Immortal => None,
            Mortality::Mortal { birth, .. } => Some(*birth),
        }
    }

    pub fn is_valid_at(&self, height: BlockHeight) -> bool {
        match self {
            Mortality::Immortal => true,
            Mortality::Mortal { period, birth } => {
                height >= *birth && height < birth.saturating_add(*period)
            }
        }
    }
}

/// Bytes covered by the signer's signature.
///
/// Binds the call to the signer's nonce, its validity window and the chain it
/// was built for (genesis hash plus the hash of the birth block). Payloads
/// longer than [`MAX_RAW_SIGNING_PAYLOAD`] are replaced by their blake2-256
/// digest.
pub fn signing_payload(
    call: &CallDescriptor,
    nonce: Nonce,
    mortality: &Mortality,
    genesis_hash: &Hash,
    birth_hash: &Hash,
) -> Vec<u8> {
    let encoded = (call, mortality, nonce, genesis_hash, birth_hash).encode();
    if encoded.len() > MAX_RAW_SIGNING_PAYLOAD {
        blake2_256(&encoded).to_bytes().to_vec()
    } else {
        encoded
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub call: CallDescriptor,
    pub signer: Address,
    pub nonce: Nonce,
    pub mortality: Mortality,
    pub signature: EcdsaSignature,
}

impl SignedTransaction {
    pub fn sign(
        call: CallDescriptor,
        keypair: &KeyPair,
        nonce: Nonce,
        mortality: Mortality,
        genesis_hash: &Hash,
        birth_hash: &Hash,
    ) -> Result<Self, CryptoError> {
        let payload = signing_payload(&call, nonce, &mortality, genesis_hash, birth_hash);
        let signature = keypair.sign(&payload)?;
        Ok(Self {
            call,
            signer: keypair.address(),
            nonce,
            mortality,
            signature,
        })
    }

    pub fn verify(&self, genesis_hash: &Hash, birth_hash: &Hash) -> Result<(), CryptoError> {
        let payload = signing_payload(
            &self.call,
            self.nonce,
            &self.mortality,
            genesis_hash,
            birth_hash,
        );
        self.signature.verify(&payload, &self.signer)
    }
}

impl Hashable for SignedTransaction {}

/// Pool-level validity failures. The transaction never enters a block.
#[derive(Error, Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum InvalidTransaction {
    #[error("Transaction nonce is stale")]
    Stale,
    #[error("Transaction nonce is in the future")]
    Future,
    #[error("Transaction has a bad signature")]
    BadProof,
    #[error("Transaction birth block is ancient")]
    AncientBirthBlock,
    #[error("Inability to pay some fees")]
    Payment,
    #[error("Transaction call is not expected")]
    Call,
}

#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum TokenError {
    #[error("Funds are unavailable")]
    FundsUnavailable,
    #[error("Account cannot exist with the funds that would be given")]
    BelowMinimum,
    #[error("Account cannot be reaped by this operation")]
    NotExpendable,
    #[error("The asset in question is unknown")]
    UnknownAsset,
}

impl TokenError {
    pub fn name(&self) -> &'static str {
        match self {
            TokenError::FundsUnavailable => "FundsUnavailable",
            TokenError::BelowMinimum => "BelowMinimum",
            TokenError::NotExpendable => "NotExpendable",
            TokenError::UnknownAsset => "UnknownAsset",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FundsUnavailable" => Some(TokenError::FundsUnavailable),
            "BelowMinimum" => Some(TokenError::BelowMinimum),
            "NotExpendable" => Some(TokenError::NotExpendable),
            "UnknownAsset" => Some(TokenError::UnknownAsset),
            _ => None,
        }
    }
}

/// Failure of an included extrinsic (or of one inner call).
#[derive(Error, Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum DispatchError {
    #[error("{module}.{error}")]
    Module { module: String, error: String },
    #[error("Bad origin")]
    BadOrigin,
    #[error("Token error: {0}")]
    Token(TokenError),
    #[error("{0}")]
    Other(String),
}

impl DispatchError {
    pub fn module(module: impl Into<String>, error: impl Into<String>) -> Self {
        DispatchError::Module {
            module: module.into(),
            error: error.into(),
        }
    }

    pub fn is_module(&self, module: &str, error: &str) -> bool {
        matches!(self, DispatchError::Module { module: m, error: e } if m == module && e == error)
    }

    /// Event field representation.
    pub fn to_value(&self) -> Value {
        match self {
            DispatchError::Module { module, error } => Value::Tuple(vec![
                Value::from("Module"),
                Value::from(module.as_str()),
                Value::from(error.as_str()),
            ]),
            DispatchError::BadOrigin => Value::Tuple(vec![Value::from("BadOrigin")]),
            DispatchError::Token(e) => {
                Value::Tuple(vec![Value::from("Token"), Value::from(e.name())])
            }
            DispatchError::Other(msg) => {
                Value::Tuple(vec![Value::from("Other"), Value::from(msg.as_str())])
            }
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_tuple()?;
        let kind = fields.first()?.as_text()?;
        match (kind, &fields[1..]) {
            ("Module", [module, error]) => Some(DispatchError::module(
                module.as_text()?,
                error.as_text()?,
            )),
            ("BadOrigin", []) => Some(DispatchError::BadOrigin),
            ("Token", [name]) => TokenError::from_name(name.as_text()?).map(DispatchError::Token),
            ("Other", [msg]) => Some(DispatchError::Other(msg.as_text()?.to_string())),
            _ => None,
        }
    }

    /// A dispatch result as an event field: `None` on success.
    pub fn result_to_value(result: &Result<(), DispatchError>) -> Value {
        match result {
            Ok(()) => Value::none(),
            Err(e) => Value::some(e.to_value()),
        }
    }

    pub fn result_from_value(value: &Value) -> Option<Result<(), DispatchError>> {
        match value.as_optional()? {
            None => Some(Ok(())),
            Some(inner) => Some(Err(DispatchError::from_value(inner)?)),
        }
    }
}

/// Why the ledger refused a transaction. Carried inside a [`Receipt`];
/// never an infrastructure error.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    #[error("Invalid transaction: {0}")]
    Invalid(InvalidTransaction),
    #[error("Dispatch failed: {0}")]
    Dispatch(DispatchError),
    #[error("Batch interrupted at call {index}: {error}")]
    BatchInterrupted { index: u32, error: DispatchError },
}

impl Rejection {
    pub fn dispatch_error(&self) -> Option<&DispatchError> {
        match self {
            Rejection::Invalid(_) => None,
            Rejection::Dispatch(e) | Rejection::BatchInterrupted { error: e, .. } => Some(e),
        }
    }

    pub fn is_module_error(&self, module: &str, error: &str) -> bool {
        self.dispatch_error()
            .is_some_and(|e| e.is_module(module, error))
    }
}

/// Handle to the block and position an extrinsic landed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: BlockHeight,
    pub hash: Hash,
    pub extrinsic_index: u32,
}

impl BlockRef {
    pub fn timepoint(&self) -> Timepoint {
        Timepoint::new(self.height, self.extrinsic_index)
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}-{} ({})", self.height, self.extrinsic_index, self.hash)
    }
}

/// Outcome of a submission.
///
/// `block` is `None` when the caller did not wait for inclusion or the
/// transaction was refused by the pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    pub error: Option<Rejection>,
    pub block: Option<BlockRef>,
    pub tx_hash: Hash,
    /// Events emitted by this extrinsic, in emission order.
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    pub fn included(tx_hash: Hash, block: BlockRef, events: Vec<LedgerEvent>) -> Self {
        Self {
            success: true,
            error: None,
            block: Some(block),
            tx_hash,
            events,
        }
    }

    pub fn failed(
        tx_hash: Hash,
        block: BlockRef,
        rejection: Rejection,
        events: Vec<LedgerEvent>,
    ) -> Self {
        Self {
            success: false,
            error: Some(rejection),
            block: Some(block),
            tx_hash,
            events,
        }
    }

    pub fn invalid(tx_hash: Hash, reason: InvalidTransaction) -> Self {
        Self {
            success: false,
            error: Some(Rejection::Invalid(reason)),
            block: None,
            tx_hash,
            events: Vec::new(),
        }
    }

    /// Accepted into the pool, inclusion not awaited.
    pub fn pooled(tx_hash: Hash) -> Self {
        Self {
            success: true,
            error: None,
            block: None,
            tx_hash,
            events: Vec::new(),
        }
    }

    pub fn timepoint(&self) -> Option<Timepoint> {
        self.block.as_ref().map(BlockRef::timepoint)
    }

    pub fn find_event(&self, module: &str, name: &str) -> Option<&LedgerEvent> {
        self.events.iter().find(|e| e.is(module, name))
    }

    pub fn has_event(&self, module: &str, name: &str) -> bool {
        self.find_event(module, name).is_some()
    }

    pub fn is_rejected_with(&self, module: &str, error: &str) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.is_module_error(module, error))
    }
}
