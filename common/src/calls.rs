//! Constructors for the runtime calls the harness composes.
//!
//! Parameter names, order and widths follow the runtime metadata; changing
//! any of them changes the call hash.

use crate::{
    call::{CallDescriptor, Value},
    crypto::{Address, Hash},
    multisig::Timepoint,
};

pub const SYSTEM: &str = "System";
pub const BALANCES: &str = "Balances";
pub const ASSETS: &str = "Assets";
pub const UTILITY: &str = "Utility";
pub const MULTISIG: &str = "Multisig";
pub const XTOKENS: &str = "XTokens";

pub fn remark(remark: impl Into<Vec<u8>>) -> CallDescriptor {
    CallDescriptor::new(SYSTEM, "remark").arg("remark", Value::Bytes(remark.into()))
}

pub fn remark_with_event(remark: impl Into<Vec<u8>>) -> CallDescriptor {
    CallDescriptor::new(SYSTEM, "remark_with_event").arg("remark", Value::Bytes(remark.into()))
}

pub fn transfer_allow_death(dest: Address, value: u128) -> CallDescriptor {
    CallDescriptor::new(BALANCES, "transfer_allow_death")
        .arg("dest", dest)
        .arg("value", value)
}

pub fn transfer_keep_alive(dest: Address, value: u128) -> CallDescriptor {
    CallDescriptor::new(BALANCES, "transfer_keep_alive")
        .arg("dest", dest)
        .arg("value", value)
}

pub fn asset_create(id: u128, admin: Address, min_balance: u128) -> CallDescriptor {
    CallDescriptor::new(ASSETS, "create")
        .arg("id", id)
        .arg("admin", admin)
        .arg("min_balance", min_balance)
}

pub fn asset_mint(id: u128, beneficiary: Address, amount: u128) -> CallDescriptor {
    CallDescriptor::new(ASSETS, "mint")
        .arg("id", id)
        .arg("beneficiary", beneficiary)
        .arg("amount", amount)
}

pub fn asset_transfer(id: u128, target: Address, amount: u128) -> CallDescriptor {
    CallDescriptor::new(ASSETS, "transfer")
        .arg("id", id)
        .arg("target", target)
        .arg("amount", amount)
}

/// Best-effort batch: stops at the first failing call, earlier calls stay.
pub fn batch(calls: Vec<CallDescriptor>) -> CallDescriptor {
    CallDescriptor::new(UTILITY, "batch").arg("calls", calls)
}

/// Atomic batch: all calls succeed or none take effect.
pub fn batch_all(calls: Vec<CallDescriptor>) -> CallDescriptor {
    CallDescriptor::new(UTILITY, "batch_all").arg("calls", calls)
}

pub fn as_multi_threshold_1(
    other_signatories: &[Address],
    call: CallDescriptor,
) -> CallDescriptor {
    CallDescriptor::new(MULTISIG, "as_multi_threshold_1")
        .arg("other_signatories", Value::accounts(other_signatories))
        .arg("call", call)
}

pub fn as_multi(
    threshold: u16,
    other_signatories: &[Address],
    maybe_timepoint: Option<Timepoint>,
    call: CallDescriptor,
) -> CallDescriptor {
    CallDescriptor::new(MULTISIG, "as_multi")
        .arg("threshold", threshold)
        .arg("other_signatories", Value::accounts(other_signatories))
        .arg("maybe_timepoint", optional_timepoint(maybe_timepoint))
        .arg("call", call)
}

pub fn approve_as_multi(
    threshold: u16,
    other_signatories: &[Address],
    maybe_timepoint: Option<Timepoint>,
    call_hash: Hash,
) -> CallDescriptor {
    CallDescriptor::new(MULTISIG, "approve_as_multi")
        .arg("threshold", threshold)
        .arg("other_signatories", Value::accounts(other_signatories))
        .arg("maybe_timepoint", optional_timepoint(maybe_timepoint))
        .arg("call_hash", call_hash)
}

pub fn cancel_as_multi(
    threshold: u16,
    other_signatories: &[Address],
    timepoint: Timepoint,
    call_hash: Hash,
) -> CallDescriptor {
    CallDescriptor::new(MULTISIG, "cancel_as_multi")
        .arg("threshold", threshold)
        .arg("other_signatories", Value::accounts(other_signatories))
        .arg("timepoint", timepoint.to_value())
        .arg("call_hash", call_hash)
}

/// Reserve transfer of the native token to `beneficiary` on sibling
/// parachain `para_id`.
pub fn xtokens_transfer(para_id: u32, beneficiary: Address, amount: u128) -> CallDescriptor {
    CallDescriptor::new(XTOKENS, "transfer")
        .arg("currency_id", "SelfReserve")
        .arg("amount", amount)
        .arg(
            "dest",
            Value::Tuple(vec![Value::U32(para_id), Value::Account(beneficiary)]),
        )
}

fn optional_timepoint(timepoint: Option<Timepoint>) -> Value {
    match timepoint {
        Some(tp) => Value::some(tp.to_value()),
        None => Value::none(),
    }
}
