//! Call dispatch of the ledger double.
//!
//! Models the observable behavior of the pallets the harness drives
//! (balances, assets, utility, multisig, xtokens): state changes, events and
//! dispatch errors. Every dispatch runs inside a storage transaction that is
//! rolled back, events included, when it fails.

use anyhow::{bail, Result};
use parity_scale_codec::Encode;
use std::collections::{BTreeMap, BTreeSet};

use para_common::{
    call::{CallDescriptor, Value},
    calls::{ASSETS, BALANCES, MULTISIG, SYSTEM, UTILITY, XTOKENS},
    config::{
        EXISTENTIAL_DEPOSIT, MAX_BATCH_CALLS, MAX_SIGNATORIES, MULTISIG_DEPOSIT_BASE,
        MULTISIG_DEPOSIT_FACTOR,
    },
    crypto::{blake2_256, Address, Hash},
    event::LedgerEvent,
    extrinsic::{DispatchError, TokenError},
    multisig::{derive_address, Proposal, Timepoint},
};

use super::storage::AccountInfo;
use super::xcm::{XcmMessage, XcmRouter};

pub(super) type DispatchResult = Result<(), DispatchError>;

const KNOWN_CALLS: &[(&str, &str)] = &[
    (SYSTEM, "remark"),
    (SYSTEM, "remark_with_event"),
    (BALANCES, "transfer_allow_death"),
    (BALANCES, "transfer_keep_alive"),
    (ASSETS, "create"),
    (ASSETS, "mint"),
    (ASSETS, "transfer"),
    (UTILITY, "batch"),
    (UTILITY, "batch_all"),
    (MULTISIG, "as_multi_threshold_1"),
    (MULTISIG, "as_multi"),
    (MULTISIG, "approve_as_multi"),
    (MULTISIG, "cancel_as_multi"),
    (XTOKENS, "transfer"),
];

pub(super) fn is_known_call(call: &CallDescriptor) -> bool {
    KNOWN_CALLS
        .iter()
        .any(|(module, function)| call.is(module, function))
}

#[derive(Debug, Clone)]
pub(super) struct AssetDetails {
    pub admin: Address,
    pub min_balance: u128,
    pub supply: u128,
}

/// Where the extrinsic being applied sits, plus what it has emitted so far.
pub(super) struct DispatchContext<'a> {
    pub para_id: u32,
    pub timepoint: Timepoint,
    pub router: &'a XcmRouter,
    pub events: Vec<LedgerEvent>,
}

impl DispatchContext<'_> {
    pub fn emit(&mut self, event: LedgerEvent) {
        let event = event.at_extrinsic(self.timepoint.index);
        log::trace!("event {}", event);
        self.events.push(event);
    }
}

/// Dispatchable storage. Cloned wholesale to open a transaction.
#[derive(Debug, Clone, Default)]
pub(super) struct RuntimeState {
    pub accounts: BTreeMap<Address, AccountInfo>,
    pub assets: BTreeMap<u128, AssetDetails>,
    pub asset_accounts: BTreeMap<(u128, Address), u128>,
    pub multisigs: BTreeMap<(Address, Hash), Proposal>,
    /// Messages sent by the block under construction.
    pub outbound: Vec<XcmMessage>,
    pub xcm_nonce: u64,
}

impl RuntimeState {
    pub fn account(&self, who: &Address) -> AccountInfo {
        self.accounts.get(who).copied().unwrap_or_default()
    }

    fn account_mut(&mut self, who: Address) -> &mut AccountInfo {
        self.accounts.entry(who).or_default()
    }

    /// Run `f` as a storage transaction: on error, state and events are
    /// restored to where they were before.
    pub fn transactional<F>(&mut self, ctx: &mut DispatchContext<'_>, f: F) -> DispatchResult
    where
        F: FnOnce(&mut Self, &mut DispatchContext<'_>) -> DispatchResult,
    {
        let snapshot = self.clone();
        let events_len = ctx.events.len();
        let result = f(self, ctx);
        if result.is_err() {
            *self = snapshot;
            ctx.events.truncate(events_len);
        }
        result
    }

    pub fn dispatch(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        match (call.module(), call.function()) {
            (SYSTEM, "remark") => {
                param(call, "remark")?;
                Ok(())
            }
            (SYSTEM, "remark_with_event") => {
                let remark = bytes_param(call, "remark")?;
                ctx.emit(
                    LedgerEvent::new(SYSTEM, "Remarked")
                        .with_field("sender", origin)
                        .with_field("hash", blake2_256(remark)),
                );
                Ok(())
            }
            (BALANCES, "transfer_allow_death") => self.transfer(
                ctx,
                origin,
                account_param(call, "dest")?,
                u128_param(call, "value")?,
                false,
            ),
            (BALANCES, "transfer_keep_alive") => self.transfer(
                ctx,
                origin,
                account_param(call, "dest")?,
                u128_param(call, "value")?,
                true,
            ),
            (ASSETS, "create") => self.asset_create(ctx, origin, call),
            (ASSETS, "mint") => self.asset_mint(ctx, origin, call),
            (ASSETS, "transfer") => self.asset_transfer(ctx, origin, call),
            (UTILITY, "batch") => self.batch(ctx, origin, calls_param(call, "calls")?),
            (UTILITY, "batch_all") => self.batch_all(ctx, origin, calls_param(call, "calls")?),
            (MULTISIG, "as_multi_threshold_1") => self.as_multi_threshold_1(ctx, origin, call),
            (MULTISIG, "as_multi") => {
                let inner = call_param(call, "call")?;
                self.operate(ctx, origin, call, inner.call_hash(), Some(inner))
            }
            (MULTISIG, "approve_as_multi") => {
                let call_hash = hash_param(call, "call_hash")?;
                self.operate(ctx, origin, call, call_hash, None)
            }
            (MULTISIG, "cancel_as_multi") => self.cancel_as_multi(ctx, origin, call),
            (XTOKENS, "transfer") => self.xtokens_transfer(ctx, origin, call),
            (module, function) => Err(DispatchError::Other(format!(
                "Call not found: {}.{}",
                module, function
            ))),
        }
    }

    // ===== Balances =====

    /// Take `amount` of free balance. Without `keep_alive` the account may
    /// drop below the existential deposit, in which case the dust is burned.
    pub fn withdraw(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        who: Address,
        amount: u128,
        keep_alive: bool,
    ) -> DispatchResult {
        let account = self.account(&who);
        let remaining = account
            .free
            .checked_sub(amount)
            .ok_or(DispatchError::Token(TokenError::FundsUnavailable))?;

        if remaining < EXISTENTIAL_DEPOSIT && account.reserved == 0 {
            if keep_alive {
                return Err(DispatchError::Token(TokenError::NotExpendable));
            }
            self.account_mut(who).free = 0;
            if remaining > 0 {
                ctx.emit(
                    LedgerEvent::new(BALANCES, "DustLost")
                        .with_field("account", who)
                        .with_field("amount", remaining),
                );
            }
        } else {
            self.account_mut(who).free = remaining;
        }
        Ok(())
    }

    /// Credit `amount`. A dead account must receive at least the existential
    /// deposit. Returns the `Endowed` event when the account is created.
    fn credit(&mut self, who: Address, amount: u128) -> Result<Option<LedgerEvent>, DispatchError> {
        let account = self.account(&who);
        let is_new = account.free == 0 && account.reserved == 0;
        if is_new && amount < EXISTENTIAL_DEPOSIT {
            return Err(DispatchError::Token(TokenError::BelowMinimum));
        }

        let free = account.free.checked_add(amount).ok_or_else(overflow)?;
        self.account_mut(who).free = free;

        Ok(is_new.then(|| {
            LedgerEvent::new(BALANCES, "Endowed")
                .with_field("account", who)
                .with_field("free_balance", free)
        }))
    }

    fn transfer(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        from: Address,
        to: Address,
        amount: u128,
        keep_alive: bool,
    ) -> DispatchResult {
        self.withdraw(ctx, from, amount, keep_alive)?;
        if let Some(endowed) = self.credit(to, amount)? {
            ctx.emit(endowed);
        }
        ctx.emit(
            LedgerEvent::new(BALANCES, "Transfer")
                .with_field("from", from)
                .with_field("to", to)
                .with_field("amount", amount),
        );
        Ok(())
    }

    fn reserve(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        who: Address,
        amount: u128,
    ) -> DispatchResult {
        let account = self.account_mut(who);
        let free = account
            .free
            .checked_sub(amount)
            .ok_or_else(|| DispatchError::module(BALANCES, "InsufficientBalance"))?;
        account.reserved = account.reserved.checked_add(amount).ok_or_else(overflow)?;
        account.free = free;
        ctx.emit(
            LedgerEvent::new(BALANCES, "Reserved")
                .with_field("who", who)
                .with_field("amount", amount),
        );
        Ok(())
    }

    fn unreserve(&mut self, ctx: &mut DispatchContext<'_>, who: Address, amount: u128) {
        let account = self.account_mut(who);
        let amount = amount.min(account.reserved);
        account.reserved -= amount;
        account.free = account.free.saturating_add(amount);
        ctx.emit(
            LedgerEvent::new(BALANCES, "Unreserved")
                .with_field("who", who)
                .with_field("amount", amount),
        );
    }

    // ===== Assets =====

    fn asset_create(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        let id = u128_param(call, "id")?;
        let admin = account_param(call, "admin")?;
        let min_balance = u128_param(call, "min_balance")?;

        if self.assets.contains_key(&id) {
            return Err(DispatchError::module(ASSETS, "InUse"));
        }
        if min_balance == 0 {
            return Err(DispatchError::module(ASSETS, "MinBalanceZero"));
        }

        self.assets.insert(
            id,
            AssetDetails {
                admin,
                min_balance,
                supply: 0,
            },
        );
        ctx.emit(
            LedgerEvent::new(ASSETS, "Created")
                .with_field("asset_id", id)
                .with_field("creator", origin)
                .with_field("owner", admin),
        );
        Ok(())
    }

    fn asset_credit(&mut self, id: u128, who: Address, amount: u128) -> DispatchResult {
        let details = self
            .assets
            .get(&id)
            .ok_or(DispatchError::Token(TokenError::UnknownAsset))?;
        let balance = self.asset_accounts.get(&(id, who)).copied().unwrap_or(0);
        let credited = balance.checked_add(amount).ok_or_else(overflow)?;
        if credited < details.min_balance {
            return Err(DispatchError::Token(TokenError::BelowMinimum));
        }
        self.asset_accounts.insert((id, who), credited);
        Ok(())
    }

    fn asset_mint(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        let id = u128_param(call, "id")?;
        let beneficiary = account_param(call, "beneficiary")?;
        let amount = u128_param(call, "amount")?;

        let details = self
            .assets
            .get(&id)
            .ok_or(DispatchError::Token(TokenError::UnknownAsset))?;
        if details.admin != origin {
            return Err(DispatchError::module(ASSETS, "NoPermission"));
        }

        let supply = details.supply.checked_add(amount).ok_or_else(overflow)?;
        self.asset_credit(id, beneficiary, amount)?;
        if let Some(details) = self.assets.get_mut(&id) {
            details.supply = supply;
        }
        ctx.emit(
            LedgerEvent::new(ASSETS, "Issued")
                .with_field("asset_id", id)
                .with_field("owner", beneficiary)
                .with_field("amount", amount),
        );
        Ok(())
    }

    fn asset_transfer(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        let id = u128_param(call, "id")?;
        let target = account_param(call, "target")?;
        let amount = u128_param(call, "amount")?;

        let min_balance = self
            .assets
            .get(&id)
            .map(|details| details.min_balance)
            .ok_or(DispatchError::Token(TokenError::UnknownAsset))?;
        let balance = self.asset_accounts.get(&(id, origin)).copied().unwrap_or(0);
        let remaining = balance
            .checked_sub(amount)
            .ok_or_else(|| DispatchError::module(ASSETS, "BalanceLow"))?;

        // A remainder below the minimum balance reaps the sender and moves with the transfer
        let amount = if remaining < min_balance {
            self.asset_accounts.remove(&(id, origin));
            balance
        } else {
            self.asset_accounts.insert((id, origin), remaining);
            amount
        };
        self.asset_credit(id, target, amount)?;

        ctx.emit(
            LedgerEvent::new(ASSETS, "Transferred")
                .with_field("asset_id", id)
                .with_field("from", origin)
                .with_field("to", target)
                .with_field("amount", amount),
        );
        Ok(())
    }

    // ===== Utility =====

    fn batch(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        calls: &[CallDescriptor],
    ) -> DispatchResult {
        if calls.len() > MAX_BATCH_CALLS {
            return Err(DispatchError::module(UTILITY, "TooManyCalls"));
        }
        for (index, call) in calls.iter().enumerate() {
            match self.transactional(ctx, |state, ctx| state.dispatch(ctx, origin, call)) {
                Ok(()) => ctx.emit(LedgerEvent::new(UTILITY, "ItemCompleted")),
                Err(error) => {
                    // Earlier calls stay applied; the extrinsic itself succeeds
                    ctx.emit(
                        LedgerEvent::new(UTILITY, "BatchInterrupted")
                            .with_field("index", index as u32)
                            .with_field("error", error.to_value()),
                    );
                    return Ok(());
                }
            }
        }
        ctx.emit(LedgerEvent::new(UTILITY, "BatchCompleted"));
        Ok(())
    }

    fn batch_all(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        calls: &[CallDescriptor],
    ) -> DispatchResult {
        if calls.len() > MAX_BATCH_CALLS {
            return Err(DispatchError::module(UTILITY, "TooManyCalls"));
        }
        for call in calls {
            self.dispatch(ctx, origin, call)?;
            ctx.emit(LedgerEvent::new(UTILITY, "ItemCompleted"));
        }
        ctx.emit(LedgerEvent::new(UTILITY, "BatchCompleted"));
        Ok(())
    }

    // ===== Multisig =====

    fn as_multi_threshold_1(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        let other = accounts_param(call, "other_signatories")?;
        let inner = call_param(call, "call")?;

        let signatories = checked_signatories(other, origin)?;
        let id = derive_address(&signatories, 1);
        self.dispatch(ctx, id, inner)
    }

    /// Shared body of `as_multi` and `approve_as_multi`.
    fn operate(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        who: Address,
        call: &CallDescriptor,
        call_hash: Hash,
        inner: Option<&CallDescriptor>,
    ) -> DispatchResult {
        let threshold = u16_param(call, "threshold")?;
        let other = accounts_param(call, "other_signatories")?;
        let maybe_timepoint = optional_timepoint_param(call, "maybe_timepoint")?;

        if threshold < 2 {
            return Err(DispatchError::module(MULTISIG, "MinimumThreshold"));
        }
        let signatories = checked_signatories(other, who)?;
        let id = derive_address(&signatories, threshold);

        let Some(mut entry) = self.multisigs.get(&(id, call_hash)).cloned() else {
            if maybe_timepoint.is_some() {
                return Err(DispatchError::module(MULTISIG, "UnexpectedTimepoint"));
            }
            let deposit = MULTISIG_DEPOSIT_BASE + MULTISIG_DEPOSIT_FACTOR * threshold as u128;
            self.reserve(ctx, who, deposit)?;
            self.multisigs.insert(
                (id, call_hash),
                Proposal {
                    call_hash,
                    timepoint: ctx.timepoint,
                    depositor: who,
                    deposit,
                    approvals: BTreeSet::from([who]),
                    threshold,
                },
            );
            ctx.emit(
                LedgerEvent::new(MULTISIG, "NewMultisig")
                    .with_field("approving", who)
                    .with_field("multisig", id)
                    .with_field("call_hash", call_hash),
            );
            return Ok(());
        };

        let timepoint =
            maybe_timepoint.ok_or_else(|| DispatchError::module(MULTISIG, "NoTimepoint"))?;
        if entry.timepoint != timepoint {
            return Err(DispatchError::module(MULTISIG, "WrongTimepoint"));
        }

        let is_new_approval = !entry.approvals.contains(&who);
        let approvals = entry.approvals.len() + usize::from(is_new_approval);

        match inner {
            Some(inner) if approvals >= threshold as usize => {
                self.multisigs.remove(&(id, call_hash));
                self.unreserve(ctx, entry.depositor, entry.deposit);
                let result = self.transactional(ctx, |state, ctx| state.dispatch(ctx, id, inner));
                ctx.emit(
                    LedgerEvent::new(MULTISIG, "MultisigExecuted")
                        .with_field("approving", who)
                        .with_field("timepoint", timepoint.to_value())
                        .with_field("multisig", id)
                        .with_field("call_hash", call_hash)
                        .with_field("result", DispatchError::result_to_value(&result)),
                );
                Ok(())
            }
            _ if is_new_approval => {
                entry.approvals.insert(who);
                self.multisigs.insert((id, call_hash), entry);
                ctx.emit(
                    LedgerEvent::new(MULTISIG, "MultisigApproval")
                        .with_field("approving", who)
                        .with_field("timepoint", timepoint.to_value())
                        .with_field("multisig", id)
                        .with_field("call_hash", call_hash),
                );
                Ok(())
            }
            _ => Err(DispatchError::module(MULTISIG, "AlreadyApproved")),
        }
    }

    fn cancel_as_multi(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        who: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        let threshold = u16_param(call, "threshold")?;
        let other = accounts_param(call, "other_signatories")?;
        let timepoint = Timepoint::from_value(param(call, "timepoint")?)
            .ok_or_else(|| malformed(call, "timepoint"))?;
        let call_hash = hash_param(call, "call_hash")?;

        if threshold < 2 {
            return Err(DispatchError::module(MULTISIG, "MinimumThreshold"));
        }
        let signatories = checked_signatories(other, who)?;
        let id = derive_address(&signatories, threshold);

        let entry = self
            .multisigs
            .get(&(id, call_hash))
            .cloned()
            .ok_or_else(|| DispatchError::module(MULTISIG, "NotFound"))?;
        if entry.timepoint != timepoint {
            return Err(DispatchError::module(MULTISIG, "WrongTimepoint"));
        }
        if entry.depositor != who {
            return Err(DispatchError::module(MULTISIG, "NotOwner"));
        }

        self.multisigs.remove(&(id, call_hash));
        self.unreserve(ctx, entry.depositor, entry.deposit);
        ctx.emit(
            LedgerEvent::new(MULTISIG, "MultisigCancelled")
                .with_field("cancelling", who)
                .with_field("timepoint", timepoint.to_value())
                .with_field("multisig", id)
                .with_field("call_hash", call_hash),
        );
        Ok(())
    }

    // ===== XTokens =====

    fn xtokens_transfer(
        &mut self,
        ctx: &mut DispatchContext<'_>,
        origin: Address,
        call: &CallDescriptor,
    ) -> DispatchResult {
        let currency = param(call, "currency_id")?
            .as_text()
            .ok_or_else(|| malformed(call, "currency_id"))?;
        let amount = u128_param(call, "amount")?;
        let (dest, beneficiary) = match param(call, "dest")?.as_tuple() {
            Some([para, beneficiary]) => (
                para.as_u32().ok_or_else(|| malformed(call, "dest"))?,
                beneficiary.as_account().ok_or_else(|| malformed(call, "dest"))?,
            ),
            _ => return Err(malformed(call, "dest")),
        };

        if currency != "SelfReserve" {
            return Err(DispatchError::module(XTOKENS, "NotCrossReserveAsset"));
        }
        if amount == 0 {
            return Err(DispatchError::module(XTOKENS, "ZeroAmount"));
        }
        if dest == ctx.para_id || !ctx.router.is_registered(dest) {
            return Err(DispatchError::module(XTOKENS, "InvalidDest"));
        }

        self.withdraw(ctx, origin, amount, false)?;

        self.xcm_nonce += 1;
        let hash =
            (ctx.para_id, dest, beneficiary, amount, self.xcm_nonce).using_encoded(blake2_256);
        self.outbound.push(XcmMessage {
            origin: ctx.para_id,
            dest,
            beneficiary,
            amount,
            hash,
        });

        ctx.emit(
            LedgerEvent::new(XTOKENS, "TransferredAssets")
                .with_field("sender", origin)
                .with_field("beneficiary", beneficiary)
                .with_field("dest", dest)
                .with_field("amount", amount),
        );
        ctx.emit(LedgerEvent::new("XcmpQueue", "XcmpMessageSent").with_field("message_hash", hash));
        Ok(())
    }

    /// Execute an inbound transfer during block initialization.
    pub fn receive_xcm(&mut self, message: &XcmMessage) -> Vec<LedgerEvent> {
        match self.credit(message.beneficiary, message.amount) {
            Ok(endowed) => endowed
                .into_iter()
                .chain([
                    LedgerEvent::new(BALANCES, "Minted")
                        .with_field("who", message.beneficiary)
                        .with_field("amount", message.amount),
                    LedgerEvent::new("XcmpQueue", "Success")
                        .with_field("message_hash", message.hash),
                ])
                .collect(),
            Err(error) => {
                log::warn!("XCM {} failed on arrival: {}", message.hash, error);
                vec![LedgerEvent::new("XcmpQueue", "Fail")
                    .with_field("message_hash", message.hash)
                    .with_field("error", error.to_value())]
            }
        }
    }

    // ===== Storage =====

    pub fn storage_value(&self, module: &str, item: &str, keys: &[Value]) -> Result<Option<Value>> {
        let value = match (module, item, keys) {
            ("System", "Account", [who]) => {
                let who = key_account(who)?;
                self.accounts.get(&who).map(AccountInfo::to_value)
            }
            ("Assets", "Asset", [id]) => self.assets.get(&key_u128(id)?).map(|details| {
                Value::Tuple(vec![
                    Value::Account(details.admin),
                    Value::U128(details.min_balance),
                    Value::U128(details.supply),
                ])
            }),
            ("Assets", "Account", [id, who]) => self
                .asset_accounts
                .get(&(key_u128(id)?, key_account(who)?))
                .map(|balance| Value::U128(*balance)),
            ("Multisig", "Multisigs", [wallet, call_hash]) => {
                let call_hash = call_hash
                    .as_hash()
                    .ok_or_else(|| anyhow::anyhow!("Expected a hash key, got {}", call_hash))?;
                self.multisigs
                    .get(&(key_account(wallet)?, call_hash))
                    .map(Proposal::to_storage_value)
            }
            _ => bail!("Unknown storage item {}.{} with {} keys", module, item, keys.len()),
        };
        Ok(value)
    }
}

/// Sort check on `other` and insertion of `who` at its canonical position.
fn checked_signatories(
    other: Vec<Address>,
    who: Address,
) -> Result<BTreeSet<Address>, DispatchError> {
    if other.is_empty() {
        return Err(DispatchError::module(MULTISIG, "TooFewSignatories"));
    }
    if other.len() + 1 > MAX_SIGNATORIES as usize {
        return Err(DispatchError::module(MULTISIG, "TooManySignatories"));
    }

    let mut last: Option<Address> = None;
    for item in &other {
        if last.is_some_and(|last| last >= *item) {
            return Err(DispatchError::module(MULTISIG, "SignatoriesOutOfOrder"));
        }
        if *item == who {
            return Err(DispatchError::module(MULTISIG, "SenderInSignatories"));
        }
        last = Some(*item);
    }

    let mut signatories: BTreeSet<Address> = other.into_iter().collect();
    signatories.insert(who);
    Ok(signatories)
}

fn overflow() -> DispatchError {
    DispatchError::Other("Arithmetic overflow".to_string())
}

fn key_account(key: &Value) -> Result<Address> {
    key.as_account()
        .ok_or_else(|| anyhow::anyhow!("Expected an account key, got {}", key))
}

fn key_u128(key: &Value) -> Result<u128> {
    key.as_u128()
        .ok_or_else(|| anyhow::anyhow!("Expected a u128 key, got {}", key))
}

fn malformed(call: &CallDescriptor, name: &str) -> DispatchError {
    DispatchError::Other(format!(
        "Malformed call {}.{}: parameter `{}`",
        call.module(),
        call.function(),
        name
    ))
}

fn param<'c>(call: &'c CallDescriptor, name: &str) -> Result<&'c Value, DispatchError> {
    call.get(name).ok_or_else(|| malformed(call, name))
}

fn account_param(call: &CallDescriptor, name: &str) -> Result<Address, DispatchError> {
    param(call, name)?
        .as_account()
        .ok_or_else(|| malformed(call, name))
}

fn accounts_param(call: &CallDescriptor, name: &str) -> Result<Vec<Address>, DispatchError> {
    param(call, name)?
        .as_accounts()
        .ok_or_else(|| malformed(call, name))
}

fn u16_param(call: &CallDescriptor, name: &str) -> Result<u16, DispatchError> {
    param(call, name)?
        .as_u16()
        .ok_or_else(|| malformed(call, name))
}

fn u128_param(call: &CallDescriptor, name: &str) -> Result<u128, DispatchError> {
    param(call, name)?
        .as_u128()
        .ok_or_else(|| malformed(call, name))
}

fn hash_param(call: &CallDescriptor, name: &str) -> Result<Hash, DispatchError> {
    param(call, name)?
        .as_hash()
        .ok_or_else(|| malformed(call, name))
}

fn bytes_param<'c>(call: &'c CallDescriptor, name: &str) -> Result<&'c [u8], DispatchError> {
    param(call, name)?
        .as_bytes()
        .ok_or_else(|| malformed(call, name))
}

fn call_param<'c>(
    call: &'c CallDescriptor,
    name: &str,
) -> Result<&'c CallDescriptor, DispatchError> {
    param(call, name)?
        .as_call()
        .ok_or_else(|| malformed(call, name))
}

fn calls_param<'c>(
    call: &'c CallDescriptor,
    name: &str,
) -> Result<&'c [CallDescriptor], DispatchError> {
    param(call, name)?
        .as_calls()
        .ok_or_else(|| malformed(call, name))
}

fn optional_timepoint_param(
    call: &CallDescriptor,
    name: &str,
) -> Result<Option<Timepoint>, DispatchError> {
    match param(call, name)?.as_optional() {
        Some(None) => Ok(None),
        Some(Some(value)) => Timepoint::from_value(value)
            .map(Some)
            .ok_or_else(|| malformed(call, name)),
        None => Err(malformed(call, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use para_common::calls;

    fn addr(id: u8) -> Address {
        Address::new([id; 20])
    }

    fn funded(accounts: &[(Address, u128)]) -> RuntimeState {
        let mut state = RuntimeState::default();
        for (who, free) in accounts {
            state.accounts.insert(
                *who,
                AccountInfo {
                    nonce: 0,
                    free: *free,
                    reserved: 0,
                },
            );
        }
        state
    }

    fn ctx(router: &XcmRouter) -> DispatchContext<'_> {
        DispatchContext {
            para_id: 1000,
            timepoint: Timepoint::new(1, 1),
            router,
            events: Vec::new(),
        }
    }

    const AMOUNT: u128 = 10 * EXISTENTIAL_DEPOSIT;

    #[test]
    fn test_transfer_moves_funds_and_endows() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), 100 * EXISTENTIAL_DEPOSIT)]);

        let call = calls::transfer_allow_death(addr(2), AMOUNT);
        state.dispatch(&mut ctx, addr(1), &call).unwrap();

        assert_eq!(state.account(&addr(1)).free, 90 * EXISTENTIAL_DEPOSIT);
        assert_eq!(state.account(&addr(2)).free, AMOUNT);
        let names: Vec<&str> = ctx.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Endowed", "Transfer"]);
        assert!(ctx.events.iter().all(|e| e.extrinsic_index == Some(1)));
    }

    #[test]
    fn test_transfer_below_existential_deposit_to_new_account() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), AMOUNT)]);

        let call = calls::transfer_allow_death(addr(2), EXISTENTIAL_DEPOSIT - 1);
        assert_eq!(
            state.transactional(&mut ctx, |s, ctx| s.dispatch(ctx, addr(1), &call)),
            Err(DispatchError::Token(TokenError::BelowMinimum))
        );
        // rolled back
        assert_eq!(state.account(&addr(1)).free, AMOUNT);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_keep_alive_refuses_to_reap() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), AMOUNT)]);

        let call = calls::transfer_keep_alive(addr(2), AMOUNT);
        assert_eq!(
            state.dispatch(&mut ctx, addr(1), &call),
            Err(DispatchError::Token(TokenError::NotExpendable))
        );
    }

    #[test]
    fn test_batch_all_is_all_or_nothing() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), 3 * AMOUNT)]);

        let call = calls::batch_all(vec![
            calls::transfer_allow_death(addr(2), AMOUNT),
            calls::transfer_allow_death(addr(3), 100 * AMOUNT),
        ]);
        let result = state.transactional(&mut ctx, |s, ctx| s.dispatch(ctx, addr(1), &call));
        assert_eq!(result, Err(DispatchError::Token(TokenError::FundsUnavailable)));
        assert_eq!(state.account(&addr(2)).free, 0);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_batch_keeps_prefix_and_reports_interruption() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), 3 * AMOUNT)]);

        let call = calls::batch(vec![
            calls::transfer_allow_death(addr(2), AMOUNT),
            calls::transfer_allow_death(addr(3), 100 * AMOUNT),
            calls::transfer_allow_death(addr(4), AMOUNT),
        ]);
        state.dispatch(&mut ctx, addr(1), &call).unwrap();

        assert_eq!(state.account(&addr(2)).free, AMOUNT);
        assert_eq!(state.account(&addr(3)).free, 0);
        assert_eq!(state.account(&addr(4)).free, 0);

        let interrupted = ctx
            .events
            .iter()
            .find(|e| e.is(UTILITY, "BatchInterrupted"))
            .unwrap();
        assert_eq!(interrupted.field("index"), Some(&Value::U32(1)));
        assert!(!ctx.events.iter().any(|e| e.is(UTILITY, "BatchCompleted")));
    }

    #[test]
    fn test_asset_create_then_mint_in_one_batch() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), AMOUNT)]);

        let call = calls::batch_all(vec![
            calls::asset_create(7, addr(1), 1),
            calls::asset_mint(7, addr(2), 500),
        ]);
        state.dispatch(&mut ctx, addr(1), &call).unwrap();
        assert_eq!(state.asset_accounts.get(&(7, addr(2))), Some(&500));
        assert_eq!(state.assets.get(&7).map(|a| a.supply), Some(500));

        // reversed order fails: the asset does not exist yet
        let mut state = funded(&[(addr(1), AMOUNT)]);
        let call = calls::batch_all(vec![
            calls::asset_mint(7, addr(2), 500),
            calls::asset_create(7, addr(1), 1),
        ]);
        assert_eq!(
            state.dispatch(&mut ctx, addr(1), &call),
            Err(DispatchError::Token(TokenError::UnknownAsset))
        );
    }

    #[test]
    fn test_asset_mint_overflow_is_a_dispatch_error() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), AMOUNT)]);

        let call = calls::batch_all(vec![
            calls::asset_create(7, addr(1), 1),
            calls::asset_mint(7, addr(1), u128::MAX),
        ]);
        state.dispatch(&mut ctx, addr(1), &call).unwrap();

        let more = calls::asset_mint(7, addr(2), 1);
        assert_eq!(
            state.transactional(&mut ctx, |s, ctx| s.dispatch(ctx, addr(1), &more)),
            Err(DispatchError::Other("Arithmetic overflow".to_string()))
        );
        assert_eq!(state.assets.get(&7).map(|a| a.supply), Some(u128::MAX));
        assert_eq!(state.asset_accounts.get(&(7, addr(2))), None);

        let onto_full = calls::asset_transfer(7, addr(1), 1);
        state.asset_accounts.insert((7, addr(2)), 5);
        assert_eq!(
            state.transactional(&mut ctx, |s, ctx| s.dispatch(ctx, addr(2), &onto_full)),
            Err(DispatchError::Other("Arithmetic overflow".to_string()))
        );
        assert_eq!(state.asset_accounts.get(&(7, addr(2))), Some(&5));
    }

    #[test]
    fn test_asset_transfer_sweeps_remainder_below_minimum() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), AMOUNT)]);

        let setup = calls::batch_all(vec![
            calls::asset_create(7, addr(1), 10),
            calls::asset_mint(7, addr(1), 100),
        ]);
        state.dispatch(&mut ctx, addr(1), &setup).unwrap();

        state
            .dispatch(&mut ctx, addr(1), &calls::asset_transfer(7, addr(2), 95))
            .unwrap();
        assert_eq!(state.asset_accounts.get(&(7, addr(1))), None);
        assert_eq!(state.asset_accounts.get(&(7, addr(2))), Some(&100));
        let transferred = ctx.events.iter().rev().find(|e| e.is("Assets", "Transferred"));
        assert_eq!(
            transferred.and_then(|e| e.field("amount")),
            Some(&Value::U128(100))
        );

        // A remainder at the minimum stays with the sender
        state
            .dispatch(&mut ctx, addr(2), &calls::asset_transfer(7, addr(3), 90))
            .unwrap();
        assert_eq!(state.asset_accounts.get(&(7, addr(2))), Some(&10));
        assert_eq!(state.asset_accounts.get(&(7, addr(3))), Some(&90));
    }

    #[test]
    fn test_signatories_must_be_sorted_without_sender() {
        assert_eq!(
            checked_signatories(vec![addr(3), addr(2)], addr(1)),
            Err(DispatchError::module(MULTISIG, "SignatoriesOutOfOrder"))
        );
        assert_eq!(
            checked_signatories(vec![addr(1), addr(2)], addr(1)),
            Err(DispatchError::module(MULTISIG, "SenderInSignatories"))
        );
        assert_eq!(
            checked_signatories(vec![], addr(1)),
            Err(DispatchError::module(MULTISIG, "TooFewSignatories"))
        );
        assert_eq!(
            checked_signatories(vec![addr(2), addr(3)], addr(1)).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_approve_as_multi_requires_existing_timepoint() {
        let router = XcmRouter::new();
        let mut ctx = ctx(&router);
        let mut state = funded(&[(addr(1), 100 * AMOUNT), (addr(2), 100 * AMOUNT)]);

        let hash = Hash::new([5; 32]);
        let call = calls::approve_as_multi(2, &[addr(2)], Some(Timepoint::new(9, 9)), hash);
        assert_eq!(
            state.dispatch(&mut ctx, addr(1), &call),
            Err(DispatchError::module(MULTISIG, "UnexpectedTimepoint"))
        );

        let open = calls::approve_as_multi(2, &[addr(2)], None, hash);
        state.dispatch(&mut ctx, addr(1), &open).unwrap();
        let deposit = MULTISIG_DEPOSIT_BASE + 2 * MULTISIG_DEPOSIT_FACTOR;
        assert_eq!(state.account(&addr(1)).reserved, deposit);

        let no_tp = calls::approve_as_multi(2, &[addr(1)], None, hash);
        assert_eq!(
            state.dispatch(&mut ctx, addr(2), &no_tp),
            Err(DispatchError::module(MULTISIG, "NoTimepoint"))
        );
        let again = calls::approve_as_multi(2, &[addr(2)], Some(Timepoint::new(1, 1)), hash);
        assert_eq!(
            state.dispatch(&mut ctx, addr(1), &again),
            Err(DispatchError::module(MULTISIG, "AlreadyApproved"))
        );
    }

    #[test]
    fn test_inbound_xcm_below_minimum_fails() {
        let mut state = RuntimeState::default();
        let message = XcmMessage {
            origin: 1000,
            dest: 2000,
            beneficiary: addr(9),
            amount: EXISTENTIAL_DEPOSIT - 1,
            hash: Hash::zero(),
        };
        let events = state.receive_xcm(&message);
        assert_eq!(events.len(), 1);
        assert!(events[0].is("XcmpQueue", "Fail"));
        assert_eq!(state.account(&addr(9)).free, 0);
    }

    #[test]
    fn test_unknown_storage_item() {
        let state = RuntimeState::default();
        assert!(state.storage_value("Nope", "Nothing", &[]).is_err());
        assert_eq!(
            state
                .storage_value("System", "Account", &[Value::Account(addr(1))])
                .unwrap(),
            None
        );
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use para_common::calls;
    use proptest::prelude::*;

    fn addr(id: u8) -> Address {
        Address::new([id; 20])
    }

    /// (recipient, amount) over four accounts, amounts in tenths of the
    /// existential deposit so dust is reachable.
    fn arb_transfer() -> impl Strategy<Value = (u8, u128)> {
        (1u8..=4, 1u128..=400).prop_map(|(to, tenths)| (to, tenths * EXISTENTIAL_DEPOSIT / 10))
    }

    fn total(state: &RuntimeState) -> u128 {
        state.accounts.values().map(|a| a.free + a.reserved).sum()
    }

    proptest! {
        #[test]
        fn prop_batch_conserves_balance(
            transfers in prop::collection::vec(arb_transfer(), 1..12),
            atomic in any::<bool>(),
        ) {
            let router = XcmRouter::new();
            let mut ctx = DispatchContext {
                para_id: 1000,
                timepoint: Timepoint::new(1, 1),
                router: &router,
                events: Vec::new(),
            };
            let mut state = RuntimeState::default();
            for id in 1..=2u8 {
                state.accounts.insert(
                    addr(id),
                    AccountInfo { nonce: 0, free: 20 * EXISTENTIAL_DEPOSIT, reserved: 0 },
                );
            }
            let before = total(&state);

            // Every call is signed by account 1; the others only receive
            let calls: Vec<CallDescriptor> = transfers
                .iter()
                .map(|(to, amount)| calls::transfer_allow_death(addr(*to), *amount))
                .collect();
            let batch = if atomic { calls::batch_all(calls) } else { calls::batch(calls) };
            let _ = state.transactional(&mut ctx, |s, ctx| s.dispatch(ctx, addr(1), &batch));

            let dust: u128 = ctx
                .events
                .iter()
                .filter(|e| e.is(BALANCES, "DustLost"))
                .filter_map(|e| e.field("amount").and_then(|v| v.as_u128()))
                .sum();
            prop_assert_eq!(total(&state) + dust, before);

            // No live account is left below the existential deposit
            for account in state.accounts.values() {
                prop_assert!(account.free == 0 || account.free >= EXISTENTIAL_DEPOSIT);
            }
        }
    }
}
