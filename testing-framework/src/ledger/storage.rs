//! Typed readers over [`LedgerClient::query`].

use anyhow::{anyhow, Context, Result};
use para_common::{
    call::Value,
    crypto::{Address, Hash},
    extrinsic::Nonce,
    multisig::{MultisigWallet, Proposal},
};

use super::LedgerClient;

/// `System.Account` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub nonce: Nonce,
    pub free: u128,
    pub reserved: u128,
}

impl AccountInfo {
    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::U32(self.nonce),
            Value::U128(self.free),
            Value::U128(self.reserved),
        ])
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_tuple()? {
            [nonce, free, reserved] => Some(Self {
                nonce: nonce.as_u32()?,
                free: free.as_u128()?,
                reserved: reserved.as_u128()?,
            }),
            _ => None,
        }
    }
}

/// Account state; a missing account reads as all zeroes.
pub async fn account_info<C: LedgerClient + ?Sized>(
    client: &C,
    who: &Address,
) -> Result<AccountInfo> {
    let value = client
        .query("System", "Account", &[Value::Account(*who)])
        .await
        .with_context(|| format!("Failed to query account {}", who))?;

    match value {
        None => Ok(AccountInfo::default()),
        Some(value) => AccountInfo::from_value(&value)
            .ok_or_else(|| anyhow!("Malformed System.Account value for {}: {}", who, value)),
    }
}

pub async fn free_balance<C: LedgerClient + ?Sized>(client: &C, who: &Address) -> Result<u128> {
    Ok(account_info(client, who).await?.free)
}

pub async fn reserved_balance<C: LedgerClient + ?Sized>(client: &C, who: &Address) -> Result<u128> {
    Ok(account_info(client, who).await?.reserved)
}

pub async fn asset_balance<C: LedgerClient + ?Sized>(
    client: &C,
    asset_id: u128,
    who: &Address,
) -> Result<u128> {
    let value = client
        .query("Assets", "Account", &[Value::U128(asset_id), Value::Account(*who)])
        .await
        .with_context(|| format!("Failed to query asset {} balance of {}", asset_id, who))?;

    match value {
        None => Ok(0),
        Some(value) => value
            .as_u128()
            .ok_or_else(|| anyhow!("Malformed Assets.Account value: {}", value)),
    }
}

/// Pending proposal of `wallet` for `call_hash`, if any.
pub async fn multisig_proposal<C: LedgerClient + ?Sized>(
    client: &C,
    wallet: &MultisigWallet,
    call_hash: &Hash,
) -> Result<Option<Proposal>> {
    let value = client
        .query(
            "Multisig",
            "Multisigs",
            &[Value::Account(wallet.address()), Value::Hash(*call_hash)],
        )
        .await
        .with_context(|| format!("Failed to query multisig {}", wallet.address()))?;

    value
        .map(|value| Proposal::from_storage_value(*call_hash, wallet.threshold(), &value))
        .transpose()
        .map_err(Into::into)
}
