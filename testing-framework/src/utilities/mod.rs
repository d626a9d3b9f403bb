// Testing Utilities
//
// Account setup shared by unit tests, integration tests and scenarios.

use anyhow::{Context, Result};

use para_common::{
    calls,
    config::{ALITH_SECRET, BALTATHAR_SECRET, CHARLETH_SECRET, DOROTHY_SECRET},
    crypto::{Address, CryptoError, KeyPair},
    extrinsic::Receipt,
};

use crate::ledger::{LedgerClient, SubmitOptions};

/// The well-known development signers every dev chain endows at genesis.
#[derive(Clone)]
pub struct DevAccounts {
    pub alith: KeyPair,
    pub baltathar: KeyPair,
    pub charleth: KeyPair,
    pub dorothy: KeyPair,
}

impl DevAccounts {
    pub fn load() -> Result<Self, CryptoError> {
        Ok(Self {
            alith: KeyPair::from_secret_hex(ALITH_SECRET)?,
            baltathar: KeyPair::from_secret_hex(BALTATHAR_SECRET)?,
            charleth: KeyPair::from_secret_hex(CHARLETH_SECRET)?,
            dorothy: KeyPair::from_secret_hex(DOROTHY_SECRET)?,
        })
    }

    pub fn addresses(&self) -> [Address; 4] {
        [
            self.alith.address(),
            self.baltathar.address(),
            self.charleth.address(),
            self.dorothy.address(),
        ]
    }
}

/// Transfer `amount` from `funder` to `to` and require success.
///
/// # Example
///
/// ```rust,ignore
/// let wallet = MultisigCoordinator::derive_wallet(members, 2)?;
/// fund_account(&ledger, &dev.alith, wallet.address(), 100 * UNIT).await?;
/// ```
pub async fn fund_account<C: LedgerClient + ?Sized>(
    client: &C,
    funder: &KeyPair,
    to: Address,
    amount: u128,
) -> Result<Receipt> {
    let receipt = client
        .submit_signed(
            calls::transfer_allow_death(to, amount),
            funder,
            SubmitOptions::default(),
        )
        .await
        .with_context(|| format!("Failed to fund {}", to))?;

    if !receipt.success {
        anyhow::bail!(
            "Funding {} with {} from {} was rejected: {:?}",
            to,
            amount,
            funder.address(),
            receipt.error
        );
    }
    log::debug!("Funded {} with {}", to, amount);
    Ok(receipt)
}
