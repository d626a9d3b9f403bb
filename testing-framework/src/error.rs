use thiserror::Error;

/// Failure of a settlement wait.
///
/// `Timeout` is the expected negative outcome ("never happened") and callers
/// may assert on it; `Ledger` means the ledger could not be read at all.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Settlement timeout: {description} not observed after {attempts} attempts")]
    Timeout { description: String, attempts: u32 },

    #[error(transparent)]
    Ledger(#[from] anyhow::Error),
}

impl SettlementError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SettlementError::Timeout { .. })
    }
}
