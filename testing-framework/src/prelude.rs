//! Convenient re-exports for test files.
//!
//! ```rust,ignore
//! use para_testing_framework::prelude::*;
//! ```

pub use std::sync::Arc;
pub use tokio::time::Duration;

pub use crate::assertions::{
    assert_event_in_receipt, assert_free_balance, assert_free_balance_within, assert_nonce,
    assert_rejected_with, assert_success,
};
pub use crate::batch::{BatchBuilder, BatchError, BatchMode};
pub use crate::config::HarnessConfig;
pub use crate::error::SettlementError;
pub use crate::ledger::{storage, LedgerClient, SubmitOptions, TestLedger, TestLedgerBuilder};
pub use crate::multisig::{CallOrHash, MultisigCoordinator, MultisigOutcome};
pub use crate::orchestrator::{Clock, PausedClock, SystemClock};
pub use crate::settlement::{readers, SettlementPolicy, SettlementQuery, SettlementWatcher};
pub use crate::utilities::{fund_account, DevAccounts};

pub use para_common::{
    call::{CallDescriptor, Value},
    calls,
    config::{EXISTENTIAL_DEPOSIT, TRANSACTION_FEE, UNIT},
    crypto::{Address, Hash, KeyPair},
    event::{EventMatcher, LedgerEvent},
    extrinsic::{DispatchError, Receipt, Rejection},
    multisig::{MultisigWallet, ProposalState, Timepoint},
};
