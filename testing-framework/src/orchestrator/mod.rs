//! Time control shared by the ledger double and the settlement watcher.

/// Clock abstraction for deterministic time control in tests
pub mod clock;

pub use clock::{Clock, PausedClock, SystemClock};
