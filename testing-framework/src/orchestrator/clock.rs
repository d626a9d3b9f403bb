// Clock abstraction
//
// Everything in the harness that waits (settlement polling, time-driven block
// production in the ledger double) goes through this trait so tests can run
// against paused tokio time.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Source of time for polling loops.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use para_testing_framework::orchestrator::{Clock, PausedClock};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let clock = Arc::new(PausedClock::new());
///     let start = clock.now();
///     clock.advance(Duration::from_secs(12)).await;
///     assert_eq!(clock.now() - start, Duration::from_secs(12));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Current instant (simulated under [`PausedClock`]).
    fn now(&self) -> Instant;

    /// Sleep for `d`.
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Wall-clock time, used against a live node.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Paused tokio time.
///
/// `new()` pauses the runtime clock, so it must be created inside a
/// current-thread runtime that is not already paused: use plain
/// `#[tokio::test]`, not `start_paused = true`. While paused, a sleep with no
/// other runnable task auto-advances time, so a full polling budget of many
/// block times completes instantly.
pub struct PausedClock;

impl PausedClock {
    /// Pause tokio time and return the clock.
    pub fn new() -> Self {
        time::pause();
        Self
    }

    /// Move simulated time forward, waking any sleep that expires.
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}
