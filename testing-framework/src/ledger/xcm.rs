//! In-process stand-in for the relay's message queues between sibling
//! parachains.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use para_common::crypto::{Address, Hash};

/// A native-token reserve transfer in flight between two parachains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XcmMessage {
    pub origin: u32,
    pub dest: u32,
    pub beneficiary: Address,
    pub amount: u128,
    pub hash: Hash,
}

struct InFlight {
    message: XcmMessage,
    remaining_blocks: u32,
}

struct Inbox {
    delivery_delay: u32,
    queue: VecDeque<InFlight>,
}

/// Shared between every ledger built with
/// [`TestLedgerBuilder::sibling_of`](super::TestLedgerBuilder::sibling_of).
///
/// A message becomes deliverable once the destination has sealed its
/// configured number of blocks after the message was sent.
#[derive(Clone, Default)]
pub struct XcmRouter {
    inboxes: Arc<Mutex<HashMap<u32, Inbox>>>,
}

impl XcmRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn inboxes(&self) -> MutexGuard<'_, HashMap<u32, Inbox>> {
        self.inboxes.lock()
    }

    /// Returns false if `para_id` is already registered.
    pub(super) fn register(&self, para_id: u32, delivery_delay: u32) -> bool {
        let mut inboxes = self.inboxes();
        if inboxes.contains_key(&para_id) {
            return false;
        }
        inboxes.insert(
            para_id,
            Inbox {
                delivery_delay: delivery_delay.max(1),
                queue: VecDeque::new(),
            },
        );
        true
    }

    pub fn is_registered(&self, para_id: u32) -> bool {
        self.inboxes().contains_key(&para_id)
    }

    /// Queue a message. Messages for unknown destinations are dropped.
    pub(super) fn send(&self, message: XcmMessage) {
        let mut inboxes = self.inboxes();
        match inboxes.get_mut(&message.dest) {
            Some(inbox) => {
                log::debug!(
                    "XCM {} queued {} -> {} ({} blocks)",
                    message.hash,
                    message.origin,
                    message.dest,
                    inbox.delivery_delay
                );
                let remaining_blocks = inbox.delivery_delay;
                inbox.queue.push_back(InFlight {
                    message,
                    remaining_blocks,
                });
            }
            None => log::warn!("XCM {} dropped: para {} unknown", message.hash, message.dest),
        }
    }

    /// Called once per block sealed by `para_id`: ages its inbox and returns
    /// the messages due in this block, in send order.
    pub(super) fn take_due(&self, para_id: u32) -> Vec<XcmMessage> {
        let mut inboxes = self.inboxes();
        let Some(inbox) = inboxes.get_mut(&para_id) else {
            return Vec::new();
        };

        let mut due = Vec::new();
        let mut waiting = VecDeque::with_capacity(inbox.queue.len());
        for mut in_flight in inbox.queue.drain(..) {
            in_flight.remaining_blocks = in_flight.remaining_blocks.saturating_sub(1);
            if in_flight.remaining_blocks == 0 {
                due.push(in_flight.message);
            } else {
                waiting.push_back(in_flight);
            }
        }
        inbox.queue = waiting;
        due
    }

    pub fn in_flight(&self, para_id: u32) -> usize {
        self.inboxes()
            .get(&para_id)
            .map(|inbox| inbox.queue.len())
            .unwrap_or(0)
    }
}
