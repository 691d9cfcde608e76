//! EventChannel — bounded drop-oldest handoff from the hook thread.
//!
//! The hook thread must never stall keyboard input waiting on the UI, so a
//! full queue evicts its oldest pending event instead of blocking. Delivery
//! order is fire order. The consumer polls with [`EventReceiver::try_recv`]
//! from its own tick and never blocks either.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::shortcut::ShortcutId;

/// Smallest capacity a channel is built with.
pub const MIN_CAPACITY: usize = 4;

/// A registered shortcut was observed by the hook thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredEvent {
    pub shortcut_id: ShortcutId,
    pub timestamp: Instant,
}

impl FiredEvent {
    pub fn new(shortcut_id: ShortcutId) -> Self {
        Self {
            shortcut_id,
            timestamp: Instant::now(),
        }
    }
}

/// Result of [`EventSender::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full; `evicted` was dropped to make room. Policy, not a
    /// delivery failure.
    Overflowed { evicted: FiredEvent },
    /// The receiver is gone; the event was not queued.
    Disconnected,
}

struct Shared {
    queue: Mutex<VecDeque<FiredEvent>>,
    capacity: usize,
    dropped: AtomicU64,
    sender_alive: AtomicBool,
    receiver_alive: AtomicBool,
}

/// Producer half, owned by the hook thread.
pub struct EventSender {
    shared: Arc<Shared>,
}

/// Consumer half, owned by the presentation loop.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

/// Create a channel holding at most `capacity` pending events
/// (raised to [`MIN_CAPACITY`] if smaller).
pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
    let capacity = capacity.max(MIN_CAPACITY);
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        dropped: AtomicU64::new(0),
        sender_alive: AtomicBool::new(true),
        receiver_alive: AtomicBool::new(true),
    });
    (
        EventSender {
            shared: Arc::clone(&shared),
        },
        EventReceiver { shared },
    )
}

impl EventSender {
    /// Enqueue `event`, evicting the oldest pending one if full.
    ///
    /// Overflow is logged at `warn` with the running drop count so it is
    /// distinguishable from a disconnect.
    pub fn push(&self, event: FiredEvent) -> PushOutcome {
        if !self.shared.receiver_alive.load(Ordering::Acquire) {
            return PushOutcome::Disconnected;
        }

        let evicted = {
            let mut queue = self.shared.queue.lock();
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(event);
            evicted
        };

        match evicted {
            Some(evicted) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    reason = "channel_overflow",
                    evicted_id = %evicted.shortcut_id,
                    dropped_total = dropped,
                    capacity = self.shared.capacity,
                    "dropped oldest fired event"
                );
                PushOutcome::Overflowed { evicted }
            }
            None => PushOutcome::Queued,
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.receiver_alive.load(Ordering::Acquire)
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        self.shared.sender_alive.store(false, Ordering::Release);
    }
}

impl EventReceiver {
    /// Take the oldest pending event, if any. Never blocks on the producer
    /// beyond the queue's short critical section.
    pub fn try_recv(&self) -> Option<FiredEvent> {
        self.shared.queue.lock().pop_front()
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<FiredEvent> {
        self.shared.queue.lock().drain(..).collect()
    }

    /// Events evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// `true` once the sender is gone and nothing is left to read.
    pub fn is_terminated(&self) -> bool {
        !self.shared.sender_alive.load(Ordering::Acquire) && self.shared.queue.lock().is_empty()
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.shared.receiver_alive.store(false, Ordering::Release);
    }
}
