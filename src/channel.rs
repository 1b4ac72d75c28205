//! Multicast channel: every registered receiver gets its own copy of every
//! item sent, and drains it at its own pace on its own thread.
//!
//! ```text
//! send(item) ──► Arc<item> ──┬──► backlog A ──► run() on thread A ──► callback A
//!                            ├──► backlog B ──► run() on thread B ──► callback B
//!                            └──► backlog C ──► run() on thread C ──► callback C
//! ```
//!
//! Items are shared, not cloned: each backlog holds an `Arc` to the same value,
//! which is freed once the last receiver is done with it.
//!
//! Backlogs are unbounded. A slow receiver grows its queue without slowing
//! the sender down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a receiver (and of the channel as a whole).
///
/// Ordered: a status only ever moves forward, never back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    /// Accepting and delivering items.
    Running,

    /// No new items; whatever is queued is still delivered.
    Closed,

    /// No new items; whatever is queued is dropped.
    Stopped,
}

impl Status {
    fn for_close(abandon: bool) -> Self {
        if abandon {
            Status::Stopped
        } else {
            Status::Closed
        }
    }
}

/// Identifies a receiver for [`BroadcastChannel::remove_receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Backlog<T> {
    items:  VecDeque<Arc<T>>,
    status: Status,
}

/// The part of a receiver the channel keeps a handle on.
struct Slot<T> {
    id:    ReceiverId,
    queue: Mutex<Backlog<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    /// Move the status forward to `to`. Returns `false` if it already was
    /// there or beyond.
    fn advance(&self, to: Status) -> bool {
        let mut q = self.queue.lock();
        if q.status >= to {
            return false;
        }
        q.status = to;
        self.ready.notify_all();
        true
    }
}

struct Registry<T> {
    slots:  Vec<Arc<Slot<T>>>,
    status: Status,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    next_id:  AtomicU64,
}

impl<T> Shared<T> {
    fn unlink(&self, id: ReceiverId) -> Option<Arc<Slot<T>>> {
        let mut reg = self.registry.lock();
        let pos = reg.slots.iter().position(|s| s.id == id)?;
        Some(reg.slots.swap_remove(pos))
    }
}

// ---------------------------------------------------------------------------
// BroadcastChannel
// ---------------------------------------------------------------------------

/// A channel that fans every item out to all registered receivers.
///
/// Cloning the channel yields another handle to the same receiver set.
pub struct BroadcastChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BroadcastChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for BroadcastChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BroadcastChannel<T> {
    /// Create an open channel with no receivers.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    slots:  Vec::new(),
                    status: Status::Running,
                }),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Send `item` to every running receiver.
    ///
    /// Returns the number of backlogs the item was queued on.
    pub fn send(&self, item: T) -> usize {
        self.send_shared(Arc::new(item))
    }

    /// Send an already shared item to every running receiver.
    ///
    /// The receiver set lock is held only long enough to snapshot it; each
    /// backlog is then locked on its own, so a slow callback never blocks the
    /// sender.
    pub fn send_shared(&self, item: Arc<T>) -> usize {
        let slots = self.shared.registry.lock().slots.clone();
        let mut queued = 0;
        for slot in &slots {
            let mut q = slot.queue.lock();
            if q.status != Status::Running {
                continue;
            }
            q.items.push_back(Arc::clone(&item));
            slot.ready.notify_one();
            queued += 1;
        }
        queued
    }

    /// Register a new receiver that will invoke `callback` for every item
    /// sent from now on.
    ///
    /// The returned handle does nothing until [`Receiver::run`] is called,
    /// usually on a dedicated thread. A receiver created on a closed channel
    /// starts out closed and its `run` returns immediately.
    pub fn create_receiver<F>(&self, callback: F) -> Receiver<T>
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = ReceiverId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let mut reg = self.shared.registry.lock();
        let slot = Arc::new(Slot {
            id,
            queue: Mutex::new(Backlog {
                items:  VecDeque::new(),
                status: reg.status,
            }),
            ready: Condvar::new(),
        });
        reg.slots.push(Arc::clone(&slot));
        drop(reg);

        debug!(receiver = id.0, "receiver registered");
        Receiver {
            slot,
            shared: Arc::clone(&self.shared),
            callback: Box::new(callback),
        }
    }

    /// Close the channel.
    ///
    /// Graceful (`abandon == false`): receivers deliver what is already
    /// queued, then return. Abandon: receivers drop their backlog and return
    /// as soon as they wake. Calling it again is a no-op, except that an
    /// abandon close escalates an earlier graceful one.
    pub fn close(&self, abandon: bool) {
        let to = Status::for_close(abandon);
        let slots = {
            let mut reg = self.shared.registry.lock();
            if reg.status >= to {
                return;
            }
            reg.status = to;
            reg.slots.clone()
        };
        debug!(?to, receivers = slots.len(), "channel closed");
        for slot in &slots {
            slot.advance(to);
        }
    }

    /// Detach one receiver ahead of the channel's own close.
    ///
    /// The receiver is unlinked at once (it gets no further items) and moved
    /// to `Closed`, so its `run` returns after delivering what it already
    /// has. Returns `false` if `id` is not registered.
    pub fn remove_receiver(&self, id: ReceiverId) -> bool {
        match self.shared.unlink(id) {
            Some(slot) => {
                slot.advance(Status::Closed);
                debug!(receiver = id.0, "receiver removed");
                true
            }
            None => false,
        }
    }

    /// Number of receivers currently registered.
    pub fn receiver_count(&self) -> usize {
        self.shared.registry.lock().slots.len()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.registry.lock().status != Status::Running
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// One consumer of a [`BroadcastChannel`].
///
/// Owned by whichever thread runs it. Dropping the handle (which `run` does
/// on return) unlinks it from the channel.
pub struct Receiver<T> {
    slot:     Arc<Slot<T>>,
    shared:   Arc<Shared<T>>,
    callback: Box<dyn FnMut(&T) + Send>,
}

impl<T> Receiver<T> {
    pub fn id(&self) -> ReceiverId {
        self.slot.id
    }

    /// Number of items waiting in this receiver's backlog.
    pub fn backlog(&self) -> usize {
        self.slot.queue.lock().items.len()
    }

    /// Deliver items to the callback until the receiver is closed and
    /// drained, or stopped.
    ///
    /// The backlog lock is released around every callback, so senders and
    /// `remove_receiver` never wait on callback execution.
    pub fn run(mut self) {
        let slot = Arc::clone(&self.slot);
        let mut q = slot.queue.lock();
        let mut delivered = 0usize;
        loop {
            while q.items.is_empty() && q.status == Status::Running {
                slot.ready.wait(&mut q);
            }
            if q.status == Status::Stopped {
                break;
            }
            while let Some(item) = q.items.pop_front() {
                MutexGuard::unlocked(&mut q, || (self.callback)(&*item));
                delivered += 1;
                if q.status == Status::Stopped {
                    break;
                }
            }
            // Closed receivers accept nothing new, so the backlog is empty here
            // unless we stopped mid-drain.
            if q.status != Status::Running {
                break;
            }
        }
        let dropped = q.items.len();
        q.items.clear();
        drop(q);
        trace!(receiver = slot.id.0, delivered, dropped, "receiver finished");
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.unlink(self.slot.id);
    }
}
