//! Reactive Runtime
//!
//! The runtime connects signals to the effects that read them and decides
//! when those effects run.
//!
//! # How It Works
//!
//! 1. An effect registers with the runtime when it is created.
//!
//! 2. When an effect reads a signal, the runtime records the dependency.
//!
//! 3. When a signal's value changes, the runtime queues every live dependent
//!    effect on the current thread's pending queue. Nothing runs yet.
//!
//! 4. [`Runtime::flush`] drains the queue. An effect queued several times
//!    before a flush runs once, and sees only the latest values.
//!
//! Step 4 stands in for the host scheduler's microtask flush: writes made in
//! one synchronous block collapse into a single effect run.
//!
//! # Thread Safety
//!
//! The dependency tables are global and shared between threads. The pending
//! queue is thread-local, so a flush only runs effects triggered by writes on
//! the flushing thread.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use tracing::trace;

use super::subscriber::SubscriberId;

/// A trait for computations the runtime can queue and run.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Run the computation. Called by [`Runtime::flush`].
    fn run(&self);

    /// Disposed computations are dropped from the queue without running.
    fn is_disposed(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    /// The subscriber this handle keeps registered.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Subscriber ID -> weak reference to the computation.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
// Signal ID -> subscribers that read it during their latest run.
static SIGNAL_SUBSCRIBERS: OnceLock<DashMap<u64, HashSet<SubscriberId>>> = OnceLock::new();

fn get_registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn get_signal_subscribers() -> &'static DashMap<u64, HashSet<SubscriberId>> {
    SIGNAL_SUBSCRIBERS.get_or_init(DashMap::new)
}

/// Effects waiting for the next flush, in the order they were first queued.
#[derive(Default)]
struct PendingQueue {
    order: VecDeque<Arc<dyn Reactive>>,
    queued: HashSet<SubscriberId>,
}

impl PendingQueue {
    fn push(&mut self, reactive: Arc<dyn Reactive>) -> bool {
        if self.queued.insert(reactive.subscriber_id()) {
            self.order.push_back(reactive);
            true
        } else {
            false
        }
    }

    fn pop(&mut self) -> Option<Arc<dyn Reactive>> {
        let reactive = self.order.pop_front()?;
        self.queued.remove(&reactive.subscriber_id());
        Some(reactive)
    }
}

thread_local! {
    static PENDING: RefCell<PendingQueue> = RefCell::new(PendingQueue::default());
}

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: &Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();
        get_registry().insert(id, Arc::downgrade(reactive));
        ReactiveHandle { subscriber_id: id }
    }

    fn unregister(id: SubscriberId) {
        get_registry().remove(&id);

        for mut subs in get_signal_subscribers().iter_mut() {
            subs.remove(&id);
        }
    }

    /// Record that a subscriber depends on a signal.
    ///
    /// Called automatically when a signal is read within a reactive context.
    pub fn add_dependency(signal_id: u64, subscriber_id: SubscriberId) {
        get_signal_subscribers()
            .entry(signal_id)
            .or_default()
            .insert(subscriber_id);
    }

    /// Remove a subscriber from the given signals' dependent sets.
    ///
    /// Called before re-running an effect to clear stale dependencies.
    pub fn clear_dependencies<I>(subscriber_id: SubscriberId, signal_ids: I)
    where
        I: IntoIterator<Item = u64>,
    {
        let subscribers = get_signal_subscribers();
        for signal_id in signal_ids {
            if let Some(mut subs) = subscribers.get_mut(&signal_id) {
                subs.remove(&subscriber_id);
            }
        }
    }

    /// Number of subscribers currently depending on a signal.
    pub fn subscriber_count(signal_id: u64) -> usize {
        get_signal_subscribers()
            .get(&signal_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Queue every live dependent of a signal for the next flush.
    pub fn notify_signal_change(signal_id: u64) {
        let subscriber_ids: Vec<SubscriberId> = match get_signal_subscribers().get(&signal_id) {
            Some(subs) => subs.iter().copied().collect(),
            None => return,
        };

        let registry = get_registry();
        let mut live = Vec::with_capacity(subscriber_ids.len());
        let mut dead = Vec::new();

        for sub_id in subscriber_ids {
            match registry.get(&sub_id).and_then(|weak| weak.upgrade()) {
                Some(reactive) => live.push(reactive),
                None => dead.push(sub_id),
            }
        }

        if !dead.is_empty() {
            Self::clear_dependencies_for(signal_id, &dead);
        }

        for reactive in live {
            Self::enqueue(reactive);
        }
    }

    fn clear_dependencies_for(signal_id: u64, dead: &[SubscriberId]) {
        if let Some(mut subs) = get_signal_subscribers().get_mut(&signal_id) {
            for id in dead {
                subs.remove(id);
            }
        }
    }

    /// Queue a computation on this thread's pending queue.
    ///
    /// Returns `false` when it was already waiting for the next flush.
    pub fn enqueue(reactive: Arc<dyn Reactive>) -> bool {
        PENDING.with(|queue| queue.borrow_mut().push(reactive))
    }

    /// Number of computations waiting for the next flush on this thread.
    pub fn pending_count() -> usize {
        PENDING.with(|queue| queue.borrow().order.len())
    }

    /// Run queued computations until the queue is empty.
    ///
    /// Computations queued while flushing run in the same call. Returns the
    /// number of runs performed.
    pub fn flush() -> usize {
        let mut ran = 0;
        while let Some(reactive) = PENDING.with(|queue| queue.borrow_mut().pop()) {
            if reactive.is_disposed() {
                continue;
            }
            reactive.run();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "flushed pending effects");
        }
        ran
    }
}
