//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a signal
//! it read during its latest run changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies. This first firing always happens, with whatever
//!    the signals currently hold.
//!
//! 2. When any dependency changes, the effect is queued on the runtime.
//!
//! 3. On [`Runtime::flush`], the effect clears its old dependencies and
//!    tracks new ones while running.
//!
//! Effects are how reactive state reaches the outside world; storage
//! write-back is one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::SubscriberId;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    /// Signal IDs read during the latest run.
    dependencies: RwLock<HashSet<u64>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let stale: Vec<u64> = self.dependencies.write().drain().collect();
        Runtime::clear_dependencies(self.subscriber_id, stale);

        let new_deps: HashSet<u64> = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (self.run)();
            ReactiveContext::get_dependencies().into_iter().collect()
        };

        *self.dependencies.write() = new_deps;
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn run(&self) {
        self.execute();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The effect stays registered while any clone of it is alive.
///
/// # Example
///
/// ```rust
/// use stately_core::reactive::{Effect, Runtime, Signal};
///
/// let count = Signal::new(0);
/// let effect = {
///     let count = count.clone();
///     Effect::new(move || println!("count is {}", count.get()))
/// };
///
/// count.set(5);
/// Runtime::flush(); // prints "count is 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
    _handle: Arc<ReactiveHandle>,
}

impl Effect {
    /// Create a new effect and run it once.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: RwLock::new(HashSet::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });

        let reactive: Arc<dyn Reactive> = inner.clone();
        let handle = Runtime::register(&reactive);

        let effect = Self {
            inner,
            _handle: Arc::new(handle),
        };
        effect.execute();
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the effect function now, re-tracking dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Queue the effect for the next flush.
    pub fn schedule(&self) {
        if !self.is_disposed() {
            Runtime::enqueue(self.inner.clone());
        }
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        let stale: Vec<u64> = self.inner.dependencies.write().drain().collect();
        Runtime::clear_dependencies(self.inner.subscriber_id, stale);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
