//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. When a
//! signal is read inside that window, the effect is recorded as one of the
//! signal's dependents.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per running effect. Entering pushes,
//! dropping the guard pops. Nesting happens when an effect body creates
//! another effect (a persistence effect installed from inside an effect, for
//! example); reads always attribute to the innermost entry.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    subscriber_id: SubscriberId,
    /// Signal IDs read during this run, without duplicates.
    /// Persistence effects read exactly one signal.
    dependencies: SmallVec<[u64; 4]>,
}

/// Guard that pops the context when dropped.
///
/// The stack stays balanced even if the effect body panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// The context is exited when the returned guard is dropped.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: SmallVec::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.subscriber_id))
    }

    /// Record a dependency on the given signal.
    ///
    /// Returns `true` the first time a signal is recorded in the current run.
    pub fn track_dependency(signal_id: u64) -> bool {
        CONTEXT_STACK.with(|stack| match stack.borrow_mut().last_mut() {
            Some(entry) if !entry.dependencies.contains(&signal_id) => {
                entry.dependencies.push(signal_id);
                true
            }
            _ => false,
        })
    }

    /// Get the dependencies collected in the current context.
    pub fn get_dependencies() -> Vec<u64> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn repeated_reads_are_tracked_once() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        assert!(ReactiveContext::track_dependency(7));
        assert!(!ReactiveContext::track_dependency(7));
        assert!(ReactiveContext::track_dependency(8));

        assert_eq!(ReactiveContext::get_dependencies(), vec![7, 8]);
    }

    #[test]
    fn tracking_outside_a_context_is_ignored() {
        assert!(!ReactiveContext::track_dependency(1));
        assert!(ReactiveContext::get_dependencies().is_empty());
    }

    #[test]
    fn nested_contexts_attribute_to_innermost() {
        let outer = SubscriberId::new();
        let inner = SubscriberId::new();

        let _outer_ctx = ReactiveContext::enter(outer);
        ReactiveContext::track_dependency(1);

        {
            let _inner_ctx = ReactiveContext::enter(inner);
            ReactiveContext::track_dependency(2);
            assert_eq!(ReactiveContext::current_subscriber(), Some(inner));
            assert_eq!(ReactiveContext::get_dependencies(), vec![2]);
        }

        assert_eq!(ReactiveContext::current_subscriber(), Some(outer));
        assert_eq!(ReactiveContext::get_dependencies(), vec![1]);
    }
}
