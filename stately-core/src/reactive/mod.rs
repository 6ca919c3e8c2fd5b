//! Reactive Primitives
//!
//! Signals and effects: the cells that storage variables are built from and
//! the reactions that write them back.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside an effect
//! registers the effect as a dependent; writing it queues those dependents.
//!
//! ## Effects
//!
//! An Effect runs once on creation, then again on every flush that follows a
//! change to a signal it read.
//!
//! ## Flushing
//!
//! Writes never run effects directly. [`Runtime::flush`] plays the part of
//! the host scheduler's microtask checkpoint, so several writes in one
//! synchronous block cost one effect run.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: a thread-local context stack records
//! which effect is running while signals are read.

mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use context::ReactiveContext;
pub use effect::Effect;
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
pub use subscriber::SubscriberId;
