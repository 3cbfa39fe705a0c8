#![forbid(unsafe_code)]

//! Test harness and reference adapters for Lifeline.
//!
//! - [`Emitter`]: in-process signal emitter with optional teardown.
//! - [`VirtualScheduler`]: timer scheduler with a manually driven clock.
//!
//! Both follow the capability contracts in `lifeline-core` strictly and count
//! stale removals, so tests can prove the runtime never unsubscribes or
//! cancels something that is already gone.

pub mod emitter;
pub mod scheduler;

pub use emitter::Emitter;
pub use scheduler::VirtualScheduler;
