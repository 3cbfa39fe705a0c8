#![forbid(unsafe_code)]

//! Runtime: subscription managers, named timers, and the scoped registry.
//!
//! # Role in Lifeline
//! `lifeline-runtime` does the bookkeeping. Given objects that implement the
//! `lifeline-core` capability traits, it records who subscribed to what and
//! guarantees every subscription is released exactly once.
//!
//! # Primary responsibilities
//! - **SignalManager**: per-component record of manual subscriptions, with
//!   query, selective disconnect, and a single `finalize`.
//! - **NamedTimers**: at most one live timer per name, replaced on reuse and
//!   forgotten when the callback stops.
//! - **ScopeRegistry**: subscriptions on an owner that end automatically
//!   when a tracked object or the owner tears down, or at shutdown.
//!
//! # How it fits in the system
//! Shell code owns one [`ScopeRegistry`] at its root and hands
//! [`RegistryHandle`]s to components. Components that want manual control
//! hold a [`SignalManager`] and call [`SignalManager::finalize`] when they
//! are destroyed.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`). Handlers may reenter
//! any operation; no internal borrow outlives an adapter call.

pub mod config;
pub mod manager;
pub mod registry;
pub mod timers;
mod tracker;

pub use config::{DEFAULT_SHUTDOWN_SIGNAL, RegistryConfig};
pub use manager::{
    ConnectOptions, SignalManager, Subscription, SubscriptionId, SubscriptionQuery,
};
pub use registry::{RegistryHandle, RegistrySnapshot, ScopeRegistry, ScopedHandler};
pub use timers::{NamedTimers, TimerTick};
pub use tracker::{EntrySnapshot, TrackerSnapshot};
