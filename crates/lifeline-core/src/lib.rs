#![forbid(unsafe_code)]

//! Core: capability contracts, identities, and signal types.
//!
//! # Role in Lifeline
//! `lifeline-core` is the contract layer. It defines what an object must
//! provide to take part in subscription bookkeeping, and the small value
//! types that flow between emitters, managers, and the registry.
//!
//! # Primary responsibilities
//! - **Subscribable**: uniform subscribe / unsubscribe / liveness contract
//!   every emitter adapter implements.
//! - **Teardownable**: opt-in marker for emitters that fire a one-time
//!   teardown notification before becoming unusable.
//! - **Scheduler**: schedule / cancel / liveness contract for timers.
//! - **Identity**: [`ObjectId`], [`HandlerId`], [`SourceId`].
//! - **Errors**: [`ScopeError`], the only error the subscription layer raises.
//!
//! # How it fits in the system
//! Widget toolkits, DBus proxies, and compositor objects implement the
//! traits here. `lifeline-runtime` consumes them and never branches on the
//! concrete shape of an object.

pub mod capability;
pub mod error;
pub mod identity;
pub mod signal;

pub use capability::{DEFAULT_TEARDOWN_SIGNAL, Scheduler, Subscribable, Teardownable};
pub use error::ScopeError;
pub use identity::{HandlerId, ObjectId, SourceId};
pub use signal::{Callback, ConnectFlags, Emission, Handler, TimerFlow};
