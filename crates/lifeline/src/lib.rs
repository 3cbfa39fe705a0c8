#![forbid(unsafe_code)]

//! Lifeline: lifecycle-scoped signal subscriptions.
//!
//! Desktop shells connect handlers to long-lived objects (settings, monitor
//! managers, DBus proxies) on behalf of short-lived ones (widgets, panels).
//! Lifeline records those subscriptions and releases each of them exactly
//! once, when the short-lived object goes away, when the long-lived one
//! does, or when the application shuts down.
//!
//! # Crates
//!
//! - [`lifeline_core`]: capability traits ([`Subscribable`], [`Teardownable`],
//!   [`Scheduler`]), identities, callbacks, flags, [`ScopeError`].
//! - [`lifeline_runtime`]: [`SignalManager`], [`NamedTimers`], [`ScopeRegistry`].
//!
//! # Quick start
//!
//! ```ignore
//! use lifeline::prelude::*;
//!
//! let registry = ScopeRegistry::new(RegistryConfig::from_env());
//! registry.attach_shutdown(&app);
//! registry.connect_scoped(
//!     &settings,
//!     &[ScopedHandler::new("changed::font", on_font_changed)],
//!     &label,
//! )?;
//! // `label` torn down: the handler on `settings` is gone too.
//! ```

pub use lifeline_core;
pub use lifeline_runtime;

pub use lifeline_core::{
    Callback, ConnectFlags, DEFAULT_TEARDOWN_SIGNAL, Emission, Handler, HandlerId, ObjectId,
    Scheduler, ScopeError, SourceId, Subscribable, Teardownable, TimerFlow,
};
pub use lifeline_runtime::{
    ConnectOptions, DEFAULT_SHUTDOWN_SIGNAL, EntrySnapshot, NamedTimers, RegistryConfig,
    RegistryHandle, RegistrySnapshot, ScopeRegistry, ScopedHandler, SignalManager, Subscription,
    SubscriptionId, SubscriptionQuery, TimerTick, TrackerSnapshot,
};

/// The types most shell code needs.
pub mod prelude {
    pub use crate::{
        Callback, ConnectFlags, ConnectOptions, Emission, RegistryConfig, RegistryHandle,
        ScopeError, ScopeRegistry, ScopedHandler, SignalManager, Subscribable, SubscriptionQuery,
        Teardownable, TimerFlow, TimerTick,
    };
}
