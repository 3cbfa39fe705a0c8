#![forbid(unsafe_code)]

//! Capability contracts every emitter and scheduler adapter satisfies.
//!
//! # Invariants
//!
//! 1. `unsubscribe` on an unknown or already-removed [`HandlerId`] is
//!    harmless. Callers still check [`Subscribable::is_active`] first so an
//!    adapter that logs stale removals stays quiet.
//! 2. An adapter never holds an internal borrow while invoking a handler.
//!    Handlers may subscribe, unsubscribe, or tear down reentrantly.
//! 3. A [`Teardownable`] object fires its teardown signal at most once,
//!    before it becomes unusable.
//! 4. `Scheduler::cancel` is only called on sources that
//!    `Scheduler::is_scheduled` reports live.
//!
//! Teardown support is opt-in: an adapter declares it by implementing
//! [`Teardownable`] and returning `Some(self)` from
//! [`Subscribable::as_teardownable`]. Objects that do not are never
//! auto-tracked.

use std::time::Duration;

use crate::identity::{HandlerId, ObjectId, SourceId};
use crate::signal::{ConnectFlags, Handler, TimerFlow};

/// Signal name used by [`Teardownable`] adapters unless they override it.
pub const DEFAULT_TEARDOWN_SIGNAL: &str = "destroy";

/// An object that broadcasts named signals.
pub trait Subscribable {
    /// Reference identity of this object.
    fn object_id(&self) -> ObjectId;

    /// Register `handler` for `signal`. `flags` has already been validated.
    fn subscribe(&self, signal: &str, handler: Handler, flags: ConnectFlags) -> HandlerId;

    /// Remove a handler.
    fn unsubscribe(&self, id: HandlerId);

    /// Whether `id` is still registered. Adapters that cannot tell report
    /// `true`.
    fn is_active(&self, id: HandlerId) -> bool {
        let _ = id;
        true
    }

    /// Teardown capability, if this adapter declares one.
    fn as_teardownable(&self) -> Option<&dyn Teardownable> {
        None
    }
}

/// An emitter that fires a one-time notification before becoming unusable.
pub trait Teardownable: Subscribable {
    fn teardown_signal(&self) -> &str {
        DEFAULT_TEARDOWN_SIGNAL
    }

    /// Subscribe to the teardown notification.
    fn subscribe_teardown(&self, handler: Handler) -> HandlerId {
        self.subscribe(self.teardown_signal(), handler, ConnectFlags::empty())
    }
}

/// Timer and idle source scheduler driven by the event loop.
pub trait Scheduler {
    /// Schedule `callback`. `None` runs it at the next idle opportunity;
    /// `Some(interval)` runs it every `interval`. The source is removed when
    /// the callback returns [`TimerFlow::Break`].
    fn schedule(
        &self,
        interval: Option<Duration>,
        callback: Box<dyn FnMut() -> TimerFlow>,
    ) -> SourceId;

    /// Remove a live source.
    fn cancel(&self, id: SourceId);

    /// Whether `id` is still scheduled.
    fn is_scheduled(&self, id: SourceId) -> bool;
}
