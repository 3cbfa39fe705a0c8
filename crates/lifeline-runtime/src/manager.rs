#![forbid(unsafe_code)]

//! Manual subscription manager.
//!
//! # Design
//!
//! A [`SignalManager`] belongs to one component. It records every
//! `(signal, target, callback)` subscription the component makes, so the
//! component can query them, disconnect them selectively, or drop all of
//! them (plus its [`NamedTimers`]) with a single [`SignalManager::finalize`]
//! at the end of its life.
//!
//! The manager is a cheap-to-clone handle over `Rc<RefCell<..>>`. No borrow
//! is held while an adapter runs, so callbacks may call back into the same
//! manager.
//!
//! # Invariants
//!
//! 1. Without `force`, connecting an already-recorded live
//!    `(signal, target, callback)` returns the existing [`Subscription`].
//! 2. Every recorded subscription appears exactly once.
//! 3. `disconnect` removes every match from the record, but only calls
//!    `unsubscribe` for handles the target still reports active.
//! 4. `disconnect`, `disconnect_all`, and `finalize` never fail.
//!
//! # Failure Modes
//!
//! | Mode | Condition | Behavior |
//! |------|-----------|----------|
//! | Target dropped | Weak target no longer upgrades | Record removed, no unsubscribe |
//! | Handle gone | Target reports `is_active == false` | Record removed, no unsubscribe |
//! | Stale duplicate | Matching record is inactive on connect | Record replaced by a fresh subscription |
//! | Bad flags | `SWAPPED` or unknown bits in [`ConnectOptions`] | [`ScopeError`], nothing recorded |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use lifeline_core::{
    Callback, ConnectFlags, HandlerId, ObjectId, Scheduler, ScopeError, Subscribable, TimerFlow,
};
use tracing::{debug, trace};

use crate::timers::{NamedTimers, TimerTick};

/// Manager-local subscription number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// One recorded subscription.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    signal: Rc<str>,
    target: Weak<dyn Subscribable>,
    target_id: ObjectId,
    callback: Callback,
    bound_this: Option<Weak<dyn Any>>,
    handler_id: HandlerId,
    flags: ConnectFlags,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("signal", &self.signal)
            .field("target", &self.target_id)
            .field("handler", &self.handler_id)
            .field("flags", &self.flags)
            .field("bound", &self.bound_this.is_some())
            .finish()
    }
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn signal(&self) -> &str {
        &self.signal
    }

    #[must_use]
    pub fn target_id(&self) -> ObjectId {
        self.target_id
    }

    /// The target, if it is still alive.
    #[must_use]
    pub fn target(&self) -> Option<Rc<dyn Subscribable>> {
        self.target.upgrade()
    }

    #[must_use]
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    #[must_use]
    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    #[must_use]
    pub fn flags(&self) -> ConnectFlags {
        self.flags
    }

    /// Receiver the callback is bound to, if any and still alive.
    #[must_use]
    pub fn bound_this(&self) -> Option<Rc<dyn Any>> {
        self.bound_this.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the target still holds this handler.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|t| t.is_active(self.handler_id))
    }

    fn matches(&self, query: &SubscriptionQuery<'_>) -> bool {
        query.signal.is_none_or(|s| &*self.signal == s)
            && query.target.is_none_or(|t| self.target_id == t)
            && query.callback.is_none_or(|c| self.callback.ptr_eq(c))
    }

    fn release(self) {
        match self.target.upgrade() {
            Some(target) if target.is_active(self.handler_id) => {
                target.unsubscribe(self.handler_id);
                trace!(signal = %self.signal, target = %self.target_id, handler = %self.handler_id, "unsubscribed");
            }
            _ => {
                trace!(signal = %self.signal, target = %self.target_id, "subscription already inactive");
            }
        }
    }
}

/// Filter over recorded subscriptions. Every unset field matches anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionQuery<'a> {
    signal: Option<&'a str>,
    target: Option<ObjectId>,
    callback: Option<&'a Callback>,
}

impl<'a> SubscriptionQuery<'a> {
    /// Match every subscription.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signal(mut self, signal: &'a str) -> Self {
        self.signal = Some(signal);
        self
    }

    #[must_use]
    pub fn target<T: Subscribable + ?Sized>(self, target: &Rc<T>) -> Self {
        self.target_id(target.object_id())
    }

    #[must_use]
    pub fn target_id(mut self, id: ObjectId) -> Self {
        self.target = Some(id);
        self
    }

    #[must_use]
    pub fn callback(mut self, callback: &'a Callback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Options for [`SignalManager::connect_with`].
#[derive(Clone, Default)]
pub struct ConnectOptions {
    bind_to: Option<Weak<dyn Any>>,
    force: bool,
    flags: ConnectFlags,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("bind_to", &self.bind_to.is_some())
            .field("force", &self.force)
            .field("flags", &self.flags)
            .finish()
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the callback to `receiver` instead of the manager's owner.
    #[must_use]
    pub fn bind_to<B: Any>(mut self, receiver: &Rc<B>) -> Self {
        let weak: Weak<dyn Any> = Rc::downgrade(receiver) as Weak<dyn Any>;
        self.bind_to = Some(weak);
        self
    }

    /// Always create a new subscription, even if an identical one exists.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: ConnectFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Default)]
struct ManagerState {
    owner: Option<Weak<dyn Any>>,
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

/// Per-component record of explicit subscriptions and named timers.
#[derive(Clone)]
pub struct SignalManager {
    state: Rc<RefCell<ManagerState>>,
    timers: NamedTimers,
}

impl fmt::Debug for SignalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SignalManager")
            .field("subscriptions", &state.subscriptions.len())
            .field("timers", &self.timers.len())
            .field("has_owner", &state.owner.is_some())
            .finish()
    }
}

impl SignalManager {
    /// Create a manager whose timers run on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ManagerState::default())),
            timers: NamedTimers::new(scheduler),
        }
    }

    /// Bind callbacks to `owner` by default.
    #[must_use]
    pub fn with_owner<O: Any>(self, owner: &Rc<O>) -> Self {
        let weak: Weak<dyn Any> = Rc::downgrade(owner) as Weak<dyn Any>;
        self.timers.set_owner(weak.clone());
        self.state.borrow_mut().owner = Some(weak);
        self
    }

    /// Connect `callback` to `signal` on `target`, bound to the owner.
    pub fn connect<T: Subscribable + 'static>(
        &self,
        target: &Rc<T>,
        signal: &str,
        callback: &Callback,
    ) -> Subscription {
        self.connect_checked(target, signal, callback, ConnectOptions::default())
    }

    /// Connect with explicit binding, `force`, and flags.
    ///
    /// # Errors
    ///
    /// [`ScopeError`] if `options` carries unsupported flags. Nothing is
    /// subscribed or recorded in that case.
    pub fn connect_with<T: Subscribable + 'static>(
        &self,
        target: &Rc<T>,
        signal: &str,
        callback: &Callback,
        options: ConnectOptions,
    ) -> Result<Subscription, ScopeError> {
        options.flags.validate(signal)?;
        Ok(self.connect_checked(target, signal, callback, options))
    }

    fn connect_checked<T: Subscribable + 'static>(
        &self,
        target: &Rc<T>,
        signal: &str,
        callback: &Callback,
        options: ConnectOptions,
    ) -> Subscription {
        let target_id = target.object_id();
        if !options.force {
            let query = SubscriptionQuery::any()
                .signal(signal)
                .target_id(target_id)
                .callback(callback);
            if let Some(existing) = self.subscriptions(query).into_iter().next() {
                if existing.is_active() {
                    return existing;
                }
                trace!(signal, target = %target_id, "replacing inactive duplicate");
                self.forget(existing.id);
            }
        }

        let (bound, id) = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            let bound = options.bind_to.or_else(|| state.owner.clone());
            (bound, SubscriptionId(state.next_id))
        };
        let handler_id = target.subscribe(signal, callback.bound_to(bound.clone()), options.flags);
        let weak_target: Weak<dyn Subscribable> = Rc::downgrade(target) as Weak<dyn Subscribable>;
        let subscription = Subscription {
            id,
            signal: Rc::from(signal),
            target: weak_target,
            target_id,
            callback: callback.clone(),
            bound_this: bound,
            handler_id,
            flags: options.flags,
        };
        debug!(signal, target = %target_id, handler = %handler_id, "connected");
        self.state
            .borrow_mut()
            .subscriptions
            .push(subscription.clone());
        subscription
    }

    fn forget(&self, id: SubscriptionId) {
        self.state
            .borrow_mut()
            .subscriptions
            .retain(|s| s.id != id);
    }

    /// Disconnect every subscription matching `query`. Never fails; zero
    /// matches is a no-op.
    pub fn disconnect(&self, query: SubscriptionQuery<'_>) {
        let matched: Vec<Subscription> = {
            let mut state = self.state.borrow_mut();
            let (matched, kept) = std::mem::take(&mut state.subscriptions)
                .into_iter()
                .partition(|s| s.matches(&query));
            state.subscriptions = kept;
            matched
        };
        if matched.is_empty() {
            return;
        }
        debug!(count = matched.len(), "disconnecting");
        for subscription in matched {
            subscription.release();
        }
    }

    /// Disconnect everything this manager recorded.
    pub fn disconnect_all(&self) {
        self.disconnect(SubscriptionQuery::any());
    }

    #[must_use]
    pub fn is_connected(&self, query: SubscriptionQuery<'_>) -> bool {
        !self.subscriptions(query).is_empty()
    }

    /// Recorded subscriptions matching `query`, in connection order.
    #[must_use]
    pub fn subscriptions(&self, query: SubscriptionQuery<'_>) -> Vec<Subscription> {
        self.state
            .borrow()
            .subscriptions
            .iter()
            .filter(|s| s.matches(&query))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().subscriptions.is_empty()
    }

    /// The named timer table owned by this manager.
    #[must_use]
    pub fn timers(&self) -> &NamedTimers {
        &self.timers
    }

    /// Add or replace a named timer bound to the owner.
    pub fn add_named_timer(
        &self,
        name: &str,
        interval: Option<Duration>,
        callback: impl FnMut(&TimerTick<'_>) -> TimerFlow + 'static,
    ) {
        self.timers.add(name, interval, callback);
    }

    /// Add or replace a named timer bound to `receiver`.
    pub fn add_named_timer_bound<B: Any>(
        &self,
        name: &str,
        interval: Option<Duration>,
        receiver: &Rc<B>,
        callback: impl FnMut(&TimerTick<'_>) -> TimerFlow + 'static,
    ) {
        let weak: Weak<dyn Any> = Rc::downgrade(receiver) as Weak<dyn Any>;
        self.timers.add_bound(name, interval, weak, callback);
    }

    pub fn remove_named_timer(&self, name: &str) {
        self.timers.remove(name);
    }

    #[must_use]
    pub fn has_named_timer(&self, name: &str) -> bool {
        self.timers.contains(name)
    }

    /// Live timer names, sorted.
    #[must_use]
    pub fn timer_names(&self) -> Vec<String> {
        self.timers.names()
    }

    pub fn remove_all_named_timers(&self) {
        self.timers.clear();
    }

    /// Disconnect every subscription and cancel every timer. The single call
    /// a component makes at end of life; safe to repeat.
    pub fn finalize(&self) {
        self.disconnect_all();
        self.remove_all_named_timers();
    }
}
