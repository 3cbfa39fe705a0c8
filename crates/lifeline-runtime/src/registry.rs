#![forbid(unsafe_code)]

//! Lifecycle-scoped subscription registry.
//!
//! # Design
//!
//! [`ScopeRegistry`] is the process-scoped context that owns every
//! [`Tracker`]. The application constructs one at start, holds it at its
//! root, and drops it at stop. Components reach it through a
//! [`RegistryHandle`] rather than ambient global state.
//!
//! [`ScopeRegistry::connect_scoped`] subscribes handlers on an **owner** and
//! files the handler ids under a **tracked** object. The subscriptions end,
//! exactly once, at the first of:
//!
//! - an explicit [`ScopeRegistry::disconnect_scoped`],
//! - the tracked object's teardown notification,
//! - the owner's teardown notification (clears the whole tracker),
//! - the application shutdown signal, or the registry being dropped.
//!
//! ```text
//! ScopeRegistry
//!   └─ owner ObjectId ─▶ Tracker ──(owner teardown)──▶ clear + prune
//!                          └─ tracked ObjectId ─▶ TrackedEntry
//!                                                   ├─ handler ids on owner
//!                                                   └─ teardown wiring on tracked
//! ```
//!
//! # Invariants
//!
//! 1. The registry never holds a tracker with zero entries.
//! 2. Teardown wiring is installed at most once per tracked object per
//!    tracker, and at most once per owner.
//! 3. No registry borrow is held across an adapter call; teardown handlers
//!    may reenter any registry operation.
//! 4. Clearing a tracker iterates a snapshot of its keys and skips keys a
//!    reentrant call already removed.
//! 5. Only unsupported flags produce an error, and they do so before any
//!    subscription is made.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use lifeline_core::{
    Callback, ConnectFlags, Emission, Handler, HandlerId, ObjectId, ScopeError, Subscribable,
};
use tracing::{debug, debug_span, trace, warn};

use crate::config::RegistryConfig;
use crate::tracker::{Tracker, TrackerSnapshot};

/// One `(signal, callback, flags)` triple for [`ScopeRegistry::connect_scoped`].
#[derive(Debug, Clone)]
pub struct ScopedHandler {
    signal: String,
    callback: Callback,
    flags: ConnectFlags,
}

impl ScopedHandler {
    pub fn new(signal: impl Into<String>, callback: Callback) -> Self {
        Self {
            signal: signal.into(),
            callback,
            flags: ConnectFlags::empty(),
        }
    }

    /// Run after the emitter's default handlers.
    #[must_use]
    pub fn after(mut self) -> Self {
        self.flags |= ConnectFlags::AFTER;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ConnectFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn signal(&self) -> &str {
        &self.signal
    }

    #[must_use]
    pub fn flags(&self) -> ConnectFlags {
        self.flags
    }
}

impl<S: Into<String>> From<(S, Callback)> for ScopedHandler {
    fn from((signal, callback): (S, Callback)) -> Self {
        Self::new(signal, callback)
    }
}

/// Diagnostic view of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrySnapshot {
    /// Trackers ordered by owner id.
    pub trackers: Vec<TrackerSnapshot>,
    pub shutdown_hooked: bool,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.trackers.iter().map(|t| t.entries.len()).sum()
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.trackers.iter().map(TrackerSnapshot::handler_count).sum()
    }
}

struct ShutdownHook {
    app: Weak<dyn Subscribable>,
    handler: HandlerId,
}

struct RegistryState {
    config: RegistryConfig,
    trackers: HashMap<ObjectId, Tracker>,
    shutdown_hook: Option<ShutdownHook>,
}

struct RegistryCore {
    state: RefCell<RegistryState>,
}

impl RegistryCore {
    fn ensure_tracker(self: &Rc<Self>, owner: &Rc<dyn Subscribable>) {
        let owner_id = owner.object_id();
        {
            let mut state = self.state.borrow_mut();
            if state.trackers.contains_key(&owner_id) {
                return;
            }
            state.trackers.insert(owner_id, Tracker::new(owner));
        }
        debug!(owner = %owner_id, "tracker created");

        let Some(teardown) = owner.as_teardownable() else {
            return;
        };
        let core = Rc::downgrade(self);
        let handler: Handler = Rc::new(move |_: &Emission<'_>| {
            if let Some(core) = core.upgrade() {
                core.owner_torn_down(owner_id);
            }
        });
        let id = teardown.subscribe_teardown(handler);
        let installed = match self.state.borrow_mut().trackers.get_mut(&owner_id) {
            Some(tracker) => {
                tracker.set_owner_teardown(id);
                true
            }
            None => false,
        };
        if !installed && owner.is_active(id) {
            owner.unsubscribe(id);
        }
    }

    fn connect_scoped(
        self: &Rc<Self>,
        owner: &Rc<dyn Subscribable>,
        handlers: &[ScopedHandler],
        tracked: &Rc<dyn Subscribable>,
        bind: Weak<dyn Any>,
    ) -> Result<(), ScopeError> {
        for handler in handlers {
            handler.flags.validate(&handler.signal)?;
        }

        let owner_id = owner.object_id();
        let tracked_id = tracked.object_id();
        self.ensure_tracker(owner);

        let ids: Vec<HandlerId> = handlers
            .iter()
            .map(|h| {
                owner.subscribe(
                    &h.signal,
                    h.callback.bound_to(Some(bind.clone())),
                    h.flags,
                )
            })
            .collect();

        let orphaned = {
            let mut state = self.state.borrow_mut();
            match state.trackers.get_mut(&owner_id) {
                Some(tracker) => {
                    tracker.track(tracked, ids);
                    None
                }
                None => Some(ids),
            }
        };
        if let Some(ids) = orphaned {
            debug!(owner = %owner_id, "owner torn down while connecting; releasing");
            for id in ids {
                if owner.is_active(id) {
                    owner.unsubscribe(id);
                }
            }
            return Ok(());
        }
        debug!(
            owner = %owner_id,
            tracked = %tracked_id,
            handlers = handlers.len(),
            "scoped handlers connected"
        );

        let Some(teardown) = tracked.as_teardownable() else {
            return Ok(());
        };
        let needs_wiring = self
            .state
            .borrow()
            .trackers
            .get(&owner_id)
            .is_some_and(|t| t.needs_teardown_wiring(tracked_id));
        if !needs_wiring {
            return Ok(());
        }

        let core = Rc::downgrade(self);
        let handler: Handler = Rc::new(move |_: &Emission<'_>| {
            if let Some(core) = core.upgrade() {
                trace!(owner = %owner_id, tracked = %tracked_id, "tracked object torn down");
                core.disconnect_scoped(owner_id, tracked_id);
            }
        });
        let id = teardown.subscribe_teardown(handler);
        let installed = self
            .state
            .borrow_mut()
            .trackers
            .get_mut(&owner_id)
            .is_some_and(|t| t.set_entry_teardown(tracked_id, id));
        if !installed && tracked.is_active(id) {
            tracked.unsubscribe(id);
        }
        Ok(())
    }

    fn disconnect_scoped(&self, owner_id: ObjectId, tracked_id: ObjectId) {
        let (owner, entry, pruned) = {
            let mut state = self.state.borrow_mut();
            let Some(tracker) = state.trackers.get_mut(&owner_id) else {
                trace!(owner = %owner_id, "no tracker for owner");
                return;
            };
            let Some(entry) = tracker.untrack(tracked_id) else {
                trace!(owner = %owner_id, tracked = %tracked_id, "object not tracked");
                return;
            };
            let owner = tracker.owner();
            let emptied = tracker.is_empty();
            let pruned = if emptied {
                state.trackers.remove(&owner_id)
            } else {
                None
            };
            (owner, entry, pruned)
        };

        entry.release(owner.as_ref());
        debug!(owner = %owner_id, tracked = %tracked_id, "scoped handlers disconnected");
        if let Some(tracker) = pruned {
            debug!(owner = %owner_id, "tracker pruned");
            tracker.dismantle();
        }
    }

    /// Owner teardown: untrack everything, then drop the tracker.
    fn owner_torn_down(&self, owner_id: ObjectId) {
        let _span = debug_span!("clear_tracker", owner = %owner_id).entered();
        let keys = match self.state.borrow().trackers.get(&owner_id) {
            Some(tracker) => tracker.keys(),
            None => return,
        };
        for tracked_id in keys {
            self.disconnect_scoped(owner_id, tracked_id);
        }
        let leftover = self.state.borrow_mut().trackers.remove(&owner_id);
        if let Some(tracker) = leftover {
            tracker.dismantle();
        }
    }

    fn shutdown(&self) {
        let (mut owners, report_leaks) = {
            let state = self.state.borrow();
            let owners: Vec<ObjectId> = state.trackers.keys().copied().collect();
            (owners, state.config.report_leaks)
        };
        if owners.is_empty() {
            return;
        }
        owners.sort();
        if report_leaks {
            warn!(count = owners.len(), ?owners, "owners still tracked at shutdown");
        } else {
            debug!(count = owners.len(), "destroying remaining trackers");
        }
        for owner_id in owners {
            self.owner_torn_down(owner_id);
        }
        let rest: Vec<Tracker> = self
            .state
            .borrow_mut()
            .trackers
            .drain()
            .map(|(_, t)| t)
            .collect();
        for tracker in rest {
            tracker.dismantle();
        }
    }

    fn attach_shutdown(self: &Rc<Self>, app: &Rc<dyn Subscribable>) {
        let signal = {
            let state = self.state.borrow();
            if state.shutdown_hook.is_some() {
                trace!("shutdown hook already attached");
                return;
            }
            state.config.shutdown_signal.clone()
        };
        let core = Rc::downgrade(self);
        let handler: Handler = Rc::new(move |_: &Emission<'_>| {
            if let Some(core) = core.upgrade() {
                core.shutdown();
            }
        });
        let id = app.subscribe(&signal, handler, ConnectFlags::empty());
        debug!(app = %app.object_id(), signal = %signal, "shutdown hook attached");
        self.state.borrow_mut().shutdown_hook = Some(ShutdownHook {
            app: Rc::downgrade(app),
            handler: id,
        });
    }

    fn detach_shutdown(&self) {
        let hook = self.state.borrow_mut().shutdown_hook.take();
        if let Some(hook) = hook {
            if let Some(app) = hook.app.upgrade() {
                if app.is_active(hook.handler) {
                    app.unsubscribe(hook.handler);
                }
            }
        }
    }
}

fn erase<T: Subscribable + 'static>(object: &Rc<T>) -> Rc<dyn Subscribable> {
    object.clone()
}

fn receiver<T: Any>(object: &Rc<T>) -> Weak<dyn Any> {
    Rc::downgrade(object) as Weak<dyn Any>
}

/// Process-scoped registry of trackers.
///
/// Dropping the registry detaches the shutdown hook and destroys every
/// remaining tracker.
pub struct ScopeRegistry {
    core: Rc<RegistryCore>,
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.borrow();
        f.debug_struct("ScopeRegistry")
            .field("trackers", &state.trackers.len())
            .field("shutdown_hooked", &state.shutdown_hook.is_some())
            .field("config", &state.config)
            .finish()
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ScopeRegistry {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            core: Rc::new(RegistryCore {
                state: RefCell::new(RegistryState {
                    config,
                    trackers: HashMap::new(),
                    shutdown_hook: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.core.state.borrow().config.clone()
    }

    /// Non-owning handle for components and callbacks.
    #[must_use]
    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            core: Rc::downgrade(&self.core),
        }
    }

    /// Subscribe each handler on `owner`, scoped to the lifetime of
    /// `tracked`. Callbacks are bound to `tracked`.
    ///
    /// # Errors
    ///
    /// [`ScopeError`] if any handler carries unsupported flags. Nothing is
    /// subscribed in that case.
    pub fn connect_scoped<O, T>(
        &self,
        owner: &Rc<O>,
        handlers: &[ScopedHandler],
        tracked: &Rc<T>,
    ) -> Result<(), ScopeError>
    where
        O: Subscribable + 'static,
        T: Subscribable + 'static,
    {
        self.core
            .connect_scoped(&erase(owner), handlers, &erase(tracked), receiver(tracked))
    }

    /// Drop every scoped handler `owner` holds on behalf of `tracked`.
    /// No-op if nothing is tracked.
    pub fn disconnect_scoped<O, T>(&self, owner: &Rc<O>, tracked: &Rc<T>)
    where
        O: Subscribable + ?Sized,
        T: Subscribable + ?Sized,
    {
        self.core
            .disconnect_scoped(owner.object_id(), tracked.object_id());
    }

    #[must_use]
    pub fn is_tracking<O, T>(&self, owner: &Rc<O>, tracked: &Rc<T>) -> bool
    where
        O: Subscribable + ?Sized,
        T: Subscribable + ?Sized,
    {
        self.core
            .state
            .borrow()
            .trackers
            .get(&owner.object_id())
            .is_some_and(|t| t.contains(tracked.object_id()))
    }

    /// Diagnostic view of `owner`'s tracker, if it has one. Trackers are
    /// created by [`Self::connect_scoped`], never empty.
    #[must_use]
    pub fn tracker<O: Subscribable + ?Sized>(&self, owner: &Rc<O>) -> Option<TrackerSnapshot> {
        self.core
            .state
            .borrow()
            .trackers
            .get(&owner.object_id())
            .map(Tracker::snapshot)
    }

    #[must_use]
    pub fn has_tracker<O: Subscribable + ?Sized>(&self, owner: &Rc<O>) -> bool {
        self.core
            .state
            .borrow()
            .trackers
            .contains_key(&owner.object_id())
    }

    /// Number of objects `owner` tracks.
    #[must_use]
    pub fn tracked_count<O: Subscribable + ?Sized>(&self, owner: &Rc<O>) -> usize {
        self.core
            .state
            .borrow()
            .trackers
            .get(&owner.object_id())
            .map_or(0, Tracker::len)
    }

    #[must_use]
    pub fn tracker_count(&self) -> usize {
        self.core.state.borrow().trackers.len()
    }

    /// Listen once for the application's shutdown signal (see
    /// [`RegistryConfig::shutdown_signal`]) and destroy every tracker when
    /// it fires. Repeated calls are no-ops.
    pub fn attach_shutdown<A: Subscribable + 'static>(&self, app: &Rc<A>) {
        self.core.attach_shutdown(&erase(app));
    }

    /// Destroy every remaining tracker now.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.core.state.borrow();
        let mut trackers: Vec<TrackerSnapshot> =
            state.trackers.values().map(Tracker::snapshot).collect();
        trackers.sort_by_key(|t| t.owner);
        RegistrySnapshot {
            trackers,
            shutdown_hooked: state.shutdown_hook.is_some(),
        }
    }
}

impl Drop for ScopeRegistry {
    fn drop(&mut self) {
        self.core.detach_shutdown();
        self.core.shutdown();
    }
}

/// Weak handle to a [`ScopeRegistry`]. Every operation is a no-op once the
/// registry is gone.
#[derive(Clone)]
pub struct RegistryHandle {
    core: Weak<RegistryCore>,
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl RegistryHandle {
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.core.strong_count() > 0
    }

    /// See [`ScopeRegistry::connect_scoped`]. Flags are validated even when
    /// the registry is gone.
    ///
    /// # Errors
    ///
    /// [`ScopeError`] for unsupported flags.
    pub fn connect_scoped<O, T>(
        &self,
        owner: &Rc<O>,
        handlers: &[ScopedHandler],
        tracked: &Rc<T>,
    ) -> Result<(), ScopeError>
    where
        O: Subscribable + 'static,
        T: Subscribable + 'static,
    {
        match self.core.upgrade() {
            Some(core) => {
                core.connect_scoped(&erase(owner), handlers, &erase(tracked), receiver(tracked))
            }
            None => {
                for handler in handlers {
                    handler.flags.validate(&handler.signal)?;
                }
                trace!("registry gone; scoped connect dropped");
                Ok(())
            }
        }
    }

    /// See [`ScopeRegistry::disconnect_scoped`].
    pub fn disconnect_scoped<O, T>(&self, owner: &Rc<O>, tracked: &Rc<T>)
    where
        O: Subscribable + ?Sized,
        T: Subscribable + ?Sized,
    {
        if let Some(core) = self.core.upgrade() {
            core.disconnect_scoped(owner.object_id(), tracked.object_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_harness::Emitter;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let inner = Rc::clone(&count);
        (count, Callback::new(move |_| inner.set(inner.get() + 1)))
    }

    fn noop() -> Callback {
        Callback::new(|_| {})
    }

    #[test]
    fn connect_scoped_subscribes_on_owner() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("settings");
        let tracked = Emitter::new("label");
        let (count, cb) = counter();
        registry
            .connect_scoped(&owner, &[ScopedHandler::new("changed", cb)], &tracked)
            .unwrap();
        owner.notify("changed");
        tracked.notify("changed");
        assert_eq!(count.get(), 1);
        assert!(registry.is_tracking(&owner, &tracked));
        assert_eq!(registry.tracker_count(), 1);
    }

    #[test]
    fn tracked_teardown_removes_all_handlers() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        registry
            .connect_scoped(
                &owner,
                &[("sig1", noop()).into(), ("sig2", noop()).into()],
                &x,
            )
            .unwrap();
        assert_eq!(owner.handler_count_for("sig1"), 1);
        assert_eq!(owner.handler_count_for("sig2"), 1);

        x.destroy();

        assert_eq!(owner.handler_count_for("sig1"), 0);
        assert_eq!(owner.handler_count_for("sig2"), 0);
        assert!(!registry.is_tracking(&owner, &x));
        registry.disconnect_scoped(&owner, &x);
        assert_eq!(owner.stale_unsubscribes(), 0);
    }

    #[test]
    fn last_disconnect_prunes_tracker_and_owner_wiring() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        let y = Emitter::new("y");
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &y)
            .unwrap();
        assert_eq!(owner.handler_count_for("destroy"), 1);

        registry.disconnect_scoped(&owner, &x);
        assert!(registry.has_tracker(&owner));
        registry.disconnect_scoped(&owner, &y);
        assert!(!registry.has_tracker(&owner));
        assert_eq!(registry.tracker_count(), 0);
        assert_eq!(owner.handler_count(), 0);
        assert_eq!(x.handler_count(), 0);
        assert_eq!(y.handler_count(), 0);
    }

    #[test]
    fn teardown_wiring_installed_once_per_tracked() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        for _ in 0..3 {
            registry
                .connect_scoped(&owner, &[("s", noop()).into()], &x)
                .unwrap();
        }
        assert_eq!(x.handler_count_for("destroy"), 1);
        assert_eq!(owner.handler_count_for("destroy"), 1);
        assert_eq!(registry.snapshot().handler_count(), 3);
        let tracker = registry.tracker(&owner).unwrap();
        assert_eq!(tracker.owner, owner.object_id());
        assert_eq!(tracker.entries.len(), 1);
        assert!(registry.tracker(&x).is_none());
    }

    #[test]
    fn owner_teardown_clears_tracker() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        let y = Emitter::new("y");
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &y)
            .unwrap();
        owner.destroy();
        assert_eq!(registry.tracker_count(), 0);
        assert_eq!(x.handler_count(), 0);
        assert_eq!(y.handler_count(), 0);
    }

    #[test]
    fn plain_tracked_object_is_not_wired() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::plain("a");
        let x = Emitter::plain("x");
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        let snap = registry.snapshot();
        assert!(!snap.trackers[0].owner_teardown_wired);
        assert!(!snap.trackers[0].entries[0].teardown_wired);
        assert_eq!(x.handler_count(), 0);
        registry.disconnect_scoped(&owner, &x);
        assert_eq!(owner.handler_count(), 0);
        assert_eq!(registry.tracker_count(), 0);
    }

    #[test]
    fn swapped_flags_fail_before_any_side_effect() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        let err = registry
            .connect_scoped(
                &owner,
                &[
                    ScopedHandler::new("ok", noop()),
                    ScopedHandler::new("bad", noop()).with_flags(ConnectFlags::SWAPPED),
                ],
                &x,
            )
            .unwrap_err();
        assert_eq!(err.signal(), "bad");
        assert_eq!(owner.handler_count(), 0);
        assert_eq!(x.handler_count(), 0);
        assert_eq!(registry.tracker_count(), 0);
    }

    #[test]
    fn after_handlers_run_after_normal_ones() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));
        registry
            .connect_scoped(
                &owner,
                &[
                    ScopedHandler::new("s", Callback::new(move |_| l1.borrow_mut().push(2)))
                        .after(),
                    ScopedHandler::new("s", Callback::new(move |_| l2.borrow_mut().push(1))),
                ],
                &x,
            )
            .unwrap();
        owner.notify("s");
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn scoped_callback_is_bound_to_tracked() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        let seen = Rc::new(RefCell::new(String::new()));
        let seen_in = Rc::clone(&seen);
        let cb = Callback::new(move |e| {
            if let Some(this) = e.this_as::<Emitter>() {
                *seen_in.borrow_mut() = this.name().to_owned();
            }
        });
        registry
            .connect_scoped(&owner, &[("s", cb).into()], &x)
            .unwrap();
        owner.notify("s");
        assert_eq!(*seen.borrow(), "x");
    }

    #[test]
    fn reconnect_after_removal_creates_fresh_entry() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        registry.disconnect_scoped(&owner, &x);
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        assert!(registry.is_tracking(&owner, &x));
        assert_eq!(x.handler_count_for("destroy"), 1);
        assert_eq!(owner.handler_count_for("s"), 1);
    }

    #[test]
    fn disconnect_without_tracker_is_noop() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        registry.disconnect_scoped(&owner, &x);
        assert_eq!(registry.tracker_count(), 0);
    }

    #[test]
    fn shutdown_signal_destroys_trackers() {
        let registry = ScopeRegistry::default();
        let app = Emitter::plain("app");
        registry.attach_shutdown(&app);
        registry.attach_shutdown(&app);
        assert_eq!(app.handler_count_for("shutdown"), 1);

        let owner = Emitter::plain("a");
        let x = Emitter::plain("x");
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        app.notify("shutdown");
        assert_eq!(registry.tracker_count(), 0);
        assert_eq!(owner.handler_count(), 0);
    }

    #[test]
    fn custom_shutdown_signal() {
        let registry = ScopeRegistry::new(RegistryConfig::new().with_shutdown_signal("quit"));
        let app = Emitter::plain("app");
        registry.attach_shutdown(&app);
        let owner = Emitter::new("a");
        registry
            .connect_scoped(&owner, &[("s", noop()).into()], &owner)
            .unwrap();
        app.notify("shutdown");
        assert_eq!(registry.tracker_count(), 1);
        app.notify("quit");
        assert_eq!(registry.tracker_count(), 0);
        assert_eq!(owner.handler_count(), 0);
    }

    #[test]
    fn drop_releases_everything() {
        let app = Emitter::plain("app");
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        {
            let registry = ScopeRegistry::default();
            registry.attach_shutdown(&app);
            registry
                .connect_scoped(&owner, &[("s", noop()).into()], &x)
                .unwrap();
        }
        assert_eq!(app.handler_count(), 0);
        assert_eq!(owner.handler_count(), 0);
        assert_eq!(x.handler_count(), 0);
    }

    #[test]
    fn handle_outlives_registry_quietly() {
        let registry = ScopeRegistry::default();
        let handle = registry.handle();
        assert!(handle.is_alive());
        drop(registry);
        assert!(!handle.is_alive());
        let owner = Emitter::new("a");
        let x = Emitter::new("x");
        handle
            .connect_scoped(&owner, &[("s", noop()).into()], &x)
            .unwrap();
        assert_eq!(owner.handler_count(), 0);
        assert!(
            handle
                .connect_scoped(
                    &owner,
                    &[ScopedHandler::new("s", noop()).with_flags(ConnectFlags::SWAPPED)],
                    &x
                )
                .is_err()
        );
    }

    #[test]
    fn owner_tracking_itself() {
        let registry = ScopeRegistry::default();
        let owner = Emitter::new("a");
        let (count, cb) = counter();
        registry
            .connect_scoped(&owner, &[("s", cb).into()], &owner)
            .unwrap();
        owner.notify("s");
        owner.destroy();
        assert_eq!(count.get(), 1);
        assert_eq!(registry.tracker_count(), 0);
        assert_eq!(owner.stale_unsubscribes(), 0);
    }
}
