#![forbid(unsafe_code)]

//! In-process reference emitter.
//!
//! [`Emitter`] implements [`Subscribable`] (and, unless built with
//! [`Emitter::plain`], [`Teardownable`]) with the same delivery rules a
//! toolkit object follows:
//!
//! - Normal handlers run in registration order, then `AFTER` handlers.
//! - The handler list is snapshotted before delivery; a handler removed by an
//!   earlier handler in the same emission is skipped.
//! - [`Emitter::destroy`] fires the teardown signal once, then drops every
//!   handler. Further emissions deliver nothing.
//!
//! Stale removals are counted in [`Emitter::stale_unsubscribes`] so tests can
//! assert that callers check liveness before unsubscribing.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lifeline_core::{
    ConnectFlags, DEFAULT_TEARDOWN_SIGNAL, Emission, Handler, HandlerId, ObjectId, Subscribable,
    Teardownable,
};
use tracing::trace;

struct Slot {
    id: HandlerId,
    signal: String,
    handler: Handler,
    after: bool,
}

#[derive(Default)]
struct EmitterState {
    next_handler: u64,
    slots: Vec<Slot>,
    destroying: bool,
    destroyed: bool,
    stale_unsubscribes: usize,
}

/// Reference signal emitter.
pub struct Emitter {
    id: ObjectId,
    name: String,
    teardown: Option<String>,
    state: RefCell<EmitterState>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Emitter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handlers", &state.slots.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl Emitter {
    /// Teardownable emitter using [`DEFAULT_TEARDOWN_SIGNAL`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Self::build(name.into(), Some(DEFAULT_TEARDOWN_SIGNAL.to_owned()))
    }

    /// Teardownable emitter with a custom teardown signal.
    #[must_use]
    pub fn with_teardown_signal(name: impl Into<String>, signal: impl Into<String>) -> Rc<Self> {
        Self::build(name.into(), Some(signal.into()))
    }

    /// Emitter without teardown capability. Never auto-tracked.
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Rc<Self> {
        Self::build(name.into(), None)
    }

    fn build(name: String, teardown: Option<String>) -> Rc<Self> {
        Rc::new(Self {
            id: ObjectId::next(),
            name,
            teardown,
            state: RefCell::new(EmitterState::default()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver `signal` to every matching handler. Returns the number of
    /// handlers invoked.
    pub fn emit(&self, signal: &str, payload: &dyn Any) -> usize {
        let queue: Vec<(HandlerId, Handler)> = {
            let state = self.state.borrow();
            if state.destroyed {
                return 0;
            }
            let mut queue: Vec<(HandlerId, Handler)> = Vec::new();
            for after in [false, true] {
                queue.extend(
                    state
                        .slots
                        .iter()
                        .filter(|s| s.after == after && s.signal == signal)
                        .map(|s| (s.id, Rc::clone(&s.handler))),
                );
            }
            queue
        };

        let emission = Emission::new(signal, self.id, payload);
        let mut delivered = 0;
        for (id, handler) in queue {
            if !self.is_active(id) {
                continue;
            }
            handler(&emission);
            delivered += 1;
        }
        delivered
    }

    /// Emit with a unit payload.
    pub fn notify(&self, signal: &str) -> usize {
        self.emit(signal, &())
    }

    /// Fire the teardown signal (if any) and drop every handler. Returns
    /// `false` if the emitter was already destroyed or is being destroyed.
    pub fn destroy(&self) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.destroyed || state.destroying {
                return false;
            }
            state.destroying = true;
        }
        if let Some(signal) = &self.teardown {
            self.emit(signal, &());
        }
        let dropped = {
            let mut state = self.state.borrow_mut();
            state.destroyed = true;
            std::mem::take(&mut state.slots)
        };
        trace!(emitter = %self.name, handlers = dropped.len(), "emitter destroyed");
        drop(dropped);
        true
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    /// Number of registered handlers, teardown handlers included.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.state.borrow().slots.len()
    }

    #[must_use]
    pub fn handler_count_for(&self, signal: &str) -> usize {
        self.state
            .borrow()
            .slots
            .iter()
            .filter(|s| s.signal == signal)
            .count()
    }

    /// Unsubscribe calls that named an unknown handler.
    #[must_use]
    pub fn stale_unsubscribes(&self) -> usize {
        self.state.borrow().stale_unsubscribes
    }
}

impl Subscribable for Emitter {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn subscribe(&self, signal: &str, handler: Handler, flags: ConnectFlags) -> HandlerId {
        let mut state = self.state.borrow_mut();
        state.next_handler += 1;
        let id = HandlerId::new(state.next_handler);
        if state.destroyed {
            trace!(emitter = %self.name, signal, "subscribe on destroyed emitter ignored");
            return id;
        }
        state.slots.push(Slot {
            id,
            signal: signal.to_owned(),
            handler,
            after: flags.contains(ConnectFlags::AFTER),
        });
        id
    }

    fn unsubscribe(&self, id: HandlerId) {
        let removed = {
            let mut state = self.state.borrow_mut();
            match state.slots.iter().position(|s| s.id == id) {
                Some(index) => Some(state.slots.remove(index)),
                None => {
                    state.stale_unsubscribes += 1;
                    None
                }
            }
        };
        if removed.is_none() {
            trace!(emitter = %self.name, %id, "unsubscribe of unknown handler");
        }
    }

    fn is_active(&self, id: HandlerId) -> bool {
        self.state.borrow().slots.iter().any(|s| s.id == id)
    }

    fn as_teardownable(&self) -> Option<&dyn Teardownable> {
        if self.teardown.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Teardownable for Emitter {
    fn teardown_signal(&self) -> &str {
        self.teardown.as_deref().unwrap_or(DEFAULT_TEARDOWN_SIGNAL)
    }
}
