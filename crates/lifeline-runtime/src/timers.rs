#![forbid(unsafe_code)]

//! Named timer table.
//!
//! [`NamedTimers`] keeps at most one scheduler source per name for one owner.
//!
//! # Invariants
//!
//! 1. Adding a timer under an existing name cancels the previous source
//!    first (replace, never stack).
//! 2. A callback returning [`TimerFlow::Break`] removes its own entry, but
//!    only if the entry still belongs to that callback. Each entry carries a
//!    generation, so a callback that re-added its own name keeps the new
//!    entry.
//! 3. Removal asks the scheduler whether the source is live before
//!    cancelling; a fired one-shot is dropped without a cancel call.
//! 4. No table borrow is held while the scheduler or a callback runs.
//!
//! The callback itself is owned by the scheduler, not the table.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use lifeline_core::{Scheduler, SourceId, TimerFlow};
use tracing::{debug, trace};

/// Context handed to a named timer callback.
pub struct TimerTick<'a> {
    name: &'a str,
    this: Option<Rc<dyn Any>>,
}

impl TimerTick<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Bound receiver, if it is still alive.
    #[must_use]
    pub fn this(&self) -> Option<&Rc<dyn Any>> {
        self.this.as_ref()
    }

    #[must_use]
    pub fn this_as<T: Any>(&self) -> Option<Rc<T>> {
        self.this.clone()?.downcast::<T>().ok()
    }
}

#[derive(Debug, Clone, Copy)]
struct NamedTimer {
    source: SourceId,
    interval: Option<Duration>,
    generation: u64,
}

#[derive(Default)]
struct TimerTable {
    owner: Option<Weak<dyn Any>>,
    entries: HashMap<String, NamedTimer>,
    next_generation: u64,
}

impl TimerTable {
    fn forget(&mut self, name: &str, generation: u64) {
        if self
            .entries
            .get(name)
            .is_some_and(|t| t.generation == generation)
        {
            self.entries.remove(name);
        }
    }
}

/// Per-owner table of cancellable, named scheduler sources.
///
/// Cloning shares the same table.
#[derive(Clone)]
pub struct NamedTimers {
    scheduler: Rc<dyn Scheduler>,
    table: Rc<RefCell<TimerTable>>,
}

impl fmt::Debug for NamedTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedTimers")
            .field("names", &self.names())
            .finish()
    }
}

impl NamedTimers {
    #[must_use]
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            table: Rc::new(RefCell::new(TimerTable::default())),
        }
    }

    /// Default receiver for callbacks added without an explicit binding.
    pub fn set_owner(&self, owner: Weak<dyn Any>) {
        self.table.borrow_mut().owner = Some(owner);
    }

    /// Add or replace the timer called `name`.
    ///
    /// `None` runs the callback at the next idle opportunity; `Some(d)` runs
    /// it every `d`. Returning [`TimerFlow::Continue`] keeps it scheduled.
    pub fn add(
        &self,
        name: &str,
        interval: Option<Duration>,
        callback: impl FnMut(&TimerTick<'_>) -> TimerFlow + 'static,
    ) {
        let owner = self.table.borrow().owner.clone();
        self.insert(name, interval, owner, callback);
    }

    /// Like [`Self::add`], with callbacks bound to `bind_to` instead of the
    /// owner.
    pub fn add_bound(
        &self,
        name: &str,
        interval: Option<Duration>,
        bind_to: Weak<dyn Any>,
        callback: impl FnMut(&TimerTick<'_>) -> TimerFlow + 'static,
    ) {
        self.insert(name, interval, Some(bind_to), callback);
    }

    fn insert(
        &self,
        name: &str,
        interval: Option<Duration>,
        bound: Option<Weak<dyn Any>>,
        mut callback: impl FnMut(&TimerTick<'_>) -> TimerFlow + 'static,
    ) {
        self.remove(name);

        let generation = {
            let mut table = self.table.borrow_mut();
            table.next_generation += 1;
            table.next_generation
        };
        let table = Rc::downgrade(&self.table);
        let owned_name = name.to_owned();
        let source = self.scheduler.schedule(
            interval,
            Box::new(move || {
                let tick = TimerTick {
                    name: &owned_name,
                    this: bound.as_ref().and_then(Weak::upgrade),
                };
                let flow = callback(&tick);
                if !flow.is_continue() {
                    if let Some(table) = table.upgrade() {
                        table.borrow_mut().forget(&owned_name, generation);
                    }
                }
                flow
            }),
        );

        debug!(timer = name, ?interval, %source, "named timer added");
        self.table.borrow_mut().entries.insert(
            name.to_owned(),
            NamedTimer {
                source,
                interval,
                generation,
            },
        );
    }

    /// Cancel and forget the timer called `name`. Returns whether an entry
    /// existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.table.borrow_mut().entries.remove(name);
        match removed {
            Some(timer) => {
                self.cancel_source(name, timer);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.table.borrow().entries.contains_key(name)
    }

    /// Interval of the timer called `name`; `Some(None)` for an idle timer.
    #[must_use]
    pub fn interval(&self, name: &str) -> Option<Option<Duration>> {
        self.table.borrow().entries.get(name).map(|t| t.interval)
    }

    /// Cancel every timer.
    pub fn clear(&self) {
        let drained: Vec<(String, NamedTimer)> =
            self.table.borrow_mut().entries.drain().collect();
        for (name, timer) in drained {
            self.cancel_source(&name, timer);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.borrow().entries.is_empty()
    }

    /// Timer names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.borrow().entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn cancel_source(&self, name: &str, timer: NamedTimer) {
        if self.scheduler.is_scheduled(timer.source) {
            self.scheduler.cancel(timer.source);
            debug!(timer = name, source = %timer.source, "named timer removed");
        } else {
            trace!(timer = name, source = %timer.source, "named timer already finished");
        }
    }
}
