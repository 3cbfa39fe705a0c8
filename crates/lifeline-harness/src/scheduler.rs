#![forbid(unsafe_code)]

//! Deterministic virtual-clock scheduler.
//!
//! [`VirtualScheduler`] implements [`Scheduler`] without real time. Tests
//! drive it explicitly:
//!
//! - [`VirtualScheduler::run_idle`] runs every idle source once.
//! - [`VirtualScheduler::advance`] runs idle sources, then every interval
//!   source that falls due, in due order, moving the clock forward.
//!
//! A source's callback is taken out of the table while it runs, so the
//! callback may cancel itself, cancel others, or schedule new sources. A
//! source cancelled during its own run is not rescheduled. Cancelling an
//! unknown source is counted in [`VirtualScheduler::stale_cancels`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use lifeline_core::{Scheduler, SourceId, TimerFlow};
use tracing::trace;

/// Shortest interval a source may repeat at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

type SourceFn = Box<dyn FnMut() -> TimerFlow>;

struct Source {
    interval: Option<Duration>,
    due: Duration,
    /// `None` while the callback is running.
    callback: Option<SourceFn>,
}

#[derive(Default)]
struct SchedulerState {
    now: Duration,
    next_source: u64,
    sources: BTreeMap<SourceId, Source>,
    stale_cancels: usize,
    dispatched: u64,
}

/// Scheduler with a manually advanced clock.
#[derive(Default)]
pub struct VirtualScheduler {
    state: RefCell<SchedulerState>,
}

impl fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("VirtualScheduler")
            .field("now", &state.now)
            .field("pending", &state.sources.len())
            .field("dispatched", &state.dispatched)
            .finish()
    }
}

impl VirtualScheduler {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of live sources.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().sources.len()
    }

    /// Total callback invocations so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.state.borrow().dispatched
    }

    /// `cancel` calls that named an unknown source.
    #[must_use]
    pub fn stale_cancels(&self) -> usize {
        self.state.borrow().stale_cancels
    }

    /// Run every idle source present when the pass starts. Returns the
    /// number of callbacks invoked.
    pub fn run_idle(&self) -> usize {
        let idle: Vec<SourceId> = self
            .state
            .borrow()
            .sources
            .iter()
            .filter(|(_, s)| s.interval.is_none() && s.callback.is_some())
            .map(|(id, _)| *id)
            .collect();
        idle.into_iter().filter(|id| self.dispatch(*id)).count()
    }

    /// Run idle sources, then advance the clock by `by`, firing interval
    /// sources as they fall due. Returns the number of callbacks invoked.
    pub fn advance(&self, by: Duration) -> usize {
        let mut fired = self.run_idle();
        let target = self.now() + by;
        loop {
            let next = {
                let state = self.state.borrow();
                state
                    .sources
                    .iter()
                    .filter(|(_, s)| s.interval.is_some() && s.callback.is_some())
                    .filter(|(_, s)| s.due <= target)
                    .min_by_key(|(id, s)| (s.due, **id))
                    .map(|(id, s)| (*id, s.due))
            };
            let Some((id, due)) = next else {
                break;
            };
            self.state.borrow_mut().now = due;
            if self.dispatch(id) {
                fired += 1;
            }
        }
        self.state.borrow_mut().now = target;
        fired
    }

    fn dispatch(&self, id: SourceId) -> bool {
        let callback = {
            let mut state = self.state.borrow_mut();
            let taken = state.sources.get_mut(&id).and_then(|s| s.callback.take());
            if taken.is_some() {
                state.dispatched += 1;
            }
            taken
        };
        let Some(mut callback) = callback else {
            return false;
        };

        let flow = callback();

        let mut state = self.state.borrow_mut();
        let keep = flow.is_continue() && state.sources.contains_key(&id);
        let leftover = if keep {
            if let Some(source) = state.sources.get_mut(&id) {
                if let Some(interval) = source.interval {
                    source.due += interval;
                }
                source.callback = Some(callback);
            }
            None
        } else {
            state.sources.remove(&id);
            Some(callback)
        };
        drop(state);
        drop(leftover);
        true
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, interval: Option<Duration>, callback: SourceFn) -> SourceId {
        let mut state = self.state.borrow_mut();
        state.next_source += 1;
        let id = SourceId::new(state.next_source);
        let interval = interval.map(|d| d.max(MIN_INTERVAL));
        let due = state.now + interval.unwrap_or_default();
        state.sources.insert(
            id,
            Source {
                interval,
                due,
                callback: Some(callback),
            },
        );
        id
    }

    fn cancel(&self, id: SourceId) {
        let removed = {
            let mut state = self.state.borrow_mut();
            let removed = state.sources.remove(&id);
            if removed.is_none() {
                state.stale_cancels += 1;
            }
            removed
        };
        if removed.is_none() {
            trace!(%id, "cancel of unknown source");
        }
    }

    fn is_scheduled(&self, id: SourceId) -> bool {
        self.state.borrow().sources.contains_key(&id)
    }
}
