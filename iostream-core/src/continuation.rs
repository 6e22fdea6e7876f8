//! Component C: continuations and the cooperative single-threaded event loop.
//!
//! A continuation is a boxed handler plus a mutex (here, a simple "busy"
//! flag, since the loop itself is single-threaded and never calls a handler
//! reentrantly — the mutex models the *contract*, not a real lock). The loop
//! holds the only scheduling primitives; handlers never block and always
//! return promptly, matching the original core's rule that a handler runs to
//! completion before the loop considers the next event.

use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::error::{CoreError, ResourceError};
use crate::event::{ContId, Event};

/// Implemented by anything that wants to be scheduled on an [`EventLoop`].
pub trait ContinuationHandler {
    /// Handle one event. Must return promptly; use `EventLoop::schedule_*`
    /// or `Vio::reenable`-equivalent calls to express "come back later"
    /// rather than blocking or looping internally. Errors propagate back
    /// through `ContinuationTable::dispatch`/`EventLoop::call` rather than
    /// being swallowed at the handler boundary.
    fn handle(&mut self, event: Event) -> Result<(), CoreError>;

    /// Called once, after the handler will never be scheduled again.
    fn on_close(&mut self) {}
}

struct Slot {
    handler: RefCell<Box<dyn ContinuationHandler>>,
    busy: RefCell<bool>,
}

/// Per-thread table resolving [`ContId`] to a live handler. VIOs and other
/// cross-component references store a `ContId`, not a pointer, so a
/// continuation can be freed (or, in principle, migrated between loops)
/// without leaving dangling references behind — lookups simply fail closed.
#[derive(Default)]
pub struct ContinuationTable {
    slots: RefCell<HashMap<u64, Slot>>,
    next_id: RefCell<u64>,
}

impl ContinuationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Box<dyn ContinuationHandler>) -> ContId {
        let mut next = self.next_id.borrow_mut();
        let id = *next;
        *next += 1;
        self.slots.borrow_mut().insert(
            id,
            Slot {
                handler: RefCell::new(handler),
                busy: RefCell::new(false),
            },
        );
        ContId(id)
    }

    pub fn remove(&self, id: ContId) {
        if let Some(slot) = self.slots.borrow_mut().remove(&id.0) {
            slot.handler.borrow_mut().on_close();
        }
    }

    /// Dispatch `event` to `id`'s handler. Returns
    /// `Err(ResourceError::ContinuationTableFull)`-shaped error only in the
    /// degenerate case the continuation no longer exists (e.g. raced with a
    /// close); callers generally treat that as "drop the event".
    pub fn dispatch(&self, id: ContId, event: Event) -> Result<(), CoreError> {
        let slots = self.slots.borrow();
        let Some(slot) = slots.get(&id.0) else {
            return Ok(());
        };
        // Models "the loop tries to acquire the continuation's mutex": a
        // continuation already running (reentered via a synchronous `Call`)
        // is a logic error in a cooperative, single-threaded handler.
        if *slot.busy.borrow() {
            return Err(ResourceError::ContinuationTableFull.into());
        }
        *slot.busy.borrow_mut() = true;
        let result = slot.handler.borrow_mut().handle(event);
        *slot.busy.borrow_mut() = false;
        result
    }

    #[must_use]
    pub fn is_registered(&self, id: ContId) -> bool {
        self.slots.borrow().contains_key(&id.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct TimerKey {
    at: Instant,
    seq: u64,
}
impl PartialOrd for TimerKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse so the BinaryHeap (a max-heap) pops the earliest deadline.
        other.at.cmp(&self.at).then(other.seq.cmp(&self.seq))
    }
}

struct TimerEntry {
    key: TimerKey,
    cont: ContId,
    event: Event,
}

/// A single-threaded, cooperative event loop driving one
/// [`ContinuationTable`]. Timers are a min-heap keyed by deadline; I/O
/// readiness is expected to be pumped in externally (via `post`) by whatever
/// reactor owns the real file descriptors, keeping this core reactor-agnostic.
pub struct EventLoop {
    table: ContinuationTable,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    ready: RefCell<std::collections::VecDeque<(ContId, Event)>>,
    timer_seq: RefCell<u64>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ContinuationTable::new(),
            timers: RefCell::new(BinaryHeap::new()),
            ready: RefCell::new(std::collections::VecDeque::new()),
            timer_seq: RefCell::new(0),
        }
    }

    #[must_use]
    pub fn table(&self) -> &ContinuationTable {
        &self.table
    }

    pub fn register(&self, handler: Box<dyn ContinuationHandler>) -> ContId {
        self.table.register(handler)
    }

    /// Queue `event` for immediate (next-pump) delivery to `cont`.
    pub fn post(&self, cont: ContId, event: Event) {
        self.ready.borrow_mut().push_back((cont, event));
    }

    /// Schedule `event` to fire on `cont` after `delay`.
    pub fn schedule_in(&self, cont: ContId, delay: Duration, event: Event) {
        let mut seq = self.timer_seq.borrow_mut();
        let key = TimerKey {
            at: Instant::now() + delay,
            seq: *seq,
        };
        *seq += 1;
        self.timers.borrow_mut().push(TimerEntry { key, cont, event });
    }

    /// Synchronous cross-continuation call: dispatch now, bypassing both the
    /// ready queue and the timer wheel. Matches the original core's use of
    /// direct `handleEvent` calls for same-tick hand-offs (e.g. fanning a
    /// connecting-entry's outcome out to every waiter in one pass).
    pub fn call(&self, cont: ContId, event: Event) -> Result<(), CoreError> {
        self.table.dispatch(cont, event)
    }

    /// Run one pump: fire all due timers, then drain the ready queue.
    /// Returns the number of events dispatched.
    pub fn pump(&self) -> usize {
        let mut dispatched = 0;
        let now = Instant::now();
        loop {
            let due = {
                let mut timers = self.timers.borrow_mut();
                match timers.peek() {
                    Some(t) if t.key.at <= now => timers.pop(),
                    _ => None,
                }
            };
            let Some(entry) = due else { break };
            let cont = entry.cont;
            let event_dbg = entry.event.clone();
            if let Err(err) = self.table.dispatch(entry.cont, entry.event) {
                log::error!("{cont} failed handling {event_dbg:?}: {err}");
            }
            dispatched += 1;
        }
        loop {
            let next = self.ready.borrow_mut().pop_front();
            let Some((cont, event)) = next else { break };
            let event_dbg = event.clone();
            if let Err(err) = self.table.dispatch(cont, event) {
                log::error!("{cont} failed handling {event_dbg:?}: {err}");
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Pump until both queues are empty or `max_pumps` is reached — useful
    /// in tests and for draining a burst of chained `Immediate` events.
    pub fn pump_until_idle(&self, max_pumps: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_pumps {
            let n = self.pump();
            total += n;
            if n == 0 && self.timers.borrow().is_empty() && self.ready.borrow().is_empty() {
                break;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counter(Rc<Cell<u32>>);
    impl ContinuationHandler for Counter {
        fn handle(&mut self, _event: Event) -> Result<(), CoreError> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn immediate_dispatch_runs_once() {
        let loop_ = EventLoop::new();
        let count = Rc::new(Cell::new(0));
        let id = loop_.register(Box::new(Counter(count.clone())));
        loop_.post(id, Event::Immediate);
        assert_eq!(loop_.pump(), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let loop_ = EventLoop::new();
        let count = Rc::new(Cell::new(0));
        let id = loop_.register(Box::new(Counter(count.clone())));
        loop_.schedule_in(id, Duration::from_millis(0), Event::Immediate);
        loop_.schedule_in(id, Duration::from_millis(0), Event::Immediate);
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(loop_.pump(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn dispatch_to_closed_continuation_is_a_noop() {
        let loop_ = EventLoop::new();
        let count = Rc::new(Cell::new(0));
        let id = loop_.register(Box::new(Counter(count.clone())));
        loop_.table().remove(id);
        assert!(loop_.call(id, Event::Immediate).is_ok());
        assert_eq!(count.get(), 0);
    }
}
