use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::NotNan;
use thiserror::Error;

/// Simulation time in seconds.
pub type Time = f64;

/// Trait implemented by the closed event type of a simulation.
///
/// The dispatcher needs three things from an event: a priority used to break
/// ties between events sharing a timestamp (lower values run first), a kind
/// tag, and an optional target entity. Kind and target together identify
/// pending events for cancellation, e.g., invalidating a stale service timer
/// when a rate changes.
pub trait Event {
    /// Discriminant identifying the variant of the event.
    type Kind: PartialEq + Copy;
    /// Identity of the entity the event is addressed to.
    type Target: PartialEq + Copy;

    /// The kind tag of this event.
    fn kind(&self) -> Self::Kind;

    /// The target of this event, if it is addressed to a particular entity.
    fn target(&self) -> Option<Self::Target>;

    /// Tie-break priority among events sharing a timestamp; lower runs first.
    fn dispatch_order(&self) -> u32;
}

/// Error returned by [`Dispatcher::register`].
#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    /// The event was scheduled before the dispatcher's current time.
    ///
    /// Every legal call site schedules at `now + delay` with a non-negative
    /// delay, so hitting this means a scheduling bug upstream.
    #[error("event scheduled at {timestamp}, which is before the current time {current_time}")]
    EventInPast {
        /// The offending timestamp.
        timestamp: Time,
        /// The dispatcher clock at the time of registration.
        current_time: Time,
    },
    /// The event timestamp was NaN.
    #[error("event timestamp is NaN")]
    NanTimestamp,
}

/// An event together with its scheduling key, as stored in the dispatcher.
#[derive(Debug)]
pub struct EventEntry<E> {
    time: NotNan<Time>,
    order: u32,
    seq: u64,
    event: E,
}

impl<E> EventEntry<E> {
    /// The time this event is scheduled to occur.
    #[must_use]
    pub fn time(&self) -> Time {
        self.time.into_inner()
    }

    /// A reference to the scheduled event.
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Consumes the entry, returning the event.
    pub fn into_event(self) -> E {
        self.event
    }

    fn key(&self) -> (NotNan<Time>, u32, u64) {
        (self.time, self.order, self.seq)
    }
}

impl<E> PartialEq for EventEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<E> Eq for EventEntry<E> {}

impl<E> PartialOrd for EventEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ascending timestamp, then ascending dispatch order, then insertion
/// sequence. The sequence keeps the order total, so same-time same-order
/// events run first-registered-first and runs are deterministic.
impl<E> Ord for EventEntry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Owns the simulation clock and the pending event set.
///
/// The dispatcher never executes events itself; it hands out the earliest
/// pending entry and advances the clock to its timestamp. The run loop
/// belongs to the simulation that knows how to act on its events.
pub struct Dispatcher<E> {
    events: BinaryHeap<Reverse<EventEntry<E>>>,
    current_time: Time,
    next_seq: u64,
}

impl<E> Default for Dispatcher<E> {
    fn default() -> Self {
        Self {
            events: BinaryHeap::new(),
            current_time: 0.0,
            next_seq: 0,
        }
    }
}

impl<E: Event> Dispatcher<E> {
    /// Constructs a dispatcher with an empty event set and the clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn current_time(&self) -> Time {
        self.current_time
    }

    /// Schedules `event` to occur at the absolute time `time`.
    ///
    /// # Errors
    ///
    /// Returns an error if `time` is NaN or lies before the current time.
    pub fn register(&mut self, time: Time, event: E) -> Result<(), SchedulerError> {
        let time = NotNan::new(time).map_err(|_| SchedulerError::NanTimestamp)?;
        if time.into_inner() < self.current_time {
            return Err(SchedulerError::EventInPast {
                timestamp: time.into_inner(),
                current_time: self.current_time,
            });
        }
        let order = event.dispatch_order();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Reverse(EventEntry {
            time,
            order,
            seq,
            event,
        }));
        Ok(())
    }

    /// Removes every pending event with the given target and kind, returning
    /// the number removed.
    pub fn cancel_for(&mut self, target: E::Target, kind: E::Kind) -> usize {
        let before = self.events.len();
        self.events.retain(|Reverse(entry)| {
            entry.event.kind() != kind || entry.event.target() != Some(target)
        });
        before - self.events.len()
    }

    /// Removes and returns the earliest pending entry, advancing the clock to
    /// its timestamp. Returns `None` if no events are pending.
    pub fn pop(&mut self) -> Option<EventEntry<E>> {
        self.events.pop().map(|Reverse(entry)| {
            self.current_time = entry.time();
            entry
        })
    }

    /// The timestamp of the earliest pending event, if any.
    #[must_use]
    pub fn peek_time(&self) -> Option<Time> {
        self.events.peek().map(|Reverse(entry)| entry.time())
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` if no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Discards all pending events. The clock is left untouched.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestKind {
        Tick,
        Tock,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct TestEvent {
        kind: TestKind,
        target: usize,
        order: u32,
    }

    impl Event for TestEvent {
        type Kind = TestKind;
        type Target = usize;

        fn kind(&self) -> TestKind {
            self.kind
        }

        fn target(&self) -> Option<usize> {
            Some(self.target)
        }

        fn dispatch_order(&self) -> u32 {
            self.order
        }
    }

    fn tick(target: usize, order: u32) -> TestEvent {
        TestEvent {
            kind: TestKind::Tick,
            target,
            order,
        }
    }

    #[test]
    fn test_pop_in_time_order() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(2.0, tick(0, 0)).unwrap();
        dispatcher.register(1.0, tick(1, 0)).unwrap();
        dispatcher.register(3.0, tick(2, 0)).unwrap();

        assert_eq!(dispatcher.current_time(), 0.0);
        assert_eq!(dispatcher.peek_time(), Some(1.0));

        let entry = dispatcher.pop().unwrap();
        assert_eq!((entry.time(), entry.event().target), (1.0, 1));
        assert_eq!(dispatcher.current_time(), 1.0);

        let entry = dispatcher.pop().unwrap();
        assert_eq!((entry.time(), entry.event().target), (2.0, 0));
        let entry = dispatcher.pop().unwrap();
        assert_eq!((entry.time(), entry.event().target), (3.0, 2));
        assert_eq!(dispatcher.current_time(), 3.0);
        assert!(dispatcher.pop().is_none());
    }

    #[test]
    fn test_same_time_breaks_ties_by_dispatch_order() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(1.0, tick(0, 45)).unwrap();
        dispatcher.register(1.0, tick(1, 0)).unwrap();
        dispatcher.register(1.0, tick(2, 20)).unwrap();

        let popped: Vec<usize> = std::iter::from_fn(|| dispatcher.pop())
            .map(|e| e.event().target)
            .collect();
        assert_eq!(popped, vec![1, 2, 0]);
    }

    #[test]
    fn test_same_time_same_order_is_fifo() {
        let mut dispatcher = Dispatcher::new();
        for target in 0..4 {
            dispatcher.register(1.0, tick(target, 7)).unwrap();
        }
        let popped: Vec<usize> = std::iter::from_fn(|| dispatcher.pop())
            .map(|e| e.event().target)
            .collect();
        assert_eq!(popped, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_register_in_past_is_an_error() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(5.0, tick(0, 0)).unwrap();
        assert_eq!(dispatcher.pop().unwrap().time(), 5.0);
        assert_eq!(
            dispatcher.register(4.0, tick(0, 0)),
            Err(SchedulerError::EventInPast {
                timestamp: 4.0,
                current_time: 5.0,
            })
        );
        // Scheduling exactly at the current time is allowed.
        dispatcher.register(5.0, tick(0, 0)).unwrap();
    }

    #[test]
    fn test_register_nan_is_an_error() {
        let mut dispatcher = Dispatcher::new();
        assert_eq!(
            dispatcher.register(f64::NAN, tick(0, 0)),
            Err(SchedulerError::NanTimestamp)
        );
    }

    #[test]
    fn test_cancel_for_removes_matching_events_only() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(1.0, tick(7, 0)).unwrap();
        dispatcher.register(2.0, tick(7, 0)).unwrap();
        dispatcher.register(3.0, tick(8, 0)).unwrap();
        dispatcher
            .register(
                4.0,
                TestEvent {
                    kind: TestKind::Tock,
                    target: 7,
                    order: 0,
                },
            )
            .unwrap();

        assert_eq!(dispatcher.cancel_for(7, TestKind::Tick), 2);
        assert_eq!(dispatcher.len(), 2);

        let entry = dispatcher.pop().unwrap();
        assert_eq!((entry.event().target, entry.event().kind), (8, TestKind::Tick));
        let entry = dispatcher.pop().unwrap();
        assert_eq!((entry.event().target, entry.event().kind), (7, TestKind::Tock));
    }

    #[test]
    fn test_clear_keeps_clock() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(1.0, tick(0, 0)).unwrap();
        dispatcher.pop().unwrap();
        dispatcher.register(9.0, tick(0, 0)).unwrap();
        dispatcher.clear();
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.current_time(), 1.0);
    }
}
