#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

//! General-purpose discrete-event simulation kernel: a clock, a total order
//! over pending events, and a dispatcher that hands them out in time order.
//!
//! The kernel knows nothing about any particular simulation. A domain crate
//! defines one closed event type, implements [`Event`] for it, and drives its
//! own run loop by repeatedly calling [`Dispatcher::pop`] and executing the
//! returned event's action.

pub use scheduler::{Dispatcher, Event, EventEntry, SchedulerError, Time};

mod scheduler;
