//! Shared, ordered record of teardown events.
//!
//! Fakes record events such as a PTY master being closed or a process being
//! reaped, so tests can assert on cleanup ordering across components.

use std::sync::{Arc, Mutex};

/// Something a fake observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A PTY pair was opened.
    PtyOpened,
    /// A PTY master was dropped.
    PtyClosed,
    /// A process was launched.
    ProcessStarted,
    /// A process exit status was collected.
    ProcessReaped,
    /// `shutdown` was called on a transport.
    TransportShutdown,
    /// A transport was dropped.
    TransportClosed,
}

/// Cloneable handle to an ordered event list.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: Event) -> usize {
        self.events.lock().unwrap().iter().filter(|e| **e == event).count()
    }

    /// Position of the first occurrence of `event`.
    pub fn position(&self, event: Event) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| *e == event)
    }
}
