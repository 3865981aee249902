//! Notifications delivered to the consumer.
//!
//! Every notification is queued on a channel and read from the consumer's own
//! thread; nothing calls back into consumer code from a capture thread.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::session::SessionState;
use crate::traits::DeviceId;

/// Where an error notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// A failed operation reported at a component boundary.
    Session,
    /// A diagnostic line logged at warning severity or above.
    Diagnostics,
}

/// Consumer-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The device list was refreshed.
    DevicesChanged(Vec<DeviceId>),
    /// A new frame differing from the previous one was published.
    FrameChanged {
        /// Publisher version of the new frame.
        version: u64,
    },
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// Something failed.
    Error {
        /// Human-readable description.
        message: String,
        /// Origin of the error.
        source: ErrorSource,
    },
    /// The diagnostic log changed.
    LogsChanged,
    /// A consumer command completed.
    OperationFinished,
}

/// Cloneable handle for queueing [`Event`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<Event>,
}

impl Notifier {
    /// Create a notifier and the receiving end the consumer drains.
    #[must_use]
    pub fn channel() -> (Self, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Notifier whose events go nowhere.
    #[must_use]
    pub fn detached() -> Self {
        let (tx, _) = unbounded();
        Self { tx }
    }

    /// Queue an event. Events are dropped once the consumer is gone.
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Queue an error notification from a component boundary.
    pub fn error<S: Into<String>>(&self, message: S) {
        self.send(Event::Error {
            message: message.into(),
            source: ErrorSource::Session,
        });
    }
}
