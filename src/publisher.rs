//! Single-slot store for the most recent encoded frame.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{Event, Notifier};
use crate::traits::EncodedFrame;

/// A published frame and the version it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFrame {
    /// The encoded frame.
    pub frame: Arc<EncodedFrame>,
    /// Monotonically increasing publish counter, starting at 1.
    pub version: u64,
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<PublishedFrame>,
    dirty: bool,
}

/// Holds the latest encoded frame for consumers.
///
/// Only the active capture worker writes. The lock covers swapping an `Arc`
/// in or out; encoding and content comparison happen outside it.
#[derive(Debug)]
pub struct FramePublisher {
    slot: Mutex<Slot>,
    notifier: Notifier,
}

impl FramePublisher {
    /// Create an empty publisher announcing changes through `notifier`.
    #[must_use]
    pub fn new(notifier: Notifier) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            notifier,
        }
    }

    /// Store `frame` unless it carries the same bytes as the current one.
    ///
    /// Returns whether the frame was stored. A stored frame queues
    /// [`Event::FrameChanged`].
    pub fn publish(&self, frame: EncodedFrame) -> bool {
        let previous = self.slot.lock().latest.as_ref().map(|p| Arc::clone(&p.frame));
        if previous.is_some_and(|prev| prev.same_content(&frame)) {
            return false;
        }

        let frame = Arc::new(frame);
        let version = {
            let mut slot = self.slot.lock();
            let version = slot.latest.as_ref().map_or(0, |p| p.version) + 1;
            slot.latest = Some(PublishedFrame { frame, version });
            slot.dirty = true;
            version
        };

        self.notifier.send(Event::FrameChanged { version });
        true
    }

    /// The most recently published frame, `None` if nothing was published.
    pub fn latest(&self) -> Option<PublishedFrame> {
        self.slot.lock().latest.clone()
    }

    /// Whether a frame was published since the last call, clearing the flag.
    pub fn take_dirty(&self) -> bool {
        std::mem::take(&mut self.slot.lock().dirty)
    }
}
