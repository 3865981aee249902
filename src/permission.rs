//! Runtime consent gate checked before touching camera hardware.

use std::collections::VecDeque;

use crate::traits::DeviceId;

/// Consent state reported by a [`PermissionGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Hardware access is allowed.
    Granted,
    /// The user refused access.
    Denied,
    /// Consent has not been asked for yet.
    Undetermined,
}

/// Callback invoked once with the outcome of a consent request.
pub type PermissionCallback = Box<dyn FnOnce(PermissionStatus) + Send>;

/// Source of camera consent.
pub trait PermissionGate: Send + Sync + 'static {
    /// Current consent state.
    fn status(&self) -> PermissionStatus;

    /// Ask for consent. `on_result` may run on any thread, at any later time.
    fn request(&self, on_result: PermissionCallback);
}

/// Gate for platforms without runtime camera consent, such as V4L2 where
/// access is governed by device node permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    fn status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request(&self, on_result: PermissionCallback) {
        on_result(PermissionStatus::Granted);
    }
}

/// An operation deferred until consent is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOperation {
    /// Enumerate devices.
    RefreshList,
    /// Open the given device.
    Open(DeviceId),
}

/// Operations waiting on an outstanding consent request.
#[derive(Debug, Default)]
pub struct PendingQueue {
    ops: VecDeque<PendingOperation>,
}

impl PendingQueue {
    /// Queue an operation. Returns `true` when no request is outstanding
    /// yet, meaning the caller must ask the gate.
    pub fn defer(&mut self, op: PendingOperation) -> bool {
        let first = self.ops.is_empty();
        self.ops.push_back(op);
        first
    }

    /// Whether a consent request is outstanding.
    pub fn is_waiting(&self) -> bool {
        !self.ops.is_empty()
    }

    /// Take every queued operation in submission order.
    pub fn drain(&mut self) -> Vec<PendingOperation> {
        self.ops.drain(..).collect()
    }
}
