//! Device enumeration and the lock serializing device handle acquisition.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::config::{Config, EnumerationPolicy};
use crate::traits::{CaptureDevice, DeviceId, DeviceProvider};

/// A device handle owned by the active capture worker.
pub struct HeldDevice<D> {
    /// Index the device was opened with.
    pub id: DeviceId,
    /// Tag of the session that opened it.
    pub owner: u64,
    /// The open device.
    pub device: D,
}

/// Single slot holding the open device handle, if any.
///
/// Every path that opens or reads a device (enumerator, worker, controller)
/// goes through this lock, so at most one handle exists per process.
pub struct DeviceSlot<D> {
    held: Mutex<Option<HeldDevice<D>>>,
}

impl<D: CaptureDevice> Default for DeviceSlot<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: CaptureDevice> DeviceSlot<D> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            held: Mutex::new(None),
        }
    }

    /// Lock the slot.
    pub fn lock(&self) -> MutexGuard<'_, Option<HeldDevice<D>>> {
        self.held.lock()
    }

    /// Index of the held device.
    pub fn held_id(&self) -> Option<DeviceId> {
        self.held.lock().as_ref().map(|held| held.id)
    }

    /// Drop the held device, returning its index if one was held.
    pub fn release(&self) -> Option<DeviceId> {
        let held = self.held.lock().take();
        held.map(|held| held.id)
    }

    /// Drop the held device only if `owner` opened it.
    pub fn release_owned(&self, owner: u64) -> Option<DeviceId> {
        let held = {
            let mut slot = self.held.lock();
            match slot.as_ref() {
                Some(held) if held.owner == owner => slot.take(),
                _ => None,
            }
        };
        held.map(|held| held.id)
    }

    /// Like [`Self::release_owned`], giving up if the lock stays busy for `wait`.
    pub fn reclaim(&self, owner: u64, wait: Duration) -> Reclaim {
        let Some(mut slot) = self.held.try_lock_for(wait) else {
            return Reclaim::Busy;
        };
        let held = match slot.as_ref() {
            Some(held) if held.owner == owner => slot.take(),
            _ => None,
        };
        drop(slot);
        held.map_or(Reclaim::NotHeld, |held| Reclaim::Released(held.id))
    }
}

/// Outcome of [`DeviceSlot::reclaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaim {
    /// The handle was still held and has been dropped.
    Released(DeviceId),
    /// Nothing owned by the session was held.
    NotHeld,
    /// A read kept the lock busy past the wait.
    Busy,
}

/// Produces the list of openable devices.
pub struct DeviceEnumerator<P: DeviceProvider> {
    provider: Arc<P>,
    slot: Arc<DeviceSlot<P::Device>>,
    policy: EnumerationPolicy,
    probe_max_index: u32,
}

impl<P: DeviceProvider> DeviceEnumerator<P> {
    /// Create an enumerator sharing `slot` with the capture worker.
    pub fn new(provider: Arc<P>, slot: Arc<DeviceSlot<P::Device>>, config: &Config) -> Self {
        Self {
            provider,
            slot,
            policy: config.enumeration,
            probe_max_index: config.probe_max_index,
        }
    }

    /// List devices in ascending index order.
    ///
    /// The result is a hint: a listed device may still fail to open. The
    /// device held by a running session is reported without being reopened.
    pub fn enumerate(&self) -> Vec<DeviceId> {
        let range = (0..=self.probe_max_index).map(DeviceId);

        let ids: Vec<DeviceId> = match self.policy {
            EnumerationPolicy::AssumeRange => range.collect(),
            EnumerationPolicy::Probe => self.probe_all(range),
            EnumerationPolicy::Discover => match self.provider.discover() {
                Some(ids) => ids,
                None => self.probe_all(range),
            },
        };

        debug!(devices = ?ids, policy = ?self.policy, "Enumerated devices");
        ids
    }

    fn probe_all<I: Iterator<Item = DeviceId>>(&self, range: I) -> Vec<DeviceId> {
        let held = self.slot.lock();
        let held_id = held.as_ref().map(|held| held.id);

        range
            .filter(|&id| {
                if Some(id) == held_id {
                    return true;
                }
                let ok = self.provider.probe(id);
                trace!(device = %id, ok, "Probed device");
                ok
            })
            .collect()
    }
}
