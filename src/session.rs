//! Session controller: starts and stops the capture worker.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::enumerate::{DeviceEnumerator, DeviceSlot, Reclaim};
use crate::events::{Event, Notifier};
use crate::publisher::FramePublisher;
use crate::traits::{CameraError, DeviceId, DeviceProvider, Result};
use crate::worker::{CaptureWorker, StopOutcome, WorkerHandle};

/// Lifecycle of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No worker exists.
    #[default]
    Idle,
    /// A worker is acquiring its device.
    Starting,
    /// A worker holds the device and is capturing.
    Running,
    /// The worker is being stopped and joined.
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Owns the session state and at most one capture worker.
///
/// All methods take `&mut self`; the controller lives on a single thread and
/// other threads reach it through [`crate::service::CameraService`].
pub struct SessionController<P: DeviceProvider> {
    config: Config,
    provider: Arc<P>,
    slot: Arc<DeviceSlot<P::Device>>,
    enumerator: DeviceEnumerator<P>,
    publisher: Arc<FramePublisher>,
    notifier: Notifier,
    state: SessionState,
    devices: Option<Vec<DeviceId>>,
    worker: Option<WorkerHandle>,
    generation: u64,
}

impl<P: DeviceProvider> SessionController<P> {
    /// Create an idle controller.
    pub fn new(provider: P, config: Config, notifier: Notifier) -> Self {
        let provider = Arc::new(provider);
        let slot = Arc::new(DeviceSlot::new());
        let enumerator = DeviceEnumerator::new(Arc::clone(&provider), Arc::clone(&slot), &config);

        Self {
            publisher: Arc::new(FramePublisher::new(notifier.clone())),
            config,
            provider,
            slot,
            enumerator,
            notifier,
            state: SessionState::Idle,
            devices: None,
            worker: None,
            generation: 0,
        }
    }

    /// Current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Publisher the capture worker writes to.
    pub const fn publisher(&self) -> &Arc<FramePublisher> {
        &self.publisher
    }

    /// Result of the last enumeration, if any.
    pub fn devices(&self) -> Option<&[DeviceId]> {
        self.devices.as_deref()
    }

    /// Device of the active session.
    pub fn active_device(&self) -> Option<DeviceId> {
        self.worker.as_ref().map(WorkerHandle::id)
    }

    /// Receiver that disconnects when the active worker exits.
    pub fn exit_signal(&self) -> Option<Receiver<()>> {
        self.worker.as_ref().map(WorkerHandle::exit_signal)
    }

    /// Enumerate devices. Safe while a session runs: the held device is not
    /// reopened.
    pub fn list(&mut self) -> Vec<DeviceId> {
        let ids = self.enumerator.enumerate();
        info!(devices = ?ids, "Found cameras");
        self.devices = Some(ids.clone());
        self.notifier.send(Event::DevicesChanged(ids.clone()));
        ids
    }

    /// Start capturing from `id`, stopping any active session first.
    ///
    /// Ids missing from the last enumeration are rejected before anything
    /// else happens. On any failure the controller is back to `Idle`.
    pub fn open(&mut self, id: DeviceId) -> Result<()> {
        let known = match &self.devices {
            Some(ids) => ids.contains(&id),
            None => self.list().contains(&id),
        };
        if !known {
            return Err(CameraError::unavailable(id, "not in the device list"));
        }

        self.reap();
        if let Some(active) = self.active_device() {
            info!(
                reason = %CameraError::AlreadyRunning(active),
                "Stopping active session before open"
            );
            self.close();
        }

        self.set_state(SessionState::Starting);
        self.generation += 1;
        let worker = CaptureWorker::new(
            id,
            self.generation,
            Arc::clone(&self.provider),
            Arc::clone(&self.slot),
            Arc::clone(&self.publisher),
            self.notifier.clone(),
            &self.config,
        );

        let (handle, ready) = match worker.spawn() {
            Ok(spawned) => spawned,
            Err(err) => {
                self.set_state(SessionState::Idle);
                return Err(err);
            }
        };
        self.worker = Some(handle);

        let acquired = match ready.recv_timeout(self.config.open_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CameraError::unavailable(
                id,
                format!("not acquired within {:?}", self.config.open_timeout),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(CameraError::CaptureFailure(
                "capture worker exited during startup".to_owned(),
            )),
        };

        match acquired {
            Ok(()) => {
                self.set_state(SessionState::Running);
                Ok(())
            }
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    /// Stop the active session and wait for its worker.
    ///
    /// No-op when idle. Blocks for at most `stop_timeout` in total: the join
    /// and the reclaim of a handle the worker still holds share that bound.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.set_state(SessionState::Stopping);

        let id = worker.id();
        let owner = self.generation;
        let timeout = self.config.stop_timeout;
        let deadline = Instant::now() + timeout;
        match worker.stop(timeout) {
            StopOutcome::Joined => debug!(device = %id, "Capture worker joined"),
            StopOutcome::TimedOut => warn!(
                device = %id,
                error = %CameraError::StopTimeout(timeout),
                "Reclaiming device from unresponsive capture worker"
            ),
        }

        let left = deadline.saturating_duration_since(Instant::now());
        match self.slot.reclaim(owner, left) {
            Reclaim::Released(id) => warn!(device = %id, "Forcibly released device handle"),
            Reclaim::Busy => {
                warn!(device = %id, "Device still busy; worker will release it on exit");
            }
            Reclaim::NotHeld => {}
        }

        info!(device = %id, "Camera closed");
        self.set_state(SessionState::Idle);
    }

    /// Finish the stop sequence for a worker that ended on its own.
    ///
    /// Returns whether a worker was reaped.
    pub fn reap(&mut self) -> bool {
        if self.worker.as_ref().is_some_and(WorkerHandle::has_exited) {
            debug!("Capture worker exited on its own");
            self.close();
            true
        } else {
            false
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Session state changed");
            self.state = state;
            self.notifier.send(Event::StateChanged(state));
        }
    }
}

impl<P: DeviceProvider> Drop for SessionController<P> {
    fn drop(&mut self) {
        self.close();
    }
}
