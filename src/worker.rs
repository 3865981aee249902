//! Capture worker: owns the open device and runs the capture loop on its own thread.
//!
//! The worker checks its `running` flag once per iteration. A stop request
//! therefore takes effect within one iteration (one frame interval plus one
//! device read), never in the middle of a read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::enumerate::{DeviceSlot, HeldDevice};
use crate::events::Notifier;
use crate::filter::FrameFilter;
use crate::publisher::FramePublisher;
use crate::traits::{
    Backend, CameraError, CaptureDevice, DeviceId, DeviceProvider, EncodedFrame, Result,
};

/// Outcome of one loop iteration.
#[derive(Debug)]
pub enum Step {
    /// A frame was captured and encoded.
    Frame(EncodedFrame),
    /// Nothing to publish this time; retry shortly.
    Skip,
    /// The device or codec failed; the loop must end.
    Fatal(CameraError),
}

/// Result of asking a worker to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker thread finished and was joined.
    Joined,
    /// The worker did not finish in time and was detached.
    TimedOut,
}

/// Everything a worker thread needs, moved onto that thread at spawn.
pub struct CaptureWorker<P: DeviceProvider> {
    id: DeviceId,
    owner: u64,
    provider: Arc<P>,
    slot: Arc<DeviceSlot<P::Device>>,
    publisher: Arc<FramePublisher>,
    notifier: Notifier,
    filter: FrameFilter,
    running: Arc<AtomicBool>,
    frame_interval: Duration,
    retry_delay: Duration,
}

impl<P: DeviceProvider> CaptureWorker<P> {
    /// Prepare a worker for `id`.
    ///
    /// `owner` tags the device handle in the shared slot so a detached worker
    /// can never release or read a handle that belongs to a later session.
    pub fn new(
        id: DeviceId,
        owner: u64,
        provider: Arc<P>,
        slot: Arc<DeviceSlot<P::Device>>,
        publisher: Arc<FramePublisher>,
        notifier: Notifier,
        config: &Config,
    ) -> Self {
        Self {
            id,
            owner,
            provider,
            slot,
            publisher,
            notifier,
            filter: FrameFilter::new(config.filter),
            running: Arc::new(AtomicBool::new(true)),
            frame_interval: config.frame_interval,
            retry_delay: config.retry_delay,
        }
    }

    /// Start the worker thread.
    ///
    /// The returned receiver yields exactly one message: whether the device
    /// was acquired.
    pub fn spawn(self) -> Result<(WorkerHandle, Receiver<Result<()>>)> {
        let (ready_tx, ready_rx) = bounded(1);
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let id = self.id;
        let running = Arc::clone(&self.running);

        let thread = thread::Builder::new()
            .name(format!("capture-{id}"))
            .spawn(move || self.run(&ready_tx, exit_tx))?;

        Ok((
            WorkerHandle {
                id,
                running,
                exited: exit_rx,
                thread: Some(thread),
            },
            ready_rx,
        ))
    }

    fn run(self, ready: &Sender<Result<()>>, exited: Sender<()>) {
        let _guard = ExitGuard {
            slot: Arc::clone(&self.slot),
            owner: self.owner,
            id: self.id,
            _exited: exited,
        };

        if let Err(err) = self.acquire() {
            let _ = ready.send(Err(err));
            return;
        }
        let _ = ready.send(Ok(()));

        self.capture_loop();
    }

    /// Open the device, walking the backend fallback order.
    fn acquire(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        if let Some(stale) = slot.take() {
            warn!(device = %stale.id, "Dropping handle left by a previous session");
        }
        let mut failures = Vec::new();

        for backend in Backend::FALLBACK_ORDER {
            match self.provider.open(self.id, backend) {
                Ok(device) => {
                    info!(
                        device = %self.id,
                        %backend,
                        card = %device.capabilities().card,
                        "Camera started"
                    );
                    *slot = Some(HeldDevice {
                        id: self.id,
                        owner: self.owner,
                        device,
                    });
                    return Ok(());
                }
                Err(err) => {
                    debug!(
                        device = %self.id,
                        %backend,
                        error = %err,
                        "Backend failed to open device"
                    );
                    failures.push(format!("{backend}: {err}"));
                }
            }
        }

        Err(CameraError::unavailable(self.id, failures.join("; ")))
    }

    fn capture_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            match self.step() {
                Step::Frame(frame) => {
                    // A stop may have landed during the read; the controller
                    // can already have moved on to another session.
                    if !self.running.load(Ordering::Acquire) {
                        debug!(device = %self.id, "Dropping frame read during stop");
                        break;
                    }
                    self.publisher.publish(frame);
                    thread::sleep(self.frame_interval);
                }
                Step::Skip => thread::sleep(self.retry_delay),
                Step::Fatal(err) => {
                    if !self.running.load(Ordering::Acquire) {
                        debug!(device = %self.id, error = %err, "Capture ended during stop");
                        break;
                    }
                    error!(device = %self.id, error = %err, "Capture loop terminated");
                    self.notifier.error(err.to_string());
                    break;
                }
            }
        }
        debug!(device = %self.id, "Capture loop exited");
    }

    /// Pull one frame and run it through the filter.
    ///
    /// The slot lock is held for the device read only.
    pub fn step(&self) -> Step {
        let read = {
            let mut slot = self.slot.lock();
            match slot.as_mut() {
                Some(held) if held.owner == self.owner => held.device.read_frame(),
                _ => {
                    return Step::Fatal(CameraError::CaptureFailure(format!(
                        "device {} handle was reclaimed",
                        self.id
                    )))
                }
            }
        };

        match read {
            Ok(Some(raw)) => match self.filter.apply(&raw) {
                Ok(Some(frame)) => Step::Frame(frame),
                Ok(None) => Step::Skip,
                Err(err) => Step::Fatal(err),
            },
            Ok(None) => Step::Skip,
            Err(err) => Step::Fatal(err),
        }
    }
}

/// Releases the device when the worker thread ends, on every exit path.
struct ExitGuard<D: CaptureDevice> {
    slot: Arc<DeviceSlot<D>>,
    owner: u64,
    id: DeviceId,
    // Dropped after the release so observers see the device gone first.
    _exited: Sender<()>,
}

impl<D: CaptureDevice> Drop for ExitGuard<D> {
    fn drop(&mut self) {
        if self.slot.release_owned(self.owner).is_some() {
            debug!(device = %self.id, "Released device");
        }
    }
}

/// Controller-side handle to a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    id: DeviceId,
    running: Arc<AtomicBool>,
    exited: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Device the worker was started for.
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    /// Receiver that disconnects once the worker thread has finished.
    pub fn exit_signal(&self) -> Receiver<()> {
        self.exited.clone()
    }

    /// Whether the worker thread has finished.
    pub fn has_exited(&self) -> bool {
        matches!(self.exited.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Ask the loop to stop at its next checkpoint.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Request a stop and wait up to `timeout` for the thread to finish.
    pub fn stop(mut self, timeout: Duration) -> StopOutcome {
        self.request_stop();

        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!(device = %self.id, "Capture worker panicked");
                    }
                }
                StopOutcome::Joined
            }
            Err(RecvTimeoutError::Timeout) => StopOutcome::TimedOut,
        }
    }
}
