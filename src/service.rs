//! Consumer-facing camera service.
//!
//! [`CameraService`] owns a dispatcher thread that holds the
//! [`SessionController`]. Commands are queued from any thread and run in
//! order on the dispatcher; properties are read from shared snapshots and
//! never wait on device I/O.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::events::{Event, Notifier};
use crate::logging::LogBook;
use crate::permission::{PendingOperation, PendingQueue, PermissionGate, PermissionStatus};
use crate::publisher::{FramePublisher, PublishedFrame};
use crate::session::{SessionController, SessionState};
use crate::traits::{CameraError, DeviceId, DeviceProvider, Result};

/// Request queued for the dispatcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Re-enumerate devices.
    Refresh,
    /// Open the camera with this raw index.
    Open(i64),
    /// Close the active session.
    Close,
    /// A consent request resolved.
    Permission(PermissionStatus),
    /// Close everything and stop the dispatcher.
    Shutdown,
}

/// Handle to a running camera service.
///
/// Dropping it closes the active session and joins the dispatcher thread.
pub struct CameraService {
    commands: Sender<Command>,
    publisher: Arc<FramePublisher>,
    devices: Arc<RwLock<Vec<DeviceId>>>,
    state: Arc<RwLock<SessionState>>,
    logs: Arc<LogBook>,
    dispatcher: Option<JoinHandle<()>>,
}

impl CameraService {
    /// Start the dispatcher thread.
    pub fn spawn<P, G>(
        provider: P,
        gate: G,
        config: Config,
        logs: Arc<LogBook>,
        notifier: Notifier,
    ) -> Result<Self>
    where
        P: DeviceProvider,
        G: PermissionGate,
    {
        let (commands, inbox) = unbounded();
        let session = SessionController::new(provider, config, notifier.clone());
        let publisher = Arc::clone(session.publisher());
        let devices = Arc::new(RwLock::new(Vec::new()));
        let state = Arc::new(RwLock::new(SessionState::Idle));

        let dispatcher = Dispatcher {
            session,
            gate,
            inbox,
            requests: commands.clone(),
            pending: PendingQueue::default(),
            notifier,
            devices: Arc::clone(&devices),
            state: Arc::clone(&state),
        };
        let handle = thread::Builder::new()
            .name("camera-service".to_owned())
            .spawn(move || dispatcher.run())?;

        Ok(Self {
            commands,
            publisher,
            devices,
            state,
            logs,
            dispatcher: Some(handle),
        })
    }

    /// Queue a device list refresh.
    pub fn refresh_list(&self) {
        self.send(Command::Refresh);
    }

    /// Queue opening camera `id`. Negative or oversized ids fail with an
    /// error notification.
    pub fn open(&self, id: i64) {
        self.send(Command::Open(id));
    }

    /// Queue closing the active session.
    pub fn close(&self) {
        self.send(Command::Close);
    }

    /// Drop every diagnostic line.
    pub fn clear_logs(&self) {
        self.logs.clear();
    }

    /// Latest frame as a `data:image/jpeg;base64,...` URL.
    pub fn frame_data(&self) -> Option<String> {
        self.publisher.latest().map(|p| p.frame.to_data_url())
    }

    /// Latest frame with its publish version.
    pub fn latest_frame(&self) -> Option<PublishedFrame> {
        self.publisher.latest()
    }

    /// Frame publisher shared with the capture worker.
    pub const fn publisher(&self) -> &Arc<FramePublisher> {
        &self.publisher
    }

    /// Devices found by the last refresh.
    pub fn camera_ids(&self) -> Vec<DeviceId> {
        self.devices.read().clone()
    }

    /// Session state as of the last completed command.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Kept diagnostic lines, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.logs.lines()
    }

    /// Close the session and join the dispatcher.
    pub fn shutdown(mut self) {
        self.stop_dispatcher();
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!(?command, "Camera service is no longer running");
        }
    }

    fn stop_dispatcher(&mut self) {
        let Some(handle) = self.dispatcher.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if handle.join().is_err() {
            error!("Camera service thread panicked");
        }
    }
}

impl Drop for CameraService {
    fn drop(&mut self) {
        self.stop_dispatcher();
    }
}

struct Dispatcher<P: DeviceProvider, G> {
    session: SessionController<P>,
    gate: G,
    inbox: Receiver<Command>,
    requests: Sender<Command>,
    pending: PendingQueue,
    notifier: Notifier,
    devices: Arc<RwLock<Vec<DeviceId>>>,
    state: Arc<RwLock<SessionState>>,
}

impl<P: DeviceProvider, G: PermissionGate> Dispatcher<P, G> {
    fn run(mut self) {
        debug!("Camera service started");
        let inbox = self.inbox.clone();

        loop {
            let exited = self.session.exit_signal().unwrap_or_else(never);
            // `None` means the worker exited on its own
            let command = select! {
                recv(inbox) -> command => Some(command.unwrap_or(Command::Shutdown)),
                recv(exited) -> _ => None,
            };

            match command {
                Some(command) => {
                    if self.handle(command).is_break() {
                        break;
                    }
                }
                None => {
                    if self.session.reap() {
                        self.sync();
                    }
                }
            }
        }

        self.session.close();
        self.sync();
        debug!("Camera service stopped");
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Refresh => self.submit(PendingOperation::RefreshList),
            Command::Open(raw) => match u32::try_from(raw) {
                Ok(id) => self.submit(PendingOperation::Open(DeviceId(id))),
                Err(_) => {
                    let message = format!("Invalid camera ID: {raw}");
                    warn!("{message}");
                    self.notifier.error(message);
                    self.finish();
                }
            },
            Command::Close => {
                self.session.close();
                self.finish();
            }
            Command::Permission(status) => self.resolve(status),
            Command::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn submit(&mut self, op: PendingOperation) {
        // Earlier operations still waiting on consent run first
        if self.pending.is_waiting() {
            self.pending.defer(op);
            debug!(?op, "Queued behind pending permission request");
            return;
        }

        match self.gate.status() {
            PermissionStatus::Granted => self.execute(op),
            PermissionStatus::Denied => self.reject(op),
            PermissionStatus::Undetermined => {
                self.pending.defer(op);
                info!("Requesting camera permission");
                let requests = self.requests.clone();
                self.gate.request(Box::new(move |status| {
                    let _ = requests.send(Command::Permission(status));
                }));
            }
        }
    }

    fn resolve(&mut self, status: PermissionStatus) {
        debug!(?status, "Camera permission resolved");
        for op in self.pending.drain() {
            if status == PermissionStatus::Granted {
                self.execute(op);
            } else {
                self.reject(op);
            }
        }
    }

    fn execute(&mut self, op: PendingOperation) {
        match op {
            PendingOperation::RefreshList => {
                self.session.list();
            }
            PendingOperation::Open(id) => {
                if let Err(err) = self.session.open(id) {
                    warn!(device = %id, error = %err, "Failed to open camera");
                    self.notifier.error(err.to_string());
                }
            }
        }
        self.finish();
    }

    fn reject(&mut self, op: PendingOperation) {
        let err = CameraError::PermissionDenied;
        warn!(?op, error = %err, "Camera operation refused");
        self.notifier.error(err.to_string());
        self.finish();
    }

    fn finish(&self) {
        self.sync();
        self.notifier.send(Event::OperationFinished);
    }

    fn sync(&self) {
        *self.devices.write() = self.session.devices().map(<[_]>::to_vec).unwrap_or_default();
        *self.state.write() = self.session.state();
    }
}
