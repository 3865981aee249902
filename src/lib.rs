//! Tint-Cam: a tinted camera capture pipeline over V4L2
//!
//! Frames are pulled from a capture device on a dedicated worker thread,
//! color-scaled and JPEG-encoded, and published as the latest frame for a
//! consumer. Devices sit behind the [`DeviceProvider`] trait so the whole
//! pipeline runs against mock devices in tests.

pub mod config;
pub mod convert;
pub mod device;
pub mod enumerate;
pub mod events;
pub mod filter;
pub mod logging;
pub mod permission;
pub mod publisher;
pub mod service;
pub mod session;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod mock;

pub use config::{Config, EnumerationPolicy, FilterSettings};
pub use device::{V4L2Device, V4L2Provider};
pub use events::{ErrorSource, Event, Notifier};
pub use filter::FrameFilter;
pub use logging::{DiagnosticsLayer, LogBook, LogSink, SinkRegistry};
pub use permission::{AlwaysGranted, PermissionGate, PermissionStatus};
pub use publisher::{FramePublisher, PublishedFrame};
pub use service::CameraService;
pub use session::{SessionController, SessionState};
pub use traits::{
    Backend, CameraError, CaptureDevice, DeviceCapabilities, DeviceId, DeviceProvider,
    EncodedFrame, Format, FourCC, RawFrame,
};
