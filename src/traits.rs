//! Core traits and types for the capture pipeline.

use std::fmt;
use std::time::Duration;

/// Index of a capture device (e.g., 0 for /dev/video0).
///
/// Indices are not stable across enumerations; an id is only meaningful
/// relative to the enumeration that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Numeric index of the device.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl From<u32> for DeviceId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// BGR3 pixel format (24-bit BGR).
    pub const BGR3: Self = Self::new(b"BGR3");

    /// Bytes per pixel for packed formats, `None` for compressed ones.
    #[must_use]
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            Self::YUYV => Some(2),
            Self::RGB3 | Self::BGR3 => Some(3),
            _ => None,
        }
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride), zero for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes, zero when the driver decides.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = fourcc.bytes_per_pixel().map_or(0, |bpp| width * bpp);
        Self {
            width,
            height,
            fourcc,
            stride,
            size: stride * height,
        }
    }
}

/// Strategy used when opening a device.
///
/// Opening walks [`Backend::FALLBACK_ORDER`]; the first backend that yields a
/// streaming device wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Negotiate the configured resolution and a preferred pixel format.
    Negotiated,
    /// Keep whatever supported format the driver is currently set to.
    DriverDefault,
}

impl Backend {
    /// Order in which backends are attempted.
    pub const FALLBACK_ORDER: [Self; 2] = [Self::Negotiated, Self::DriverDefault];
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negotiated => f.write_str("negotiated"),
            Self::DriverDefault => f.write_str("driver-default"),
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// A captured frame as 3 interleaved 8-bit channels in B, G, R order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
    /// Driver sequence number.
    pub sequence: u32,
}

impl RawFrame {
    /// Number of interleaved channels.
    pub const CHANNELS: usize = 3;

    /// Whether dimensions are non-zero and the buffer matches them.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * Self::CHANNELS
    }

    /// Get the `(b, g, r)` triple at the given coordinates.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        match self.data.get(offset..offset + Self::CHANNELS)? {
            [b, g, r] => Some((*b, *g, *r)),
            _ => None,
        }
    }
}

/// A compressed image ready for transport to a display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// JPEG payload.
    pub data: Vec<u8>,
    /// Width of the encoded image.
    pub width: u32,
    /// Height of the encoded image.
    pub height: u32,
    /// Sequence number of the raw frame this was produced from.
    pub sequence: u32,
}

impl EncodedFrame {
    /// MIME type of the payload.
    pub const MIME_TYPE: &'static str = "image/jpeg";

    /// Whether two frames carry the same encoded bytes.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.data == other.data
    }

    /// Self-describing payload: `data:image/jpeg;base64,...`.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        use base64::Engine as _;

        let payload = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{payload}", Self::MIME_TYPE)
    }
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The permission gate refused hardware access.
    #[error("Camera permission denied")]
    PermissionDenied,
    /// No backend could open the device, or the id is not a known device.
    #[error("Device {id} unavailable: {reason}")]
    DeviceUnavailable {
        /// Requested device.
        id: DeviceId,
        /// Why the device could not be used.
        reason: String,
    },
    /// Device read or frame processing failed mid-session.
    #[error("Capture failure: {0}")]
    CaptureFailure(String),
    /// Open requested while a session is active.
    #[error("Camera {0} already running")]
    AlreadyRunning(DeviceId),
    /// The capture worker did not stop within the bound.
    #[error("Capture worker did not stop within {0:?}")]
    StopTimeout(Duration),
    /// The device delivers a pixel format the pipeline cannot convert.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(FourCC),
    /// JPEG encoding or decoding failed.
    #[error("Image codec error: {0}")]
    Encode(#[from] image::ImageError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Shorthand for [`CameraError::DeviceUnavailable`].
    pub fn unavailable<S: Into<String>>(id: DeviceId, reason: S) -> Self {
        Self::DeviceUnavailable {
            id,
            reason: reason.into(),
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// An open capture device.
///
/// A device is owned by exactly one capture worker at a time; dropping it
/// releases the underlying handle.
pub trait CaptureDevice: Send {
    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Format frames are delivered in.
    fn format(&self) -> &Format;

    /// Pull the next frame.
    ///
    /// `Ok(None)` means no frame was ready within the read timeout; callers
    /// retry rather than treat it as fatal.
    fn read_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Opens capture devices by index.
pub trait DeviceProvider: Send + Sync + 'static {
    /// Device type produced by this provider.
    type Device: CaptureDevice + 'static;

    /// Open a device with the given backend.
    fn open(&self, id: DeviceId, backend: Backend) -> Result<Self::Device>;

    /// Check whether a device can be opened, releasing it immediately.
    fn probe(&self, id: DeviceId) -> bool {
        self.open(id, Backend::DriverDefault).is_ok()
    }

    /// List devices from a platform registry, if the platform has one.
    fn discover(&self) -> Option<Vec<DeviceId>> {
        None
    }
}
