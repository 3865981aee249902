//! V4L2 device implementation using the v4l crate.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::config::Config;
use crate::convert;
use crate::traits::{
    Backend, CameraError, CaptureDevice, DeviceCapabilities, DeviceId, DeviceProvider, Format,
    FourCC, RawFrame, Result,
};

const SYSFS_VIDEO4LINUX: &str = "/sys/class/video4linux";

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    stream: Stream<'static>,
    capabilities: DeviceCapabilities,
    format: Format,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0) and start streaming.
    pub fn open(id: DeviceId, backend: Backend, config: &Config) -> Result<Self> {
        let device = Device::new(id.index() as usize)
            .map_err(|err| CameraError::unavailable(id, err.to_string()))?;

        let capabilities = query_capabilities(&device)
            .map_err(|err| CameraError::unavailable(id, err.to_string()))?;
        if !capabilities.can_capture || !capabilities.can_stream {
            return Err(CameraError::unavailable(
                id,
                format!("{} cannot stream video", capabilities.card),
            ));
        }

        let format = match backend {
            Backend::Negotiated => negotiate_format(&device, config.width, config.height),
            Backend::DriverDefault => current_format(&device),
        }
        .map_err(|err| CameraError::unavailable(id, err.to_string()))?;
        convert::ensure_convertible(&format)?;

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
            .map_err(|err| CameraError::unavailable(id, err.to_string()))?;
        stream.set_timeout(config.read_timeout);

        debug!(
            device = %id,
            %backend,
            card = %capabilities.card,
            width = format.width,
            height = format.height,
            fourcc = ?format.fourcc,
            "V4L2 device streaming"
        );

        Ok(Self {
            stream,
            capabilities,
            format,
        })
    }
}

impl CaptureDevice for V4L2Device {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> &Format {
        &self.format
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>> {
        let (buf, meta) = match self.stream.next() {
            Ok(next) => next,
            Err(err) if is_no_frame(&err) => return Ok(None),
            Err(err) => return Err(CameraError::CaptureFailure(err.to_string())),
        };

        let used = (meta.bytesused as usize).min(buf.len());
        let data = buf.get(..used).unwrap_or(buf);
        if data.is_empty() {
            return Ok(None);
        }

        convert::to_bgr(data, &self.format, meta.sequence)
    }
}

/// Opens devices under /dev/video*.
#[derive(Debug, Clone)]
pub struct V4L2Provider {
    config: Config,
}

impl V4L2Provider {
    /// Create a provider that opens devices with the given settings.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl DeviceProvider for V4L2Provider {
    type Device = V4L2Device;

    fn open(&self, id: DeviceId, backend: Backend) -> Result<V4L2Device> {
        V4L2Device::open(id, backend, &self.config)
    }

    fn probe(&self, id: DeviceId) -> bool {
        // Capability query only: streaming is not started for a probe.
        Device::new(id.index() as usize)
            .and_then(|device| query_capabilities(&device))
            .is_ok_and(|caps| caps.can_capture)
    }

    fn discover(&self) -> Option<Vec<DeviceId>> {
        let root = Path::new(SYSFS_VIDEO4LINUX);
        let entries = fs::read_dir(root).ok()?;

        let mut ids: Vec<DeviceId> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()?
                    .strip_prefix("video")?
                    .parse::<u32>()
                    .ok()
            })
            .map(DeviceId)
            .collect();
        ids.sort_unstable();
        Some(ids)
    }
}

fn query_capabilities(device: &Device) -> io::Result<DeviceCapabilities> {
    let caps = device.query_caps()?;
    Ok(DeviceCapabilities {
        driver: caps.driver,
        card: caps.card,
        bus_info: caps.bus,
        can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
        can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
    })
}

fn current_format(device: &Device) -> io::Result<Format> {
    let fmt = device.format()?;

    Ok(Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    })
}

fn negotiate_format(device: &Device, width: u32, height: u32) -> io::Result<Format> {
    let mut fmt = device.format()?;

    fmt.width = width;
    fmt.height = height;
    fmt.fourcc = FourCC::YUYV.into();

    // The driver may substitute any format it prefers.
    let fmt = device.set_format(&fmt)?;

    Ok(Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    })
}

fn is_no_frame(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
