//! Mock devices for testing without hardware.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::traits::{
    Backend, CameraError, CaptureDevice, DeviceCapabilities, DeviceId, DeviceProvider, Format,
    FourCC, RawFrame, Result,
};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Eight vertical color bars.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with the given B, G, R values.
    Solid(u8, u8, u8),
}

impl TestPattern {
    /// Render the pattern into a BGR frame.
    pub fn frame(self, width: u32, height: u32, sequence: u32) -> RawFrame {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..height {
            for x in 0..width {
                let (b, g, r) = match self {
                    Self::ColorBars => color_bar(x, width),
                    Self::Gradient => {
                        #[allow(clippy::cast_possible_truncation)]
                        let v = ((x * 255) / width.max(1)) as u8;
                        (v, v, v)
                    }
                    Self::Solid(b, g, r) => (b, g, r),
                };
                data.extend_from_slice(&[b, g, r]);
            }
        }

        RawFrame {
            width,
            height,
            data,
            sequence,
        }
    }
}

/// BGR solid-color frame.
pub fn solid_frame(width: u32, height: u32, bgr: (u8, u8, u8)) -> RawFrame {
    TestPattern::Solid(bgr.0, bgr.1, bgr.2).frame(width, height, 0)
}

fn color_bar(x: u32, width: u32) -> (u8, u8, u8) {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black as (b, g, r)
    const BARS: [(u8, u8, u8); 8] = [
        (235, 235, 235),
        (16, 235, 235),
        (235, 235, 16),
        (16, 235, 16),
        (235, 16, 235),
        (16, 16, 235),
        (235, 16, 16),
        (16, 16, 16),
    ];
    let bar_width = (width / 8).max(1);
    let idx = (x / bar_width).min(7) as usize;
    BARS.get(idx).copied().unwrap_or_default()
}

/// Counters shared between a [`MockProvider`] and the devices it opens.
#[derive(Debug, Default)]
pub struct HandleStats {
    open: AtomicUsize,
    peak: AtomicUsize,
    opened_total: AtomicU32,
}

impl HandleStats {
    /// Handles currently open.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Largest number of simultaneously open handles seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Successful opens since creation.
    pub fn opened_total(&self) -> u32 {
        self.opened_total.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock provider for testing without hardware.
#[derive(Debug, Clone)]
pub struct MockProvider {
    available: Vec<DeviceId>,
    refused_backends: Vec<Backend>,
    pattern: TestPattern,
    width: u32,
    height: u32,
    fail_after: Option<u32>,
    empty_every: Option<u32>,
    read_delay: Duration,
    stats: Arc<HandleStats>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a provider exposing devices 0 and 1.
    pub fn new() -> Self {
        Self {
            available: vec![DeviceId(0), DeviceId(1)],
            refused_backends: Vec::new(),
            pattern: TestPattern::ColorBars,
            width: 32,
            height: 24,
            fail_after: None,
            empty_every: None,
            read_delay: Duration::ZERO,
            stats: Arc::new(HandleStats::default()),
        }
    }

    /// Set which device indices can be opened.
    #[must_use]
    pub fn with_devices(mut self, ids: &[u32]) -> Self {
        self.available = ids.iter().copied().map(DeviceId).collect();
        self
    }

    /// Make opens with the given backend fail.
    #[must_use]
    pub fn refusing(mut self, backend: Backend) -> Self {
        self.refused_backends.push(backend);
        self
    }

    /// Set the pattern devices produce.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Fail every read after `frames` successful ones.
    #[must_use]
    pub const fn failing_after(mut self, frames: u32) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Report "no frame" on every `n`th read.
    #[must_use]
    pub const fn empty_every(mut self, n: u32) -> Self {
        self.empty_every = Some(n);
        self
    }

    /// Block each read for `delay`.
    #[must_use]
    pub const fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Shared handle counters.
    pub fn stats(&self) -> Arc<HandleStats> {
        Arc::clone(&self.stats)
    }
}

impl DeviceProvider for MockProvider {
    type Device = MockDevice;

    fn open(&self, id: DeviceId, backend: Backend) -> Result<MockDevice> {
        if !self.available.contains(&id) {
            return Err(CameraError::unavailable(id, "no such mock device"));
        }
        if self.refused_backends.contains(&backend) {
            return Err(CameraError::unavailable(
                id,
                format!("backend {backend} refused"),
            ));
        }

        self.stats.acquire();
        Ok(MockDevice {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: format!("Mock Camera {id}"),
                bus_info: format!("mock:{id}"),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(self.width, self.height, FourCC::BGR3),
            backend,
            pattern: self.pattern,
            frame_count: 0,
            reads: 0,
            fail_after: self.fail_after,
            empty_every: self.empty_every,
            read_delay: self.read_delay,
            stats: Arc::clone(&self.stats),
        })
    }
}

/// Mock device for testing without hardware.
#[derive(Debug)]
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    backend: Backend,
    pattern: TestPattern,
    frame_count: u32,
    reads: u32,
    fail_after: Option<u32>,
    empty_every: Option<u32>,
    read_delay: Duration,
    stats: Arc<HandleStats>,
}

impl MockDevice {
    /// Backend the device was opened with.
    pub const fn backend(&self) -> Backend {
        self.backend
    }
}

impl CaptureDevice for MockDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> &Format {
        &self.format
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>> {
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }

        self.reads += 1;
        if self.empty_every.is_some_and(|n| self.reads % n == 0) {
            return Ok(None);
        }
        if self.fail_after.is_some_and(|n| self.frame_count >= n) {
            return Err(CameraError::CaptureFailure("mock device unplugged".to_owned()));
        }

        let seq = self.frame_count;
        self.frame_count += 1;
        Ok(Some(self.pattern.frame(
            self.format.width,
            self.format.height,
            seq,
        )))
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.stats.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let provider = MockProvider::new();
        let device = provider
            .open(DeviceId(0), Backend::Negotiated)
            .expect("open should succeed");
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
        assert_eq!(device.backend(), Backend::Negotiated);
    }

    #[test]
    fn test_handle_counting() {
        let provider = MockProvider::new();
        let stats = provider.stats();

        let a = provider.open(DeviceId(0), Backend::Negotiated).expect("open 0");
        let b = provider.open(DeviceId(1), Backend::Negotiated).expect("open 1");
        assert_eq!(stats.open(), 2);
        drop(a);
        drop(b);
        assert_eq!(stats.open(), 0);
        assert_eq!(stats.peak(), 2);
        assert_eq!(stats.opened_total(), 2);
    }

    #[test]
    fn test_unknown_device_and_refused_backend() {
        let provider = MockProvider::new().refusing(Backend::Negotiated);
        assert!(provider.open(DeviceId(9), Backend::DriverDefault).is_err());
        assert!(provider.open(DeviceId(0), Backend::Negotiated).is_err());
        assert!(provider.open(DeviceId(0), Backend::DriverDefault).is_ok());
        assert!(provider.probe(DeviceId(0)));
        assert_eq!(provider.stats().open(), 0);
    }

    #[test]
    fn test_mock_stream_sequence() {
        let provider = MockProvider::new();
        let mut device = provider
            .open(DeviceId(0), Backend::Negotiated)
            .expect("open should succeed");

        let frame1 = device.read_frame().expect("read").expect("frame");
        let frame2 = device.read_frame().expect("read").expect("frame");
        assert_eq!(frame1.sequence, 0);
        assert_eq!(frame2.sequence, 1);
        assert!(frame1.is_well_formed());
    }

    #[test]
    fn test_failure_and_empty_reads() {
        let provider = MockProvider::new().failing_after(1).empty_every(2);
        let mut device = provider
            .open(DeviceId(0), Backend::Negotiated)
            .expect("open should succeed");

        assert!(device.read_frame().expect("first read").is_some());
        assert!(device.read_frame().expect("second read").is_none());
        assert!(device.read_frame().is_err());
    }

    #[test]
    fn test_color_bars_pattern() {
        let frame = TestPattern::ColorBars.frame(64, 4, 0);
        // First bar white, sixth bar red
        assert_eq!(frame.pixel_at(4, 2), Some((235, 235, 235)));
        assert_eq!(frame.pixel_at(5 * 8 + 4, 2), Some((16, 16, 235)));
    }

    #[test]
    fn test_gradient_pattern() {
        let frame = TestPattern::Gradient.frame(64, 4, 0);
        let (left, _, _) = frame.pixel_at(0, 0).expect("left pixel");
        let (right, _, _) = frame.pixel_at(63, 3).expect("right pixel");
        assert!(left < 10);
        assert!(right > 200);
    }
}
