//! Integration tests using vivid virtual camera.
//!
//! These tests require:
//! - The `integration` feature flag: `cargo test --features integration`
//! - The vivid kernel module loaded, e.g. `modprobe vivid n_devs=2`
//! - Access to /dev/video* devices (may require sudo or video group membership)
//!
//! Expected vivid configuration:
//! - Device 1: Gray Ramp pattern (gradient) - `test_pattern=20`
//! - Device 2: 100% Colorbar pattern - `test_pattern=1`
//!
//! Tests will fail if vivid is not available or not configured correctly.

#![cfg(feature = "integration")]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::GenericImageView;
use serial_test::serial;
use tint_cam::enumerate::{DeviceEnumerator, DeviceSlot, HeldDevice};
use tint_cam::{
    Backend, CaptureDevice, Config, DeviceId, DeviceProvider, EnumerationPolicy, FourCC,
    FrameFilter, Notifier, RawFrame, SessionController, SessionState, V4L2Device, V4L2Provider,
};

/// Find all available vivid virtual camera devices.
///
/// Uses sysfs to check device driver name before opening, avoiding
/// unnecessary device opens on real cameras.
fn find_vivid_devices() -> Vec<DeviceId> {
    let video4linux = Path::new("/sys/class/video4linux");
    if !video4linux.exists() {
        return Vec::new();
    }

    let provider = V4L2Provider::new(Config::default());
    let mut devices = Vec::new();
    for index in 0..10 {
        let name_path = video4linux.join(format!("video{index}")).join("name");
        let Ok(name) = fs::read_to_string(&name_path) else {
            continue;
        };

        if !name.to_lowercase().contains("vivid") {
            continue;
        }

        if provider.probe(DeviceId(index)) {
            devices.push(DeviceId(index));
        }
    }
    devices
}

/// Fail the test if vivid is not available; returns the first vivid device.
///
/// Integration tests MUST have vivid loaded - they should fail, not silently skip.
macro_rules! require_vivid {
    () => {
        match find_vivid_devices().first().copied() {
            Some(id) => id,
            None => {
                panic!(
                    "vivid virtual camera not available.\n\
                     Load vivid with: sudo modprobe vivid n_devs=2\n\
                     Or run unit tests only: cargo test --lib"
                );
            }
        }
    };
}

/// Returns (gradient device, colorbar device).
macro_rules! require_vivid_pair {
    () => {{
        let devices = find_vivid_devices();
        if devices.len() < 2 {
            panic!(
                "Two vivid devices required but found {}.\n\
                 Load vivid with: sudo modprobe vivid n_devs=2\n\
                 Or run unit tests only: cargo test --lib",
                devices.len()
            );
        }
        (devices[0], devices[1])
    }};
}

fn next_frame(device: &mut V4L2Device) -> RawFrame {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(frame) = device.read_frame().expect("Failed to read frame") {
            return frame;
        }
    }
    panic!("no frame within 5s");
}

fn fast_config() -> Config {
    Config {
        frame_interval: Duration::from_millis(5),
        ..Config::default()
    }
}

#[test]
#[serial]
fn test_vivid_device_open() {
    let id = require_vivid!();

    let device =
        V4L2Device::open(id, Backend::Negotiated, &Config::default()).expect("Failed to open");
    let caps = device.capabilities();

    assert!(caps.driver.contains("vivid"), "Expected vivid driver");
    assert!(caps.can_capture, "vivid should support capture");
    assert!(caps.can_stream, "vivid should support streaming");

    let format = device.format();
    assert_eq!((format.width, format.height), (640, 480));
    assert_eq!(format.fourcc, FourCC::YUYV);
}

#[test]
#[serial]
fn test_vivid_driver_default_backend() {
    let id = require_vivid!();

    let mut device =
        V4L2Device::open(id, Backend::DriverDefault, &Config::default()).expect("Failed to open");
    let frame = next_frame(&mut device);

    assert!(frame.is_well_formed());
    assert_eq!(frame.width, device.format().width);
    assert_eq!(frame.height, device.format().height);
}

#[test]
#[serial]
fn test_vivid_capture_sequence_increases() {
    let id = require_vivid!();

    let mut device =
        V4L2Device::open(id, Backend::Negotiated, &Config::default()).expect("Failed to open");
    let first = next_frame(&mut device);
    let second = next_frame(&mut device);

    assert!(second.sequence > first.sequence);
    assert_eq!(first.data.len(), 640 * 480 * RawFrame::CHANNELS);
}

#[test]
#[serial]
fn test_vivid_gradient_is_gray() {
    let (gradient, _) = require_vivid_pair!();

    let mut device =
        V4L2Device::open(gradient, Backend::Negotiated, &Config::default()).expect("Failed to open");
    let frame = next_frame(&mut device);

    // Gray ramp: every channel roughly equal
    for x in [0, 160, 320, 480, 639] {
        let (b, g, r) = frame.pixel_at(x, 240).expect("pixel in bounds");
        assert!(b.abs_diff(g) < 16 && g.abs_diff(r) < 16, "not gray at {x}: {b},{g},{r}");
    }
}

#[test]
#[serial]
fn test_vivid_filter_tints_red() {
    let (gradient, _) = require_vivid_pair!();

    let mut device =
        V4L2Device::open(gradient, Backend::Negotiated, &Config::default()).expect("Failed to open");
    let frame = next_frame(&mut device);
    let encoded = FrameFilter::default()
        .apply(&frame)
        .expect("Failed to encode")
        .expect("frame is well formed");

    let decoded = image::load_from_memory_with_format(&encoded.data, image::ImageFormat::Jpeg)
        .expect("Failed to decode");
    assert_eq!(decoded.dimensions(), (640, 480));

    let (mut red, mut blue) = (0u64, 0u64);
    for (_, _, pixel) in decoded.to_rgb8().enumerate_pixels() {
        red += u64::from(pixel[0]);
        blue += u64::from(pixel[2]);
    }
    assert!(red > blue * 2, "red {red} should dominate blue {blue}");
}

#[test]
#[serial]
fn test_vivid_enumeration_skips_held_device() {
    let id = require_vivid!();
    let config = Config {
        probe_max_index: 9,
        ..Config::default()
    };
    let provider = Arc::new(V4L2Provider::new(config.clone()));
    let slot = Arc::new(DeviceSlot::new());

    // Hold the device the way a running session does
    let device = provider
        .open(id, Backend::Negotiated)
        .expect("Failed to open vivid device");
    *slot.lock() = Some(HeldDevice {
        id,
        owner: 1,
        device,
    });

    for policy in [EnumerationPolicy::Probe, EnumerationPolicy::Discover] {
        let enumerator = DeviceEnumerator::new(
            Arc::clone(&provider),
            Arc::clone(&slot),
            &Config {
                enumeration: policy,
                ..config.clone()
            },
        );
        assert!(enumerator.enumerate().contains(&id), "{policy:?} missed {id}");
    }

    // The held handle is untouched and still streams
    let mut guard = slot.lock();
    let held = guard.as_mut().expect("device still held");
    assert_eq!(held.owner, 1);
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut frame = None;
    while frame.is_none() && Instant::now() < deadline {
        frame = held.device.read_frame().expect("held device should still read");
    }
    assert!(frame.is_some_and(|frame| frame.is_well_formed()));
}

#[test]
#[serial]
fn test_vivid_session_publishes_frames() {
    let id = require_vivid!();
    let config = fast_config();
    let mut session =
        SessionController::new(V4L2Provider::new(config.clone()), config, Notifier::detached());

    assert!(session.list().contains(&id));
    session.open(id).expect("Failed to open session");
    assert_eq!(session.state(), SessionState::Running);

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.publisher().latest().is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let published = session.publisher().latest().expect("no frame published");
    assert!(published.frame.to_data_url().starts_with("data:image/jpeg;base64,"));

    session.close();
    assert_eq!(session.state(), SessionState::Idle);

    // The handle was released: the device opens again right away
    session.open(id).expect("Failed to reopen");
    session.close();
}
