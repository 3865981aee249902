//! Runtime configuration.

use std::time::Duration;

/// How the device list is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumerationPolicy {
    /// Open and release each index in `0..=probe_max_index`.
    #[default]
    Probe,
    /// Report the full probe range without touching hardware.
    ///
    /// For platforms where speculative opens are not allowed before consent.
    AssumeRange,
    /// Ask the platform for its device nodes, probing when it has no listing.
    Discover,
}

/// Channel gains and codec settings for the frame filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    /// Multiplier for channel 0.
    pub blue_gain: f32,
    /// Multiplier for channel 1.
    pub green_gain: f32,
    /// Multiplier for channel 2.
    pub red_gain: f32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            blue_gain: 0.35,
            green_gain: 0.35,
            red_gain: 1.8,
            jpeg_quality: 70,
        }
    }
}

/// Settings shared by the enumerator, capture worker and session controller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Highest device index probed (inclusive).
    pub probe_max_index: u32,
    /// Device list strategy.
    pub enumeration: EnumerationPolicy,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Number of mmap buffers.
    pub buffer_count: u32,
    /// Longest a single device read may block.
    pub read_timeout: Duration,
    /// Delay between capture iterations.
    pub frame_interval: Duration,
    /// Delay before retrying when the device had no frame ready.
    pub retry_delay: Duration,
    /// Bound on waiting for the capture worker to stop.
    pub stop_timeout: Duration,
    /// Bound on waiting for the capture worker to acquire its device.
    pub open_timeout: Duration,
    /// Frame filter settings.
    pub filter: FilterSettings,
    /// Number of diagnostic lines kept.
    pub log_capacity: usize,
    /// Maximum characters per diagnostic line.
    pub log_line_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_max_index: 5,
            enumeration: EnumerationPolicy::default(),
            width: 640,
            height: 480,
            buffer_count: 4,
            read_timeout: Duration::from_millis(200),
            frame_interval: Duration::from_millis(33),
            retry_delay: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(2),
            open_timeout: Duration::from_secs(5),
            filter: FilterSettings::default(),
            log_capacity: 200,
            log_line_limit: 500,
        }
    }
}
