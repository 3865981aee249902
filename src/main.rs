//! Tint-cam binary: list cameras or stream tinted frames from one.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::info;

use tint_cam::logging::{self, LogSink};
use tint_cam::{
    AlwaysGranted, CameraService, Config, EnumerationPolicy, ErrorSource, Event, FilterSettings,
    LogBook, Notifier, SessionState, SinkRegistry, V4L2Provider,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// List cameras and exit
    #[arg(long)]
    list: bool,
    /// Camera index to open
    #[arg(long, default_value_t = 0)]
    device: i64,
    /// How long to capture, in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Write the last frame to this JPEG file on exit
    #[arg(long)]
    output: Option<PathBuf>,
    /// Requested capture width
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Requested capture height
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 70, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
    /// How the camera list is built
    #[arg(long, value_enum, default_value_t = Enumeration::Probe)]
    enumeration: Enumeration,
    /// Highest index probed
    #[arg(long, default_value_t = 5)]
    probe_max_index: u32,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Enumeration {
    Probe,
    AssumeRange,
    Discover,
}

impl From<Enumeration> for EnumerationPolicy {
    fn from(value: Enumeration) -> Self {
        match value {
            Enumeration::Probe => Self::Probe,
            Enumeration::AssumeRange => Self::AssumeRange,
            Enumeration::Discover => Self::Discover,
        }
    }
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            probe_max_index: self.probe_max_index,
            enumeration: self.enumeration.into(),
            width: self.width,
            height: self.height,
            filter: FilterSettings {
                jpeg_quality: self.quality,
                ..FilterSettings::default()
            },
            ..Config::default()
        }
    }
}

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let registry = SinkRegistry::new();
    logging::init(&cli.log_filter, &registry)?;

    let config = cli.config();
    let (notifier, events) = Notifier::channel();
    let logs = Arc::new(LogBook::from_config(&config, notifier.clone()));
    let _registration = registry.register(Arc::clone(&logs) as Arc<dyn LogSink>);

    let service = CameraService::spawn(
        V4L2Provider::new(config.clone()),
        AlwaysGranted,
        config,
        logs,
        notifier,
    )?;

    service.refresh_list();
    finish(&events)?;
    let ids = service.camera_ids();
    if cli.list {
        for id in &ids {
            println!("/dev/video{id}");
        }
        return Ok(());
    }

    service.open(cli.device);
    if let Some(message) = finish(&events)? {
        return Err(message.into());
    }

    let frames = stream(&events, Duration::from_secs(cli.seconds));
    info!(frames, "Capture finished");

    let latest = service.latest_frame();
    service.shutdown();

    if let Some(path) = cli.output {
        let published = latest.ok_or("no frame was captured")?;
        fs::write(&path, &published.frame.data)?;
        println!(
            "Wrote {}x{} frame (version {}) to {}",
            published.frame.width,
            published.frame.height,
            published.version,
            path.display()
        );
    }
    Ok(())
}

/// Wait for the pending command. Returns the first error it reported.
fn finish(events: &Receiver<Event>) -> Result<Option<String>, Box<dyn Error>> {
    let mut failure = None;
    loop {
        match events.recv_timeout(COMMAND_TIMEOUT)? {
            Event::OperationFinished => return Ok(failure),
            Event::Error {
                message,
                source: ErrorSource::Session,
            } => {
                failure.get_or_insert(message);
            }
            _ => {}
        }
    }
}

/// Count new frames until `duration` elapses or the session ends.
fn stream(events: &Receiver<Event>, duration: Duration) -> u64 {
    let deadline = Instant::now() + duration;
    let mut frames = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(Event::FrameChanged { .. }) => frames += 1,
            Ok(Event::StateChanged(SessionState::Idle)) => break,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    frames
}
