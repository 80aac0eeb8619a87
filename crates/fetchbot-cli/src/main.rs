//! `fetchbot` – entry point for the fetch robot runtime.
//!
//! The binary is the top-level owner of the GPIO handle: it opens the bus
//! before any subsystem starts and closes it after every subsystem has
//! cleaned up, so the close is always the last hardware call of the
//! process. Ctrl-C raises the shared shutdown flag and the control loop
//! winds down at the next cycle boundary.
//!
//! Runs against the simulated chip and camera backends; a real chip plugs
//! in behind the [`GpioChip`](fetchbot_hal::GpioChip) seam.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use fetchbot_hal::{DriveController, GpioBus, SimChip, SimFrameSource, UltrasonicSensor};
use fetchbot_middleware::EventBus;
use fetchbot_runtime::RobotController;
use fetchbot_types::EventPayload;
use fetchbot_vision::{NullDetector, TargetTracker};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let path = config_path(std::env::args().skip(1));
    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(1);
        }
    };

    // Shared shutdown flag, raised by Ctrl-C and polled at cycle boundaries.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("ctrl-c received, requesting shutdown");
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "could not install ctrl-c handler");
        }
    }

    // Open the one GPIO session. Everything below borrows it via claims.
    let bus = match GpioBus::open(Box::new(SimChip::new())) {
        Ok(bus) => bus.into_shared(),
        Err(e) => {
            error!(error = %e, "failed to open gpio session");
            return ExitCode::from(1);
        }
    };

    let range = UltrasonicSensor::new(
        Arc::clone(&bus),
        cfg.sensor.clone(),
        cfg.pins.trigger,
        cfg.pins.echo,
    );
    let drive = DriveController::new(Arc::clone(&bus), &cfg, Box::new(range));
    let tracker = TargetTracker::new(Box::new(NullDetector), cfg.vision.clone());
    let camera = SimFrameSource::new(cfg.vision.frame_width, cfg.vision.frame_height);
    let events = EventBus::default();

    // Log the telemetry stream; the bus itself stays headless.
    let mut listener = events.listen();
    tokio::spawn(async move {
        while let Some(event) = listener.recv().await {
            match &event.payload {
                EventPayload::Status(record) => {
                    info!(
                        cycle = record.cycle,
                        command = ?record.last_command,
                        distance_cm = ?record.last_distance_cm,
                        misses = record.miss_count,
                        "status"
                    );
                }
                EventPayload::ObstacleOverride { distance_cm } => {
                    warn!(?distance_cm, "forward motion overridden by obstacle");
                }
                EventPayload::Fault { component, message } => {
                    warn!(component = %component, message = %message, "fault reported");
                }
            }
        }
    });

    let mut controller = RobotController::new(
        drive,
        tracker,
        Box::new(camera),
        cfg,
        events,
        Arc::clone(&shutdown),
    );

    let code = match controller.initialize().await {
        Ok(()) => {
            info!("fetchbot running, ctrl-c to stop");
            controller.run().await;
            controller.cleanup().await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "initialisation failed");
            // initialize() already tore down whatever came up.
            ExitCode::from(1)
        }
    };

    // Last hardware call of the process: close the handle.
    let closed = bus
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .close();
    match closed {
        Ok(()) => info!("gpio session closed, exiting"),
        Err(e) => {
            error!(error = %e, "failed to close gpio session");
            return ExitCode::from(1);
        }
    }
    code
}

/// Config file path from `--config <path>` or a bare positional path,
/// falling back to `fetchbot.toml` in the working directory.
fn config_path(mut args: impl Iterator<Item = String>) -> PathBuf {
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if !arg.starts_with('-') {
            return PathBuf::from(arg);
        }
    }
    PathBuf::from(config::DEFAULT_PATH)
}

/// Structured logging via RUST_LOG (default "info"). Set
/// FETCHBOT_LOG_FORMAT=json for newline-delimited JSON suitable for log
/// aggregators.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("FETCHBOT_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn config_path_prefers_the_flag() {
        assert_eq!(
            config_path(args(&["--config", "/etc/robot.toml"])),
            PathBuf::from("/etc/robot.toml")
        );
    }

    #[test]
    fn config_path_accepts_a_bare_path() {
        assert_eq!(
            config_path(args(&["robot.toml"])),
            PathBuf::from("robot.toml")
        );
    }

    #[test]
    fn config_path_defaults_without_args() {
        assert_eq!(
            config_path(args(&[])),
            PathBuf::from(config::DEFAULT_PATH)
        );
    }
}
