//! [`RobotController`] – the cooperative sense/decide/act loop.
//!
//! Each cycle acquires a frame, tracks the target, decides one movement
//! command and executes it, with every blocking hardware step offloaded
//! through the [`HwExecutor`]. A miss counter forces a stop after too many
//! consecutive cycles without a target, so a robot that loses sight of its
//! target does not keep driving on a stale command.
//!
//! Shutdown is hierarchical and runs exactly once: the executor drains,
//! the drive layer stops and releases its claims (sensor claims included),
//! the tracker drops its model state, and only then may the process owner
//! close the GPIO handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fetchbot_hal::{DriveController, DriveOutcome, FrameSource};
use fetchbot_middleware::EventBus;
use fetchbot_types::{
    Event, EventPayload, MovementCommand, RobotConfig, RobotError, RunState, StatusRecord,
    TargetDescriptor,
};
use fetchbot_vision::TargetTracker;
use tracing::{debug, error, info, warn};

use crate::decider::decide;
use crate::executor::HwExecutor;

const SOURCE: &str = "fetchbot-runtime::control_loop";

/// Owns the control loop state and the handles to every subsystem.
pub struct RobotController {
    drive: Arc<Mutex<DriveController>>,
    tracker: Arc<Mutex<TargetTracker>>,
    camera: Arc<Mutex<Box<dyn FrameSource>>>,
    cfg: RobotConfig,
    bus: EventBus,
    executor: HwExecutor,
    shutdown: Arc<AtomicBool>,
    state: RunState,
    misses: u32,
    cycle: u64,
    last_command: MovementCommand,
}

impl RobotController {
    pub fn new(
        drive: DriveController,
        tracker: TargetTracker,
        camera: Box<dyn FrameSource>,
        cfg: RobotConfig,
        bus: EventBus,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            drive: Arc::new(Mutex::new(drive)),
            tracker: Arc::new(Mutex::new(tracker)),
            camera: Arc::new(Mutex::new(camera)),
            cfg,
            bus,
            executor: HwExecutor::new(),
            shutdown,
            state: RunState::Initializing,
            misses: 0,
            cycle: 0,
            last_command: MovementCommand::Stop,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Bring up the drive layer and the tracker. Any failure tears down
    /// whatever came up before the error is returned.
    pub async fn initialize(&mut self) -> Result<(), RobotError> {
        let drive = Arc::clone(&self.drive);
        let up = self
            .executor
            .run(move || {
                let mut drive = drive.lock().unwrap_or_else(PoisonError::into_inner);
                drive.initialize()?;
                drive.verify_driver()
            })
            .await;
        if let Err(e) = up {
            error!(error = %e, "drive initialisation failed");
            self.cleanup().await;
            return Err(e);
        }
        {
            let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = tracker.initialize() {
                error!(error = %e, "tracker initialisation failed");
                drop(tracker);
                self.cleanup().await;
                return Err(e);
            }
        }
        // Probe the camera once; a source with no frame yet is fine, a
        // broken one is not.
        let camera = Arc::clone(&self.camera);
        let probe = self
            .executor
            .run(move || {
                camera
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_frame()
            })
            .await;
        if let Err(e) = probe {
            error!(error = %e, "camera probe failed");
            self.cleanup().await;
            return Err(e);
        }
        self.state = RunState::Running;
        info!("controller initialised, entering run state");
        Ok(())
    }

    /// Run cycles until the shutdown flag is raised or a fatal error hits.
    /// The caller still runs [`cleanup`](Self::cleanup) afterwards.
    pub async fn run(&mut self) {
        while self.state == RunState::Running {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, leaving the run loop");
                self.state = RunState::ShuttingDown;
                break;
            }
            if let Err(e) = self.cycle().await {
                if e.is_fatal() {
                    error!(error = %e, "fatal cycle error, shutting down");
                    self.state = RunState::ShuttingDown;
                    break;
                }
                warn!(error = %e, "recoverable cycle error, stopping motors");
                self.bus.publish(Event::new(
                    SOURCE,
                    EventPayload::Fault {
                        component: "control_loop".into(),
                        message: e.to_string(),
                    },
                ));
                if let Err(e) = self.execute(MovementCommand::Stop).await {
                    warn!(error = %e, "safety stop failed");
                }
            }
            let pause = self.cfg.control.cycle_pause_ms;
            if pause > 0 {
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
        }
    }

    /// One sense/decide/act cycle.
    async fn cycle(&mut self) -> Result<(), RobotError> {
        self.cycle += 1;

        let camera = Arc::clone(&self.camera);
        let frame = self
            .executor
            .run(move || {
                camera
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_frame()
            })
            .await?;

        let target = match frame {
            Some(frame) => {
                let tracker = Arc::clone(&self.tracker);
                let tracked = self
                    .executor
                    .run(move || {
                        tracker
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .track(&frame)
                    })
                    .await;
                match tracked {
                    Ok(target) => target,
                    // A model hiccup is a miss for this cycle, not a fault.
                    Err(RobotError::Detection(msg)) => {
                        warn!(%msg, "detector failed, counting a miss");
                        TargetDescriptor::absent()
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                debug!("no frame available this cycle");
                TargetDescriptor::absent()
            }
        };

        let mut command = decide(&self.cfg.decider, &target);
        if target.present {
            self.misses = 0;
        } else {
            self.misses += 1;
            if self.misses > self.cfg.control.miss_threshold {
                warn!(misses = self.misses, "miss threshold exceeded, forcing stop");
                command = MovementCommand::Stop;
            }
        }

        let (outcome, distance) = self.execute(command).await?;
        self.last_command = command;
        if let DriveOutcome::Overridden { distance_cm } = outcome {
            self.bus.publish(Event::new(
                SOURCE,
                EventPayload::ObstacleOverride { distance_cm },
            ));
        }

        self.bus.publish(Event::new(
            SOURCE,
            EventPayload::Status(StatusRecord {
                state: self.state,
                last_command: self.last_command,
                last_distance_cm: distance,
                miss_count: self.misses,
                cycle: self.cycle,
            }),
        ));
        Ok(())
    }

    async fn execute(
        &self,
        command: MovementCommand,
    ) -> Result<(DriveOutcome, Option<f64>), RobotError> {
        let drive = Arc::clone(&self.drive);
        self.executor
            .run(move || {
                let mut drive = drive.lock().unwrap_or_else(PoisonError::into_inner);
                let outcome = drive.execute(command)?;
                Ok((outcome, drive.last_distance_cm()))
            })
            .await
    }

    /// Tear everything down, once. Drains the executor first so no hardware
    /// call is in flight, then stops and releases the drive layer and drops
    /// the tracker state. The GPIO handle itself stays open for its owner
    /// to close.
    pub async fn cleanup(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }
        self.state = RunState::ShuttingDown;
        info!("controller cleanup started");

        self.executor.drain().await;

        // The executor refuses work while draining, so the final drive
        // teardown goes straight to the blocking pool.
        let drive = Arc::clone(&self.drive);
        let teardown = tokio::task::spawn_blocking(move || {
            drive
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cleanup()
        })
        .await;
        match teardown {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "drive cleanup reported an error"),
            Err(e) => warn!(error = %e, "drive cleanup task failed"),
        }

        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cleanup();

        self.state = RunState::Stopped;
        info!("controller stopped");
    }
}
