//! [`DriveController`] – mecanum drive over the shared [`GpioBus`].
//!
//! Owns the thirteen motor-driver output pins (four wheels plus standby)
//! through a single [`PinClaim`] and translates [`MovementCommand`]s into
//! per-wheel direction and PWM writes. Forward motion consults the range
//! finder first and is overridden with a stop when an obstacle sits inside
//! the configured threshold; every other motion class drives unchecked.
//!
//! The controller never closes the bus. [`DriveController::cleanup`] stops
//! the motors, disables the driver stage, releases the sensor's claims and
//! then its own, leaving the handle for the top-level owner to close.

use std::sync::PoisonError;

use fetchbot_types::{
    MotionConfig, MotorPins, MovementCommand, PinConfig, PinDirection, RobotConfig, RobotError,
};
use tracing::{debug, info, warn};

use crate::gpio::{PinClaim, SharedBus};
use crate::ultrasonic::RangeFinder;

/// Per-wheel direction signs in FL, FR, RL, RR order. Signs follow the
/// installed motor orientation: the right column is mirrored.
type WheelPattern = [i8; 4];

const FORWARD: WheelPattern = [-1, 1, 1, -1];
const BACKWARD: WheelPattern = [1, -1, -1, 1];
const ROTATE_LEFT: WheelPattern = [1, 1, 1, 1];
const ROTATE_RIGHT: WheelPattern = [-1, -1, -1, -1];
const STRAFE_LEFT: WheelPattern = [1, 1, -1, -1];
const STRAFE_RIGHT: WheelPattern = [-1, -1, 1, 1];

/// What happened to a motion request.
#[derive(Debug, Clone, PartialEq)]
pub enum DriveOutcome {
    /// The command reached the motors.
    Applied,
    /// Forward motion was replaced by a stop because of a near obstacle.
    Overridden { distance_cm: Option<f64> },
}

/// Motor driver frontend. Holds the drive pin claim and the range finder
/// used for the forward obstacle check.
pub struct DriveController {
    bus: SharedBus,
    pins: PinConfig,
    motion: MotionConfig,
    obstacle_threshold_cm: f64,
    range: Box<dyn RangeFinder>,
    claim: Option<PinClaim>,
    driver_enabled: bool,
    moving: bool,
    left_scale: f32,
    right_scale: f32,
    last_distance_cm: Option<f64>,
}

impl DriveController {
    pub fn new(bus: SharedBus, cfg: &RobotConfig, range: Box<dyn RangeFinder>) -> Self {
        Self {
            bus,
            pins: cfg.pins.clone(),
            motion: cfg.motion.clone(),
            obstacle_threshold_cm: cfg.sensor.obstacle_threshold_cm,
            range,
            claim: None,
            driver_enabled: false,
            moving: false,
            left_scale: 1.0,
            right_scale: 1.0,
            last_distance_cm: None,
        }
    }

    /// Claim the drive pins, enable the driver stage and bring up the range
    /// finder. Idempotent; unwinds the claim on any failure.
    pub fn initialize(&mut self) -> Result<(), RobotError> {
        if self.claim.is_some() {
            return Ok(());
        }
        let outputs = self.pins.drive_outputs();
        let claim = {
            let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
            bus.claim("drive", &outputs, PinDirection::Output)?
        };
        self.claim = Some(claim);

        if let Err(e) = self.enable_driver() {
            self.release_claim();
            return Err(e);
        }
        if let Err(e) = self.range.initialize() {
            let _ = self.disable_driver();
            self.release_claim();
            return Err(e);
        }
        info!("drive controller initialised");
        Ok(())
    }

    /// Drive forward unless the range finder reports a near obstacle, in
    /// which case the motors are stopped instead.
    pub fn forward(&mut self, speed: f32) -> Result<DriveOutcome, RobotError> {
        let distance = self.range.read_distance_cm()?;
        self.last_distance_cm = distance;
        if distance.map_or(false, |d| d < self.obstacle_threshold_cm) {
            warn!(?distance, "obstacle ahead, overriding forward with stop");
            self.stop()?;
            return Ok(DriveOutcome::Overridden {
                distance_cm: distance,
            });
        }
        self.apply_pattern(FORWARD, speed)?;
        Ok(DriveOutcome::Applied)
    }

    pub fn backward(&mut self, speed: f32) -> Result<(), RobotError> {
        self.apply_pattern(BACKWARD, speed)
    }

    pub fn strafe_left(&mut self, speed: f32) -> Result<(), RobotError> {
        self.apply_pattern(STRAFE_LEFT, speed)
    }

    pub fn strafe_right(&mut self, speed: f32) -> Result<(), RobotError> {
        self.apply_pattern(STRAFE_RIGHT, speed)
    }

    pub fn rotate_left(&mut self, speed: f32) -> Result<(), RobotError> {
        self.apply_pattern(ROTATE_LEFT, speed)
    }

    pub fn rotate_right(&mut self, speed: f32) -> Result<(), RobotError> {
        self.apply_pattern(ROTATE_RIGHT, speed)
    }

    /// Zero every wheel and disable the driver stage. Safe to call before
    /// initialisation.
    pub fn stop(&mut self) -> Result<(), RobotError> {
        if self.claim.is_none() {
            return Ok(());
        }
        let wheels = self.pins.wheels();
        for wheel in wheels {
            self.set_motor(wheel, 0, 0.0)?;
        }
        self.moving = false;
        self.disable_driver()
    }

    /// Run one [`MovementCommand`] through the motors.
    pub fn execute(&mut self, command: MovementCommand) -> Result<DriveOutcome, RobotError> {
        match command {
            MovementCommand::Forward(speed) => self.forward(speed),
            MovementCommand::Backward(speed) => self.backward(speed).map(|()| DriveOutcome::Applied),
            MovementCommand::StrafeLeft(speed) => {
                self.strafe_left(speed).map(|()| DriveOutcome::Applied)
            }
            MovementCommand::StrafeRight(speed) => {
                self.strafe_right(speed).map(|()| DriveOutcome::Applied)
            }
            MovementCommand::RotateLeft(speed) => {
                self.rotate_left(speed).map(|()| DriveOutcome::Applied)
            }
            MovementCommand::RotateRight(speed) => {
                self.rotate_right(speed).map(|()| DriveOutcome::Applied)
            }
            MovementCommand::Stop => self.stop().map(|()| DriveOutcome::Applied),
        }
    }

    /// Per-side duty scaling for drift correction, clamped to `[0, 1]`.
    pub fn set_balance(&mut self, left: f32, right: f32) {
        self.left_scale = left.clamp(0.0, 1.0);
        self.right_scale = right.clamp(0.0, 1.0);
        debug!(left = self.left_scale, right = self.right_scale, "balance updated");
    }

    /// Read back the standby and motor pin levels and log them, as a
    /// post-initialisation sanity check of the driver wiring.
    pub fn verify_driver(&mut self) -> Result<(), RobotError> {
        let claim = self
            .claim
            .as_ref()
            .ok_or(RobotError::NotInitialized("drive controller"))?;
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        let standby = bus.read(claim, self.pins.standby)?;
        for wheel in self.pins.wheels() {
            let in1 = bus.read(claim, wheel.in1)?;
            let in2 = bus.read(claim, wheel.in2)?;
            debug!(in1_pin = wheel.in1, in1, in2_pin = wheel.in2, in2, "motor pins");
        }
        info!(standby, "driver stage verified");
        Ok(())
    }

    /// Stop the motors, disable the driver, release the sensor claims and
    /// the drive claim, in that order. Continues past individual failures
    /// and returns the first error. Never closes the bus.
    pub fn cleanup(&mut self) -> Result<(), RobotError> {
        let mut first_err: Option<RobotError> = None;

        if let Err(e) = self.stop() {
            warn!(error = %e, "stop failed during cleanup");
            // A failed stop may leave the driver enabled; force it off.
            if let Err(e2) = self.disable_driver() {
                warn!(error = %e2, "driver disable failed during cleanup");
            }
            first_err = Some(e);
        }
        if let Err(e) = self.range.cleanup() {
            warn!(error = %e, "sensor cleanup failed");
            first_err.get_or_insert(e);
        }
        self.release_claim();
        self.last_distance_cm = None;
        info!("drive controller cleaned up");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn last_distance_cm(&self) -> Option<f64> {
        self.last_distance_cm
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn driver_enabled(&self) -> bool {
        self.driver_enabled
    }

    // ─────────────────────────── internals ───────────────────────────

    fn enable_driver(&mut self) -> Result<(), RobotError> {
        let claim = self
            .claim
            .as_ref()
            .ok_or(RobotError::NotInitialized("drive controller"))?;
        self.bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(claim, self.pins.standby, 1)?;
        self.driver_enabled = true;
        Ok(())
    }

    fn disable_driver(&mut self) -> Result<(), RobotError> {
        let claim = self
            .claim
            .as_ref()
            .ok_or(RobotError::NotInitialized("drive controller"))?;
        self.bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(claim, self.pins.standby, 0)?;
        self.driver_enabled = false;
        Ok(())
    }

    fn release_claim(&mut self) {
        if let Some(mut claim) = self.claim.take() {
            self.bus
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release(&mut claim);
        }
    }

    /// Set direction and duty for one wheel. A zero direction floats both
    /// inputs low (coast).
    fn set_motor(&mut self, wheel: MotorPins, direction: i8, duty_pct: f32) -> Result<(), RobotError> {
        let claim = self
            .claim
            .as_ref()
            .ok_or(RobotError::NotInitialized("drive controller"))?;
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        bus.write(claim, wheel.in1, u8::from(direction > 0))?;
        bus.write(claim, wheel.in2, u8::from(direction < 0))?;
        bus.pwm(claim, wheel.pwm, self.motion.pwm_freq_hz, duty_pct)
    }

    fn apply_pattern(&mut self, pattern: WheelPattern, speed: f32) -> Result<(), RobotError> {
        if self.claim.is_none() {
            return Err(RobotError::NotInitialized("drive controller"));
        }
        let duty = speed.clamp(0.0, self.motion.max_duty_pct);
        if !self.driver_enabled {
            self.enable_driver()?;
        }
        let wheels = self.pins.wheels();
        for (i, wheel) in wheels.into_iter().enumerate() {
            // Even indices are the left column (FL, RL).
            let scale = if i % 2 == 0 {
                self.left_scale
            } else {
                self.right_scale
            };
            self.set_motor(wheel, pattern[i], duty * scale)?;
        }
        self.moving = true;
        Ok(())
    }
}
