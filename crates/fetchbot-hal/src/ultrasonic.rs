//! HC-SR04 ultrasonic range sensor over the shared [`GpioBus`].
//!
//! The sensor fails open: an echo timeout is reported as `Ok(None)` and
//! [`RangeFinder::is_obstacle`] maps the unknown reading to "no obstacle",
//! so a dead sensor degrades to uninhibited driving rather than a wedged
//! robot. Only registry-level failures (a lost claim, a closed session)
//! surface as errors.

use std::sync::PoisonError;
use std::time::{Duration, Instant};

use fetchbot_types::{PinDirection, RobotError, SensorConfig};
use tracing::debug;

use crate::gpio::{PinClaim, SharedBus};

/// Speed of sound at room temperature, for echo-to-distance conversion.
const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;

/// Echo polling interval while waiting for an edge.
const POLL: Duration = Duration::from_micros(10);

/// Distance measurement seam consumed by the drive layer.
pub trait RangeFinder: Send {
    fn initialize(&mut self) -> Result<(), RobotError>;

    /// Measure once. `Ok(None)` means the reading is unknown (echo timeout);
    /// `Err` is reserved for real failures that the caller must propagate.
    fn read_distance_cm(&mut self) -> Result<Option<f64>, RobotError>;

    /// Whether an obstacle sits closer than `threshold_cm`. An unknown
    /// reading is treated as clear.
    fn is_obstacle(&mut self, threshold_cm: f64) -> Result<bool, RobotError> {
        Ok(self
            .read_distance_cm()?
            .map_or(false, |d| d < threshold_cm))
    }

    fn cleanup(&mut self) -> Result<(), RobotError>;
}

/// HC-SR04 driver: 10 µs trigger pulse, then echo high time gives distance.
pub struct UltrasonicSensor {
    bus: SharedBus,
    cfg: SensorConfig,
    trigger_pin: u8,
    echo_pin: u8,
    trigger_claim: Option<PinClaim>,
    echo_claim: Option<PinClaim>,
}

impl UltrasonicSensor {
    pub fn new(bus: SharedBus, cfg: SensorConfig, trigger_pin: u8, echo_pin: u8) -> Self {
        Self {
            bus,
            cfg,
            trigger_pin,
            echo_pin,
            trigger_claim: None,
            echo_claim: None,
        }
    }

    /// One full trigger/echo measurement. Holds the bus lock for the whole
    /// pulse so no other hardware call can interleave with the timing.
    fn measure(&mut self) -> Result<f64, RobotError> {
        let trigger = self
            .trigger_claim
            .as_ref()
            .ok_or(RobotError::NotInitialized("ultrasonic sensor"))?;
        let echo = self
            .echo_claim
            .as_ref()
            .ok_or(RobotError::NotInitialized("ultrasonic sensor"))?;
        let timeout = Duration::from_millis(self.cfg.echo_timeout_ms);

        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);

        bus.write(trigger, self.trigger_pin, 1)?;
        std::thread::sleep(Duration::from_micros(self.cfg.trigger_pulse_us));
        bus.write(trigger, self.trigger_pin, 0)?;

        // Wait for the echo line to rise.
        let deadline = Instant::now() + timeout;
        while bus.read(echo, self.echo_pin)? == 0 {
            if Instant::now() >= deadline {
                return Err(RobotError::SensorTimeout);
            }
            std::thread::sleep(POLL);
        }

        // Echo is high; its duration is the round-trip time.
        let pulse_start = Instant::now();
        let deadline = pulse_start + timeout;
        while bus.read(echo, self.echo_pin)? == 1 {
            if Instant::now() >= deadline {
                return Err(RobotError::SensorTimeout);
            }
            std::thread::sleep(POLL);
        }
        let pulse = pulse_start.elapsed();

        Ok(pulse.as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0)
    }
}

impl RangeFinder for UltrasonicSensor {
    fn initialize(&mut self) -> Result<(), RobotError> {
        if self.trigger_claim.is_some() {
            return Ok(());
        }
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        let trigger = bus.claim("ultrasonic", &[self.trigger_pin], PinDirection::Output)?;
        let echo = match bus.claim("ultrasonic", &[self.echo_pin], PinDirection::Input) {
            Ok(claim) => claim,
            Err(e) => {
                let mut trigger = trigger;
                bus.release(&mut trigger);
                return Err(e);
            }
        };
        // Idle the trigger line low before the first measurement.
        bus.write(&trigger, self.trigger_pin, 0)?;
        self.trigger_claim = Some(trigger);
        self.echo_claim = Some(echo);
        Ok(())
    }

    fn read_distance_cm(&mut self) -> Result<Option<f64>, RobotError> {
        match self.measure() {
            Ok(d) => Ok(Some(d)),
            Err(RobotError::SensorTimeout) => {
                debug!("echo timeout, distance unknown");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn cleanup(&mut self) -> Result<(), RobotError> {
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut claim) = self.trigger_claim.take() {
            bus.release(&mut claim);
        }
        if let Some(mut claim) = self.echo_claim.take() {
            bus.release(&mut claim);
        }
        Ok(())
    }
}
