//! Centralised robot configuration, loadable from TOML.
//!
//! Every section has serde defaults so a partial config file works; a
//! missing file means built-in defaults throughout. Defaults match the
//! reference chassis: four TB6612FNG-driven mecanum wheels plus an HC-SR04
//! range sensor.

use serde::{Deserialize, Serialize};

/// Direction pins (in1/in2) plus the PWM pin for one wheel motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    pub in1: u8,
    pub in2: u8,
    pub pwm: u8,
}

/// GPIO pin map for the whole chassis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub front_left: MotorPins,
    pub front_right: MotorPins,
    pub rear_left: MotorPins,
    pub rear_right: MotorPins,
    /// TB6612FNG standby pin; high enables the driver stage.
    pub standby: u8,
    /// HC-SR04 trigger pin (output).
    pub trigger: u8,
    /// HC-SR04 echo pin (input).
    pub echo: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            front_left: MotorPins {
                in1: 21,
                in2: 26,
                pwm: 13,
            },
            front_right: MotorPins {
                in1: 16,
                in2: 20,
                pwm: 12,
            },
            rear_left: MotorPins {
                in1: 3,
                in2: 4,
                pwm: 6,
            },
            rear_right: MotorPins {
                in1: 22,
                in2: 27,
                pwm: 5,
            },
            standby: 17,
            trigger: 2,
            echo: 15,
        }
    }
}

impl PinConfig {
    /// The four wheels in pattern order: FL, FR, RL, RR.
    pub fn wheels(&self) -> [MotorPins; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        ]
    }

    /// Every output pin the drive controller claims (motor pins + standby).
    pub fn drive_outputs(&self) -> Vec<u8> {
        let mut pins = Vec::with_capacity(13);
        for wheel in self.wheels() {
            pins.extend_from_slice(&[wheel.in1, wheel.in2, wheel.pwm]);
        }
        pins.push(self.standby);
        pins
    }
}

/// Motor driver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Motor PWM carrier frequency. 20 kHz keeps the TB6612 inaudible.
    pub pwm_freq_hz: u32,
    /// Upper bound of the safe duty band; requested speeds are clamped
    /// into `[0, max_duty_pct]`, never rejected.
    pub max_duty_pct: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pwm_freq_hz: 20_000,
            max_duty_pct: 90.0,
        }
    }
}

/// Ultrasonic range sensor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Readings below this distance count as an obstacle.
    pub obstacle_threshold_cm: f64,
    /// Per-phase echo timeout; expiry yields an "unknown" reading.
    pub echo_timeout_ms: u64,
    pub trigger_pulse_us: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: 15.0,
            echo_timeout_ms: 100,
            trigger_pulse_us: 10,
        }
    }
}

/// Target tracker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Detections below this confidence are discarded.
    pub confidence_floor: f32,
    /// Horizontal correction for an off-centre camera mount, in pixels,
    /// applied before normalisation.
    pub camera_offset_px: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.4,
            camera_offset_px: 0.0,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

/// Movement decision thresholds and speed bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeciderConfig {
    /// Area ratio at which the target counts as reached.
    pub target_area_high: f32,
    /// Area ratio beyond which a short backward correction is issued.
    pub overshoot_ceiling: f32,
    /// Normalised offset tolerance inside which the target counts as
    /// centred.
    pub center_deadzone: f32,
    pub forward_min: f32,
    pub forward_max: f32,
    pub rotate_min: f32,
    pub rotate_max: f32,
    pub reverse_speed: f32,
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            target_area_high: 0.3,
            overshoot_ceiling: 0.45,
            center_deadzone: 0.1,
            forward_min: 40.0,
            forward_max: 85.0,
            rotate_min: 30.0,
            rotate_max: 60.0,
            reverse_speed: 45.0,
        }
    }
}

/// Control loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Consecutive misses after which the failsafe forces `Stop`.
    pub miss_threshold: u32,
    /// Pause between cycles; zero disables the pause.
    pub cycle_pause_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            miss_threshold: 10,
            cycle_pause_ms: 100,
        }
    }
}

/// Top-level configuration bundle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub pins: PinConfig,
    pub motion: MotionConfig,
    pub sensor: SensorConfig,
    pub vision: VisionConfig,
    pub decider: DeciderConfig,
    pub control: ControlConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_outputs_cover_all_motor_pins_and_standby() {
        let pins = PinConfig::default();
        let outputs = pins.drive_outputs();
        assert_eq!(outputs.len(), 13);
        assert!(outputs.contains(&pins.standby));
        for wheel in pins.wheels() {
            assert!(outputs.contains(&wheel.in1));
            assert!(outputs.contains(&wheel.in2));
            assert!(outputs.contains(&wheel.pwm));
        }
        // Sensor pins are claimed separately, never by the drive layer.
        assert!(!outputs.contains(&pins.trigger));
        assert!(!outputs.contains(&pins.echo));
    }

    #[test]
    fn default_pins_do_not_overlap() {
        let pins = PinConfig::default();
        let mut all = pins.drive_outputs();
        all.push(pins.trigger);
        all.push(pins.echo);
        let mut dedup = all.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(all.len(), dedup.len());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: RobotConfig = serde_json::from_str(
            r#"{ "control": { "miss_threshold": 3 }, "sensor": { "obstacle_threshold_cm": 20.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.control.miss_threshold, 3);
        assert_eq!(cfg.control.cycle_pause_ms, ControlConfig::default().cycle_pause_ms);
        assert_eq!(cfg.sensor.obstacle_threshold_cm, 20.0);
        assert_eq!(cfg.pins, PinConfig::default());
        assert_eq!(cfg.decider, DeciderConfig::default());
    }
}
