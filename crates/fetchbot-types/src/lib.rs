use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod config;

pub use config::{
    ControlConfig, DeciderConfig, MotionConfig, MotorPins, PinConfig, RobotConfig, SensorConfig,
    VisionConfig,
};

/// Axis-aligned detection box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Horizontal pixel coordinate of the box centre.
    pub fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }
}

/// One raw detection returned by the external model boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// A raw image frame handed from the camera boundary to the tracker.
///
/// Decoding internals are out of scope; the control runtime only ever
/// needs the dimensions and an opaque pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (e.g. RGB24 or greyscale).
    pub data: Vec<u8>,
}

impl Frame {
    pub fn pixel_area(&self) -> f32 {
        (self.width * self.height) as f32
    }
}

/// Normalised per-cycle description of the tracked object.
///
/// Produced fresh every control cycle, immutable once constructed and never
/// persisted. The neutral default (`Default`) means "nothing detected".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub present: bool,
    /// Signed horizontal offset from the frame centre, normalised by half
    /// the frame width. Positive means the target sits right of centre.
    pub center_offset_x: f32,
    /// Bounding-box area divided by frame area.
    pub area_ratio: f32,
    pub confidence: f32,
}

impl TargetDescriptor {
    /// The neutral "nothing detected this cycle" descriptor.
    pub fn absent() -> Self {
        Self::default()
    }
}

/// A single movement command, produced once per cycle by the decider and
/// consumed immediately by the drive controller. Speeds are PWM duty in
/// percent (0–100); out-of-range values are clamped by the drive layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "speed")]
pub enum MovementCommand {
    Forward(f32),
    Backward(f32),
    StrafeLeft(f32),
    StrafeRight(f32),
    RotateLeft(f32),
    RotateRight(f32),
    Stop,
}

impl MovementCommand {
    /// `true` for commands that move into the range sensor's field of view
    /// and therefore consult the obstacle override.
    pub fn is_forward_class(&self) -> bool {
        matches!(self, MovementCommand::Forward(_))
    }
}

/// Process-wide run state. Written only by the control loop, read by every
/// component to gate new work. Single forward path, no re-entry:
/// `Initializing → Running → ShuttingDown → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// Direction of a claimed GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    Output,
    Input,
}

/// Per-cycle telemetry snapshot published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: RunState,
    pub last_command: MovementCommand,
    /// Most recent range reading, `None` when the sensor timed out.
    pub last_distance_cm: Option<f64>,
    /// Consecutive cycles without a target detection.
    pub miss_count: u32,
    pub cycle: u64,
}

/// Unified event wrapper for the telemetry bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "fetchbot-runtime::control_loop"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the telemetry bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Status(StatusRecord),
    /// A forward-class command was downgraded to a stop by the range sensor.
    /// Expected operating behaviour, not a fault.
    ObstacleOverride { distance_cm: Option<f64> },
    Fault { component: String, message: String },
}

/// Global error type spanning the resource registry, sensors, vision and
/// the control loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RobotError {
    #[error("gpio handle is already open")]
    HandleAlreadyOpen,

    #[error("gpio handle is closed")]
    HandleClosed,

    #[error("pin {pin} is already claimed by '{owner}'")]
    PinConflict { pin: u8, owner: String },

    #[error("cannot close gpio handle: {outstanding} pin claim(s) outstanding")]
    ResourceBusy { outstanding: usize },

    #[error("ultrasonic pulse measurement timed out")]
    SensorTimeout,

    #[error("detection model failure: {0}")]
    Detection(String),

    #[error("camera failure: {0}")]
    Camera(String),

    #[error("claim lost for pin {pin}")]
    ClaimLost { pin: u8 },

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel error: {0}")]
    Channel(String),
}

impl RobotError {
    /// Fatal errors force the control loop into `ShuttingDown`; everything
    /// else is recoverable at the cycle boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RobotError::ClaimLost { .. } | RobotError::HandleClosed
        )
    }
}
