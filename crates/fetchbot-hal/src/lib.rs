//! `fetchbot-hal` – hardware access layer.
//!
//! One GPIO bus session is shared by every hardware consumer in the
//! process. The registry in [`gpio`] owns the session and hands out typed
//! pin-claim tokens; the tokens are the only way any component touches the
//! bus, which makes the shutdown invariant (release every claim, then close
//! the handle, in that order) structural rather than conventional.
//!
//! # Modules
//!
//! - [`gpio`] – [`GpioBus`][gpio::GpioBus]: pin-claim registry over a
//!   [`GpioChip`][gpio::GpioChip] backend, plus the [`PinClaim`][gpio::PinClaim]
//!   token type.
//! - [`drive`] – [`DriveController`][drive::DriveController]: mecanum wheel
//!   primitives, driver-stage enable, obstacle override, ordered cleanup.
//! - [`ultrasonic`] – [`UltrasonicSensor`][ultrasonic::UltrasonicSensor]:
//!   HC-SR04 pulse measurement behind the [`RangeFinder`][ultrasonic::RangeFinder]
//!   seam.
//! - [`camera`] – [`FrameSource`][camera::FrameSource]: the frame-capture
//!   boundary trait.
//! - [`sim`] – recording stub backends so the full stack runs headless in
//!   tests and CI.

pub mod camera;
pub mod drive;
pub mod gpio;
pub mod sim;
pub mod ultrasonic;

pub use camera::FrameSource;
pub use drive::{DriveController, DriveOutcome};
pub use gpio::{GpioBus, GpioChip, PinClaim, SharedBus};
pub use sim::{SimChip, SimFrameSource};
pub use ultrasonic::{RangeFinder, UltrasonicSensor};
