//! The control runtime: sense, decide, act.
//!
//! [`RobotController`] runs the cooperative control loop on the async
//! runtime, offloading blocking hardware calls through [`HwExecutor`] and
//! turning each frame into one [`MovementCommand`](fetchbot_types::MovementCommand)
//! via the pure [`decider`].
//!
//! # Modules
//!
//! - [`decider`]: pure target-descriptor to movement-command policy.
//! - [`executor`]: blocking-call offload with drain-before-close semantics.
//! - [`control_loop`]: the per-cycle pipeline, failsafe and shutdown path.

pub mod control_loop;
pub mod decider;
pub mod executor;

pub use control_loop::RobotController;
pub use decider::decide;
pub use executor::HwExecutor;
