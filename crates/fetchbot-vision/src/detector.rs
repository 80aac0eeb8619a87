//! [`Detector`] – boundary to the external detection model.
//!
//! The runtime makes no assumption about what runs behind this trait (an
//! accelerator, a remote service, a stub). It only relies on the contract:
//! zero or more [`Detection`]s per frame, or an error the tracker maps to a
//! miss.

use fetchbot_types::{Detection, Frame, RobotError};

/// Black-box object detector.
pub trait Detector: Send {
    /// One-time model preparation. Default is a no-op for backends that
    /// need none.
    fn warm_up(&mut self) -> Result<(), RobotError> {
        Ok(())
    }

    /// Run inference on one frame.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, RobotError>;
}

/// Detector that never sees anything. Used for hardware-only sim runs.
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>, RobotError> {
        Ok(Vec::new())
    }
}
