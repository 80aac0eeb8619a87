//! [`FrameSource`] – seam to whatever produces camera frames.
//!
//! A source may legitimately have no frame ready; that is `Ok(None)`, not an
//! error, and callers treat it as a detection miss for the cycle. `Err` is
//! reserved for real capture failures.

use fetchbot_types::{Frame, RobotError};

/// Produces frames for the tracking pipeline.
pub trait FrameSource: Send {
    /// Fetch the next frame, or `Ok(None)` when none is available yet.
    fn get_frame(&mut self) -> Result<Option<Frame>, RobotError>;
}

impl FrameSource for Box<dyn FrameSource> {
    fn get_frame(&mut self) -> Result<Option<Frame>, RobotError> {
        (**self).get_frame()
    }
}
