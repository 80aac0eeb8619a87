//! Target acquisition for the control runtime.
//!
//! The detection model is an external boundary hidden behind the
//! [`Detector`] trait; [`TargetTracker`] turns raw detections into the
//! normalised [`TargetDescriptor`](fetchbot_types::TargetDescriptor) the
//! movement decider consumes.
//!
//! # Modules
//!
//! - [`detector`]: the black-box model seam and a null backend for sim runs.
//! - [`tracker`]: per-frame target selection and normalisation.

pub mod detector;
pub mod tracker;

pub use detector::{Detector, NullDetector};
pub use tracker::TargetTracker;
