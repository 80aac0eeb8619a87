//! [`TargetTracker`] – per-frame target selection.
//!
//! Each frame, the tracker runs the detector, drops detections below the
//! confidence floor, picks the highest-confidence survivor and normalises
//! it into a [`TargetDescriptor`]. No state is carried between frames: a
//! frame with no usable detection simply yields the absent descriptor and
//! the miss accounting lives in the control loop.

use fetchbot_types::{Detection, Frame, RobotError, TargetDescriptor, VisionConfig};
use tracing::{debug, info, warn};

use crate::detector::Detector;

/// Selects and normalises the target from raw detections.
pub struct TargetTracker {
    detector: Box<dyn Detector>,
    cfg: VisionConfig,
    warmed: bool,
}

impl TargetTracker {
    pub fn new(detector: Box<dyn Detector>, cfg: VisionConfig) -> Self {
        Self {
            detector,
            cfg,
            warmed: false,
        }
    }

    /// Warm the detection model up. Idempotent.
    pub fn initialize(&mut self) -> Result<(), RobotError> {
        if self.warmed {
            return Ok(());
        }
        self.detector.warm_up()?;
        self.warmed = true;
        info!("target tracker initialised");
        Ok(())
    }

    /// Run detection on `frame` and describe the best target.
    ///
    /// A frame with no detection above the confidence floor yields the
    /// absent descriptor; that is a miss, not an error. Detector failures
    /// propagate for the caller to classify.
    pub fn track(&mut self, frame: &Frame) -> Result<TargetDescriptor, RobotError> {
        if !self.warmed {
            return Err(RobotError::NotInitialized("target tracker"));
        }
        let detections = self.detector.infer(frame)?;
        let best = detections
            .iter()
            .filter(|d| d.confidence >= self.cfg.confidence_floor)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        match best {
            Some(detection) => Ok(self.describe(frame, detection)),
            None => {
                debug!(raw = detections.len(), "no detection above confidence floor");
                Ok(TargetDescriptor::absent())
            }
        }
    }

    /// Drop any model state. Idempotent; future `track` calls are rejected
    /// until the tracker is initialised again.
    pub fn cleanup(&mut self) {
        if self.warmed {
            self.warmed = false;
            info!("target tracker cleaned up");
        }
    }

    fn describe(&self, frame: &Frame, detection: &Detection) -> TargetDescriptor {
        let half_width = frame.width as f32 / 2.0;
        let frame_area = frame.pixel_area();
        if half_width <= 0.0 || frame_area <= 0.0 {
            warn!(frame.width, frame.height, "degenerate frame geometry");
            return TargetDescriptor::absent();
        }
        let center_offset_x = (detection.bbox.center_x() - half_width
            + self.cfg.camera_offset_px)
            / half_width;
        TargetDescriptor {
            present: true,
            center_offset_x,
            area_ratio: detection.bbox.area() / frame_area,
            confidence: detection.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::NullDetector;
    use fetchbot_types::BoundingBox;

    struct ScriptedDetector {
        detections: Vec<Detection>,
        fail: bool,
    }

    impl Detector for ScriptedDetector {
        fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>, RobotError> {
            if self.fail {
                return Err(RobotError::Detection("model crashed".into()));
            }
            Ok(self.detections.clone())
        }
    }

    fn frame() -> Frame {
        Frame {
            width: 640,
            height: 480,
            data: Vec::new(),
        }
    }

    fn detection(x: f32, w: f32, h: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x, y: 100.0, w, h },
            confidence,
        }
    }

    fn tracker_with(detections: Vec<Detection>) -> TargetTracker {
        let mut tracker = TargetTracker::new(
            Box::new(ScriptedDetector {
                detections,
                fail: false,
            }),
            VisionConfig::default(),
        );
        tracker.initialize().unwrap();
        tracker
    }

    #[test]
    fn track_before_initialize_is_rejected() {
        let mut tracker = TargetTracker::new(Box::new(NullDetector), VisionConfig::default());
        assert_eq!(
            tracker.track(&frame()),
            Err(RobotError::NotInitialized("target tracker"))
        );
    }

    #[test]
    fn empty_frame_yields_absent_descriptor() {
        let mut tracker = tracker_with(Vec::new());
        let d = tracker.track(&frame()).unwrap();
        assert!(!d.present);
    }

    #[test]
    fn low_confidence_detections_are_discarded() {
        let mut tracker = tracker_with(vec![detection(300.0, 40.0, 40.0, 0.25)]);
        let d = tracker.track(&frame()).unwrap();
        assert!(!d.present);
    }

    #[test]
    fn highest_confidence_detection_wins() {
        let mut tracker = tracker_with(vec![
            detection(100.0, 40.0, 40.0, 0.5),
            detection(500.0, 40.0, 40.0, 0.9),
            detection(300.0, 40.0, 40.0, 0.7),
        ]);
        let d = tracker.track(&frame()).unwrap();
        assert!(d.present);
        assert_eq!(d.confidence, 0.9);
        // Winner's box centre is 520 px, right of the 320 px frame centre.
        assert!(d.center_offset_x > 0.0);
    }

    #[test]
    fn centered_box_has_zero_offset() {
        // Box 300..340 centres exactly on 320 in a 640-wide frame.
        let mut tracker = tracker_with(vec![detection(300.0, 40.0, 40.0, 0.8)]);
        let d = tracker.track(&frame()).unwrap();
        assert!(d.center_offset_x.abs() < 1e-6);
        let expected_area = (40.0 * 40.0) / (640.0 * 480.0);
        assert!((d.area_ratio - expected_area).abs() < 1e-6);
    }

    #[test]
    fn offset_is_normalised_by_half_width() {
        // Box centred on the left edge: offset -1.
        let mut tracker = tracker_with(vec![detection(-20.0, 40.0, 40.0, 0.8)]);
        let d = tracker.track(&frame()).unwrap();
        assert!((d.center_offset_x + 1.0).abs() < 1e-6);
    }

    #[test]
    fn camera_offset_shifts_the_measurement() {
        let cfg = VisionConfig {
            camera_offset_px: 32.0,
            ..VisionConfig::default()
        };
        let mut tracker = TargetTracker::new(
            Box::new(ScriptedDetector {
                detections: vec![detection(300.0, 40.0, 40.0, 0.8)],
                fail: false,
            }),
            cfg,
        );
        tracker.initialize().unwrap();
        let d = tracker.track(&frame()).unwrap();
        assert!((d.center_offset_x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn detector_failure_propagates() {
        let mut tracker = TargetTracker::new(
            Box::new(ScriptedDetector {
                detections: Vec::new(),
                fail: true,
            }),
            VisionConfig::default(),
        );
        tracker.initialize().unwrap();
        assert!(matches!(
            tracker.track(&frame()),
            Err(RobotError::Detection(_))
        ));
    }

    #[test]
    fn cleanup_gates_further_tracking() {
        let mut tracker = tracker_with(Vec::new());
        tracker.cleanup();
        assert!(tracker.track(&frame()).is_err());
        tracker.cleanup();
        tracker.initialize().unwrap();
        assert!(tracker.track(&frame()).is_ok());
    }
}
