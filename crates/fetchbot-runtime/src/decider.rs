//! Pure movement policy: one [`TargetDescriptor`] in, one
//! [`MovementCommand`] out.
//!
//! The hierarchy is fixed: no target stops the robot, an overshot target
//! backs off, a reached target stops, an off-centre target rotates toward
//! the target, and otherwise the robot closes in at a speed that shrinks
//! as the target grows. The decider touches no hardware and keeps no
//! state, so the whole policy is testable as a plain function.

use fetchbot_types::{DeciderConfig, MovementCommand, TargetDescriptor};

/// Decide this cycle's movement. Checks run in priority order; the first
/// matching rule wins.
pub fn decide(cfg: &DeciderConfig, target: &TargetDescriptor) -> MovementCommand {
    if !target.present {
        return MovementCommand::Stop;
    }
    if target.area_ratio >= cfg.overshoot_ceiling {
        return MovementCommand::Backward(cfg.reverse_speed);
    }
    if target.area_ratio >= cfg.target_area_high {
        return MovementCommand::Stop;
    }
    let offset = target.center_offset_x;
    if offset.abs() > cfg.center_deadzone {
        let speed = (cfg.rotate_max * offset.abs()).clamp(cfg.rotate_min, cfg.rotate_max);
        return if offset > 0.0 {
            MovementCommand::RotateRight(speed)
        } else {
            MovementCommand::RotateLeft(speed)
        };
    }
    // Centred and not yet reached: close in, slower as the target grows.
    let closeness = ((cfg.target_area_high - target.area_ratio) / cfg.target_area_high)
        .clamp(0.0, 1.0);
    let speed = cfg.forward_min + (cfg.forward_max - cfg.forward_min) * closeness;
    MovementCommand::Forward(speed)
}
