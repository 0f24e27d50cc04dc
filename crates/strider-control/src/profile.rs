//! Velocity profiles.
//!
//! Both profiles take the smallest of a proportional term, a hard ceiling and
//! the speed from which the robot can still stop within the remaining
//! distance at the configured acceleration (`sqrt(2·a·d)`).  The limits are
//! combined with `min`/`max` chains rather than `clamp`, so inverted limits
//! from an unvalidated configuration never panic.

use crate::params::MotionParams;

/// Turning speed magnitude (rad/s) for `remaining` radians left.
///
/// Floored at `min_turning_velocity` so the robot never stalls just short of
/// the target heading.
pub fn rotation_speed(remaining: f32, p: &MotionParams) -> f32 {
    let remaining = remaining.abs();
    let braking = (2.0 * p.angular_acceleration * remaining).sqrt();
    p.min_turning_velocity
        .max((p.rotational_gain * remaining).min(p.max_turning_velocity.min(braking)))
}

/// Linear speed magnitude (m/s) for `distance` metres of free travel left.
pub fn linear_speed(distance: f32, p: &MotionParams) -> f32 {
    let distance = distance.abs();
    let braking = (2.0 * p.linear_acceleration * distance).sqrt();
    (p.linear_gain * distance).min(p.max_linear_velocity.min(braking))
}
