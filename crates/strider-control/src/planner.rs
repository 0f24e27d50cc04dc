//! Goal decomposition into rotate – translate – rotate.

use std::f32::consts::PI;

use strider_perception::RigidTransform;
use strider_types::normalize_angle;

use crate::params::MotionParams;

/// Headings used for the final orientation correction, both in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalHeading {
    pub goal_yaw: f32,
    pub robot_yaw: f32,
}

/// The three stages of a point-to-point move, fixed at goal start.
///
/// A zero yaw delta or distance means the stage is skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maneuver {
    pub initial_yaw_delta: f32,
    /// Negative when the robot backs up to the goal.
    pub signed_distance: f32,
    pub final_yaw_delta: f32,
    pub reverse_without_turning: bool,
}

impl Maneuver {
    pub fn rotates_initially(&self) -> bool {
        self.initial_yaw_delta != 0.0
    }

    pub fn translates(&self) -> bool {
        self.signed_distance != 0.0
    }

    pub fn rotates_finally(&self) -> bool {
        self.final_yaw_delta != 0.0
    }
}

/// Decompose a goal given the goal and robot poses in the driving frame.
///
/// Goals within `linear_tolerance` only get a heading correction.  Short
/// goals behind the robot are reached by backing up instead of turning
/// around.
pub fn decompose(
    goal_in_driving: RigidTransform,
    robot_in_driving: RigidTransform,
    heading: FinalHeading,
    p: &MotionParams,
) -> Maneuver {
    let goal_in_base = robot_in_driving.inverse() * goal_in_driving;
    let rx = goal_in_base.translation.x;
    let ry = goal_in_base.translation.y;
    let distance = rx.hypot(ry);
    let reverse_without_turning = distance < p.reverse_without_turning_threshold && rx < 0.0;

    let above = |angle: f32| if angle.abs() > p.angular_tolerance { angle } else { 0.0 };

    if distance <= p.linear_tolerance {
        return Maneuver {
            initial_yaw_delta: 0.0,
            signed_distance: 0.0,
            final_yaw_delta: above(normalize_angle(heading.goal_yaw - heading.robot_yaw)),
            reverse_without_turning,
        };
    }

    let mut requested_yaw = ry.atan2(rx);
    if reverse_without_turning {
        requested_yaw -= requested_yaw.signum() * PI;
    }

    Maneuver {
        initial_yaw_delta: above(requested_yaw),
        signed_distance: if reverse_without_turning { -distance } else { distance },
        final_yaw_delta: above(normalize_angle(
            heading.goal_yaw - (heading.robot_yaw + requested_yaw),
        )),
        reverse_without_turning,
    }
}
