//! Closed-loop heading control.
//!
//! Turns the robot in place by a relative angle.  Each tick re-reads the
//! heading, shapes the turning speed with [`rotation_speed`], and slows down
//! early when an obstacle limits how far the robot can swing.

use strider_hal::Rate;
use strider_types::{FrameId, MotionError, VelocityCommand, normalize_angle};
use tracing::{debug, info};

use crate::phase::{CONTROL_RATE_HZ, MotionContext, PhaseOutcome, PreemptSignal};
use crate::profile::rotation_speed;

const LOOKUP_FAILED: &str = "Cannot determine robot pose for rotation";

pub struct RotationController<'a> {
    ctx: &'a MotionContext,
    driving_frame: FrameId,
}

impl<'a> RotationController<'a> {
    pub fn new(ctx: &'a MotionContext, driving_frame: FrameId) -> Self {
        Self { ctx, driving_frame }
    }

    /// Rotate by `yaw_delta` radians relative to the current heading.
    ///
    /// Every tick emits exactly one command; the terminal tick emits a full
    /// stop.  A failed pose lookup aborts the phase.
    pub fn rotate(
        &self,
        yaw_delta: f32,
        preempt: &dyn PreemptSignal,
    ) -> Result<PhaseOutcome, MotionError> {
        let ctx = self.ctx;
        let base = FrameId::new(ctx.params.snapshot().base_frame.as_str());
        let start = match ctx.robot_pose(&self.driving_frame, &base, LOOKUP_FAILED) {
            Ok(pose) => pose,
            Err(e) => return ctx.abort(e),
        };
        let requested_yaw = normalize_angle(start.yaw() + yaw_delta);
        info!(
            frame = %self.driving_frame,
            requested_deg = requested_yaw.to_degrees(),
            "rotation requested"
        );

        let mut rate = Rate::new(ctx.clock.clone(), CONTROL_RATE_HZ);
        loop {
            rate.sleep();
            let p = ctx.params.snapshot();
            let base = FrameId::new(p.base_frame.as_str());

            let current_yaw = match ctx.robot_pose(&self.driving_frame, &base, LOOKUP_FAILED) {
                Ok(pose) => pose.yaw(),
                Err(e) => return ctx.abort(e),
            };
            let remaining = normalize_angle(requested_yaw - current_yaw);

            let obstacle = ctx.obstacles.obstacle_angle(remaining > 0.0);
            let limited = remaining.abs().min(obstacle.abs());
            let mut velocity = rotation_speed(limited, &p);
            let mut outcome = None;

            if preempt.is_preempt_requested() {
                info!("stopping rotation due to preempt");
                velocity = 0.0;
                outcome = Some(PhaseOutcome::Preempted);
            }
            if remaining.abs() < p.angular_tolerance {
                info!(error_deg = remaining.to_degrees(), "rotation done");
                velocity = 0.0;
                outcome = Some(PhaseOutcome::Succeeded);
            }
            if remaining < 0.0 {
                velocity = -velocity;
            }

            match outcome {
                Some(done) => {
                    ctx.emit(VelocityCommand::stop());
                    return Ok(done);
                }
                None => {
                    ctx.emit(VelocityCommand::new(velocity, 0.0));
                    debug!(
                        remaining_deg = remaining.to_degrees(),
                        angular = velocity,
                        "rotation tick"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Rig;
    use std::cell::Cell;
    use std::f32::consts::{FRAC_PI_2, PI};
    use std::time::Duration;
    use strider_hal::Clock;
    use strider_types::{Point2, Pose2D};

    fn never() -> bool {
        false
    }

    #[test]
    fn quarter_turn_converges_with_decreasing_speed() {
        let rig = Rig::new();
        let ctrl = RotationController::new(&rig.ctx, FrameId::new("odom"));

        let outcome = ctrl.rotate(FRAC_PI_2, &never).unwrap();
        assert_eq!(outcome, PhaseOutcome::Succeeded);

        let p = rig.ctx.params.snapshot();
        let yaw = rig.base.odom_pose().yaw;
        assert!((yaw - FRAC_PI_2).abs() < p.angular_tolerance);

        let commands = rig.commands();
        let (last, active) = commands.split_last().unwrap();
        assert_eq!(last.angular, 0.0);
        assert_eq!(last.linear, 0.0);
        assert!(active.len() > 10);

        let mut prev = f32::INFINITY;
        for c in active {
            assert!(c.angular > 0.0);
            assert!(c.angular <= p.max_turning_velocity);
            assert!(c.angular >= p.min_turning_velocity);
            assert!(c.angular < prev, "{} !< {}", c.angular, prev);
            assert_eq!(c.linear, 0.0);
            prev = c.angular;
        }
    }

    #[test]
    fn negative_delta_turns_clockwise() {
        let rig = Rig::new();
        let ctrl = RotationController::new(&rig.ctx, FrameId::new("odom"));
        ctrl.rotate(-1.0, &never).unwrap();
        assert!((rig.base.odom_pose().yaw + 1.0).abs() < 0.01);
        let commands = rig.commands();
        assert!(commands[..commands.len() - 1].iter().all(|c| c.angular < 0.0));
    }

    #[test]
    fn turning_through_pi_takes_short_way() {
        let rig = Rig::new();
        rig.base.teleport(Pose2D::new(0.0, 0.0, 3.0));
        let ctrl = RotationController::new(&rig.ctx, FrameId::new("odom"));
        // 3.0 + 0.5 wraps to about -2.78.
        ctrl.rotate(0.5, &never).unwrap();
        let yaw = rig.base.odom_pose().yaw;
        assert!((normalize_angle(yaw - (3.5 - 2.0 * PI))).abs() < 0.01);
        assert!(rig.commands().iter().all(|c| c.angular >= 0.0));
    }

    #[test]
    fn preempt_stops_within_one_tick() {
        let rig = Rig::new();
        let ctrl = RotationController::new(&rig.ctx, FrameId::new("odom"));
        let ticks = Cell::new(0);
        let preempt = || {
            ticks.set(ticks.get() + 1);
            ticks.get() >= 5
        };

        let outcome = ctrl.rotate(PI, &preempt).unwrap();
        assert_eq!(outcome, PhaseOutcome::Preempted);
        let commands = rig.commands();
        assert_eq!(commands.len(), 5);
        assert!(commands[4].is_stop());
        assert_eq!(rig.clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn lost_pose_aborts_with_stop() {
        let rig = Rig::new();
        rig.base.set_map_available(false);
        let ctrl = RotationController::new(&rig.ctx, FrameId::new("map"));
        let err = ctrl.rotate(1.0, &never).unwrap_err();
        assert!(matches!(err, MotionError::TransformUnavailable { .. }));
        assert!(rig.commands().last().unwrap().is_stop());
    }

    #[test]
    fn obstacle_in_swing_slows_rotation() {
        let free = Rig::new();
        RotationController::new(&free.ctx, FrameId::new("odom"))
            .rotate(FRAC_PI_2, &never)
            .unwrap();

        let blocked = Rig::new();
        // Just inside the turn radius, 10° to the left.
        let bearing = 10_f32.to_radians();
        blocked
            .field
            .add_point(Point2::new(0.3 * bearing.cos(), 0.3 * bearing.sin()));
        let ctrl = RotationController::new(&blocked.ctx, FrameId::new("odom"));
        let ticks = Cell::new(0);
        let preempt = || {
            ticks.set(ticks.get() + 1);
            ticks.get() > 3
        };
        ctrl.rotate(FRAC_PI_2, &preempt).unwrap();

        let first_free = free.commands()[0].angular;
        let first_blocked = blocked.commands()[0].angular;
        assert!(first_blocked < first_free);
        let p = blocked.ctx.params.snapshot();
        assert!((first_blocked - rotation_speed(bearing, &p)).abs() < 1e-4);
    }
}
