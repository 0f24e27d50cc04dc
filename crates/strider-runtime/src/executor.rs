//! Runs one goal end to end: frame resolution, decomposition and the
//! rotate – translate – rotate sequence.

use std::time::Duration;

use strider_control::{
    CONTROL_RATE_HZ, FinalHeading, FrameResolver, MotionContext, PhaseOutcome, PreemptSignal,
    ResolvedGoal, RotationController, TranslationController, decompose,
};
use strider_hal::Rate;
use strider_middleware::Topic;
use strider_perception::RigidTransform;
use strider_types::{EventPayload, Goal, GoalId, GoalStatus, MotionError, Point2, VelocityCommand};
use tracing::{info, warn};

const SOURCE: &str = "strider-runtime::executor";

pub struct GoalExecutor {
    ctx: MotionContext,
}

impl GoalExecutor {
    pub fn new(ctx: MotionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &MotionContext {
        &self.ctx
    }

    /// Drive `goal` to completion and publish its terminal status.
    pub fn execute(&self, goal: &Goal, preempt: &dyn PreemptSignal) -> GoalStatus {
        info!(
            goal = %goal.id(),
            frame = %goal.frame(),
            x = goal.target().x,
            y = goal.target().y,
            yaw = goal.target().yaw,
            "executing goal"
        );
        self.publish_status(goal.id(), GoalStatus::Active);

        let status = match self.run(goal, preempt) {
            Ok(PhaseOutcome::Succeeded) => {
                info!(goal = %goal.id(), "goal succeeded");
                GoalStatus::Succeeded
            }
            Ok(PhaseOutcome::Preempted) => {
                info!(goal = %goal.id(), "goal preempted");
                GoalStatus::Preempted
            }
            Err(e) => {
                warn!(goal = %goal.id(), reason = %e, "goal aborted");
                GoalStatus::Aborted(e.to_string())
            }
        };
        self.publish_status(goal.id(), status.clone());
        status
    }

    pub fn publish_status(&self, goal_id: GoalId, status: GoalStatus) {
        self.ctx.bus.emit(
            Topic::GoalStatus,
            SOURCE,
            EventPayload::GoalStatus { goal_id, status },
        );
    }

    fn run(&self, goal: &Goal, preempt: &dyn PreemptSignal) -> Result<PhaseOutcome, MotionError> {
        let p = self.ctx.params.snapshot();
        // Phases stop the robot themselves when they abort.
        let resolved = match FrameResolver::new(self.ctx.poses.as_ref(), &p).resolve(goal) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.ctx.sink.send(VelocityCommand::stop());
                return Err(e);
            }
        };
        self.publish_planned_path(goal, &resolved);

        let heading = match resolved.robot_in_planning {
            Some(robot) => FinalHeading {
                goal_yaw: resolved.goal_in_planning.yaw(),
                robot_yaw: robot.yaw(),
            },
            None => FinalHeading {
                goal_yaw: resolved.goal_in_driving.yaw(),
                robot_yaw: resolved.robot_in_driving.yaw(),
            },
        };
        let maneuver = decompose(
            resolved.goal_in_driving,
            resolved.robot_in_driving,
            heading,
            &p,
        );
        let driving = resolved.selection.driving_frame.clone();
        info!(
            planning = %resolved.selection.planning_frame,
            driving = %driving,
            initial_deg = maneuver.initial_yaw_delta.to_degrees(),
            distance = maneuver.signed_distance,
            final_deg = maneuver.final_yaw_delta.to_degrees(),
            reverse = maneuver.reverse_without_turning,
            "goal decomposed"
        );

        let rotation = RotationController::new(&self.ctx, driving.clone());
        if maneuver.translates() {
            if maneuver.rotates_initially()
                && rotation.rotate(maneuver.initial_yaw_delta, preempt)? == PhaseOutcome::Preempted
            {
                return Ok(PhaseOutcome::Preempted);
            }
            if self.settle(p.localization_latency(), preempt) == PhaseOutcome::Preempted {
                return Ok(PhaseOutcome::Preempted);
            }
            let translation = TranslationController::new(&self.ctx, driving);
            if translation.drive(resolved.goal_in_driving, preempt)? == PhaseOutcome::Preempted {
                return Ok(PhaseOutcome::Preempted);
            }
            if self.settle(p.localization_latency(), preempt) == PhaseOutcome::Preempted {
                return Ok(PhaseOutcome::Preempted);
            }
        }
        if maneuver.rotates_finally() {
            return rotation.rotate(maneuver.final_yaw_delta, preempt);
        }
        Ok(PhaseOutcome::Succeeded)
    }

    /// Hold still for `duration` so localization catches up, watching for
    /// preemption at the control rate.
    fn settle(&self, duration: Duration, preempt: &dyn PreemptSignal) -> PhaseOutcome {
        let end = self.ctx.clock.now().saturating_add(duration);
        let mut rate = Rate::new(self.ctx.clock.clone(), CONTROL_RATE_HZ);
        while self.ctx.clock.now() < end {
            if preempt.is_preempt_requested() {
                return PhaseOutcome::Preempted;
            }
            rate.sleep();
        }
        PhaseOutcome::Succeeded
    }

    fn publish_planned_path(&self, goal: &Goal, resolved: &ResolvedGoal) {
        let point = |tf: &RigidTransform| Point2::new(tf.translation.x, tf.translation.y);
        self.ctx.bus.emit(
            Topic::Telemetry,
            SOURCE,
            EventPayload::PlannedPath {
                frame: goal.frame().clone(),
                goal: Point2::new(goal.target().x, goal.target().y),
                robot: point(&resolved.robot_in_goal_frame),
            },
        );
    }
}
