//! Closed-loop straight-line travel.
//!
//! Drives towards a goal fixed in the driving frame.  Speed follows
//! [`linear_speed`] over the free distance (the nearer of goal and obstacle),
//! a PID on the lateral offset steers back onto the line, and two watchdogs
//! end the phase early: an obstacle that will not clear, and a distance to
//! goal that keeps growing.

use std::time::Duration;

use strider_hal::{PidController, Rate};
use strider_perception::RigidTransform;
use strider_types::{EventPayload, FrameId, MotionError, VelocityCommand};
use tracing::{debug, info, warn};

use crate::phase::{CONTROL_RATE_HZ, MotionContext, PhaseOutcome, PreemptSignal};
use crate::profile::linear_speed;

const LOOKUP_FAILED: &str = "Cannot determine robot pose for linear";
const SOURCE: &str = "strider-control::translation";

pub struct TranslationController<'a> {
    ctx: &'a MotionContext,
    driving_frame: FrameId,
}

/// Obstacle pause bookkeeping.
#[derive(Debug, Default)]
struct ObstaclePause {
    since: Option<Duration>,
}

/// Progress watchdog: tracks the best distance seen and when the robot last
/// was not moving away from it.
#[derive(Debug)]
struct Progress {
    best: f32,
    last_progress: Duration,
}

impl<'a> TranslationController<'a> {
    pub fn new(ctx: &'a MotionContext, driving_frame: FrameId) -> Self {
        Self { ctx, driving_frame }
    }

    /// Drive to `goal_in_driving` (position only; heading is ignored).
    ///
    /// Travel direction is fixed at entry from where the goal lies relative
    /// to the robot.  Every tick emits exactly one command; the terminal
    /// tick emits a full stop.
    pub fn drive(
        &self,
        goal_in_driving: RigidTransform,
        preempt: &dyn PreemptSignal,
    ) -> Result<PhaseOutcome, MotionError> {
        let ctx = self.ctx;
        let p = ctx.params.snapshot();
        let base = FrameId::new(p.base_frame.as_str());

        let robot = match ctx.robot_pose(&self.driving_frame, &base, LOOKUP_FAILED) {
            Ok(pose) => pose,
            Err(e) => return ctx.abort(e),
        };
        let remaining = (robot.inverse() * goal_in_driving).translation;
        let forward = remaining.x > 0.0;
        info!(
            frame = %self.driving_frame,
            distance = remaining.planar_norm(),
            forward,
            "linear move requested"
        );

        let mut lateral = PidController::new(p.lateral_kp, p.lateral_ki, p.lateral_kd);
        let mut pause = ObstaclePause::default();
        let mut progress = Progress {
            best: remaining.planar_norm(),
            last_progress: ctx.clock.now(),
        };
        let mut rate = Rate::new(ctx.clock.clone(), CONTROL_RATE_HZ);

        loop {
            rate.sleep();
            let p = ctx.params.snapshot();
            let base = FrameId::new(p.base_frame.as_str());
            let now = ctx.clock.now();

            let robot = match ctx.robot_pose(&self.driving_frame, &base, LOOKUP_FAILED) {
                Ok(pose) => pose,
                Err(e) => {
                    warn!(error = %e, "lost robot pose during linear move");
                    return ctx.abort(e);
                }
            };
            let remaining = (robot.inverse() * goal_in_driving).translation;
            let distance_remaining = remaining.planar_norm();

            // Lateral correction.
            lateral.set_gains(p.lateral_kp, p.lateral_ki, p.lateral_kd);
            lateral.set_output_limits(-p.max_lateral_velocity, p.max_lateral_velocity);
            let lateral_error = p.side_recover_weight * remaining.y;
            let rotation = lateral.update(lateral_error);
            ctx.telemetry(
                SOURCE,
                EventPayload::LateralDebug {
                    remaining_x: remaining.x,
                    lateral_error,
                    rotation,
                },
            );

            // Obstacles along the direction of travel.
            let obstacle_dist = if forward {
                ctx.board.latest().forward_dist
            } else {
                ctx.obstacles
                    .obstacle_distance(false, p.min_side_dist)
                    .forward_dist
            };

            let free = obstacle_dist.abs().min(distance_remaining.abs());
            let mut velocity = linear_speed(free, &p);
            let mut outcome = None;

            if obstacle_dist < p.forward_obstacle_threshold {
                velocity = 0.0;
                match pause.since {
                    None => {
                        info!(distance = obstacle_dist, "pausing for obstacle");
                        pause.since = Some(now);
                    }
                    Some(since) => {
                        let waited = now.saturating_sub(since);
                        debug!(distance = obstacle_dist, waited_secs = waited.as_secs_f32(), "still waiting for obstacle");
                        if waited > p.obstacle_wait_threshold() {
                            return ctx.abort(MotionError::ObstaclePersistent {
                                distance: obstacle_dist,
                                waited_secs: waited.as_secs_f32(),
                            });
                        }
                    }
                }
            } else if pause.since.take().is_some() {
                info!("resuming after obstacle has gone");
            }

            if preempt.is_preempt_requested() {
                info!("stopping move due to preempt");
                velocity = 0.0;
                outcome = Some(PhaseOutcome::Preempted);
            }

            if distance_remaining > progress.best {
                if now.saturating_sub(progress.last_progress) > p.abort_timeout() {
                    return ctx.abort(MotionError::NoProgress {
                        timeout_secs: p.abort_timeout,
                    });
                }
            } else {
                progress.best = distance_remaining;
                progress.last_progress = now;
            }

            if velocity.abs() < p.velocity_threshold && distance_remaining < p.linear_tolerance {
                info!(x = remaining.x, y = remaining.y, "linear move done");
                outcome = Some(PhaseOutcome::Succeeded);
            }

            if let Some(done) = outcome {
                ctx.emit(VelocityCommand::stop());
                return Ok(done);
            }

            let velocity = if forward { velocity } else { -velocity };
            ctx.emit(VelocityCommand::new(rotation, velocity));
            debug!(distance_remaining, linear = velocity, angular = rotation, "linear tick");
        }
    }
}
