//! What every control phase shares: collaborators, the preemption check and
//! the way a phase ends.

use std::sync::Arc;

use strider_hal::{Clock, CommandSink};
use strider_middleware::{EventBus, Topic};
use strider_perception::{ObstacleBoard, ObstacleSensor, PoseSource, RigidTransform, Stamp};
use strider_types::{EventPayload, FrameId, MotionError, VelocityCommand};

use crate::params::ParamStore;

/// Tick rate of the rotation and translation loops.
pub const CONTROL_RATE_HZ: f32 = 50.0;

/// How a phase that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Succeeded,
    Preempted,
}

/// Cooperative cancellation, polled once per tick.
pub trait PreemptSignal {
    fn is_preempt_requested(&self) -> bool;
}

impl<F: Fn() -> bool> PreemptSignal for F {
    fn is_preempt_requested(&self) -> bool {
        self()
    }
}

/// Collaborators a control phase runs against.
#[derive(Clone)]
pub struct MotionContext {
    pub clock: Arc<dyn Clock>,
    pub poses: Arc<dyn PoseSource>,
    pub obstacles: Arc<dyn ObstacleSensor>,
    /// Latest forward reading, refreshed by the idle loop.
    pub board: Arc<ObstacleBoard>,
    pub sink: Arc<dyn CommandSink>,
    pub params: Arc<ParamStore>,
    pub bus: EventBus,
}

impl MotionContext {
    /// Robot pose in `frame`, or the abort a failed lookup turns into.
    pub(crate) fn robot_pose(
        &self,
        frame: &FrameId,
        base: &FrameId,
        context: &str,
    ) -> Result<RigidTransform, MotionError> {
        self.poses
            .lookup(frame, base, Stamp::Latest)
            .map_err(|_| MotionError::TransformUnavailable {
                context: context.to_string(),
                from: base.to_string(),
                to: frame.to_string(),
            })
    }

    pub(crate) fn emit(&self, command: VelocityCommand) {
        self.sink.send(command);
    }

    /// Stop the robot and hand back `err`.
    pub(crate) fn abort<T>(&self, err: MotionError) -> Result<T, MotionError> {
        self.sink.send(VelocityCommand::stop());
        Err(err)
    }

    pub(crate) fn telemetry(&self, source: &str, payload: EventPayload) {
        self.bus.emit(Topic::Telemetry, source, payload);
    }
}
