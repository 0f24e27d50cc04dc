//! Choosing the frames a goal is planned and driven in.
//!
//! Localization is assumed imperfect: the global frame (`map`) is accurate
//! but may be delayed or missing, the odometry frame (`odom`) is always
//! available but drifts.  The resolver therefore plans in the most accurate
//! frame it can reach and drives in the most stable one, falling back once
//! per frame when the preferred choice is unavailable.

use strider_perception::{PoseSource, RigidTransform, Stamp};
use strider_types::{FrameId, Goal, MotionError};
use tracing::{info, warn};

use crate::params::MotionParams;

/// Which configured frame a resolution settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChoice {
    Preferred,
    Alternate,
    /// The frame the goal was given in.
    GoalNative,
}

/// Planning and driving frames chosen for one goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSelection {
    pub planning_frame: FrameId,
    pub planning_choice: FrameChoice,
    pub driving_frame: FrameId,
    pub driving_choice: FrameChoice,
}

/// Everything the executor needs about a goal's geometry at acceptance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGoal {
    pub selection: FrameSelection,
    pub goal_in_planning: RigidTransform,
    pub goal_in_driving: RigidTransform,
    pub robot_in_driving: RigidTransform,
    /// Robot pose in the goal's own frame, for the planned-path telemetry.
    pub robot_in_goal_frame: RigidTransform,
    /// Robot pose in the planning frame, when it could be looked up.
    pub robot_in_planning: Option<RigidTransform>,
}

pub struct FrameResolver<'a> {
    poses: &'a dyn PoseSource,
    params: &'a MotionParams,
}

impl<'a> FrameResolver<'a> {
    pub fn new(poses: &'a dyn PoseSource, params: &'a MotionParams) -> Self {
        Self { poses, params }
    }

    fn base(&self) -> FrameId {
        FrameId::new(self.params.base_frame.as_str())
    }

    /// Express the goal in the planning frame.
    ///
    /// No preferred frame: plan in the goal's frame.  Preferred frame
    /// unreachable: try the alternate, and with no alternate configured plan
    /// in the goal's frame.  Fails only when the alternate is configured and
    /// also unreachable.
    pub fn resolve_planning_frame(
        &self,
        goal: &Goal,
    ) -> Result<(FrameId, FrameChoice, RigidTransform), MotionError> {
        let goal_frame = goal.frame().clone();
        let target = RigidTransform::from_pose(goal.target());
        let preferred = FrameId::new(self.params.preferred_planning_frame.as_str());

        if preferred.is_empty() {
            info!(frame = %goal_frame, "planning in goal frame");
            return Ok((goal_frame, FrameChoice::GoalNative, target));
        }
        match self.poses.transform_pose(&goal_frame, &preferred, target) {
            Ok(pose) => return Ok((preferred, FrameChoice::Preferred, pose)),
            Err(e) => warn!(error = %e, "preferred planning frame unavailable"),
        }

        let alternate = FrameId::new(self.params.alternate_planning_frame.as_str());
        if alternate.is_empty() {
            warn!(frame = %goal_frame, "no alternate planning frame, planning in goal frame");
            return Ok((goal_frame, FrameChoice::GoalNative, target));
        }
        warn!(frame = %alternate, "will attempt to plan in alternate frame");
        self.poses
            .transform_pose(&goal_frame, &alternate, target)
            .map(|pose| (alternate.clone(), FrameChoice::Alternate, pose))
            .map_err(|_| MotionError::TransformUnavailable {
                context: "No localization available for planning".into(),
                from: goal_frame.to_string(),
                to: alternate.to_string(),
            })
    }

    /// Pick the driving frame by locating the robot in it.
    ///
    /// Returns the frame and the robot's pose in it.
    pub fn resolve_driving_frame(
        &self,
    ) -> Result<(FrameId, FrameChoice, RigidTransform), MotionError> {
        let base = self.base();
        let preferred = FrameId::new(self.params.preferred_driving_frame.as_str());
        match self.poses.lookup(&preferred, &base, Stamp::Latest) {
            Ok(pose) => return Ok((preferred, FrameChoice::Preferred, pose)),
            Err(e) => warn!(error = %e, "preferred driving frame unavailable"),
        }

        let alternate = FrameId::new(self.params.alternate_driving_frame.as_str());
        warn!(frame = %alternate, "attempting to drive using alternate frame");
        self.poses
            .lookup(&alternate, &base, Stamp::Latest)
            .map(|pose| (alternate.clone(), FrameChoice::Alternate, pose))
            .map_err(|_| MotionError::TransformUnavailable {
                context: "Cannot determine robot pose in driving frame".into(),
                from: base.to_string(),
                to: alternate.to_string(),
            })
    }

    /// Run both resolutions and gather the goal and robot poses the
    /// executor needs.
    pub fn resolve(&self, goal: &Goal) -> Result<ResolvedGoal, MotionError> {
        let base = self.base();
        let goal_frame = goal.frame().clone();
        let (planning_frame, planning_choice, goal_in_planning) =
            self.resolve_planning_frame(goal)?;

        let robot_in_goal_frame = self
            .poses
            .lookup(&goal_frame, &base, Stamp::Latest)
            .map_err(|_| MotionError::TransformUnavailable {
                context: "Cannot determine robot pose in goal frame".into(),
                from: base.to_string(),
                to: goal_frame.to_string(),
            })?;

        let (driving_frame, driving_choice, robot_in_driving) = self.resolve_driving_frame()?;

        let goal_in_driving = self
            .poses
            .transform_pose(&goal_frame, &driving_frame, RigidTransform::from_pose(goal.target()))
            .map_err(|_| MotionError::TransformUnavailable {
                context: "Cannot determine goal pose in driving frame".into(),
                from: goal_frame.to_string(),
                to: driving_frame.to_string(),
            })?;

        let robot_in_planning = self
            .poses
            .lookup(&planning_frame, &base, Stamp::Latest)
            .ok();

        Ok(ResolvedGoal {
            selection: FrameSelection {
                planning_frame,
                planning_choice,
                driving_frame,
                driving_choice,
            },
            goal_in_planning,
            goal_in_driving,
            robot_in_driving,
            robot_in_goal_frame,
            robot_in_planning,
        })
    }
}
