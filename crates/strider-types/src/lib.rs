//! `strider-types` – shared data model for the Strider motion executor.
//!
//! Everything that crosses a crate boundary lives here: planar poses, frame
//! identifiers, goals, velocity commands, obstacle snapshots, goal status and
//! the event envelope carried by the bus, plus the [`MotionError`] taxonomy.

use std::f32::consts::{PI, TAU};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Angles
// ────────────────────────────────────────────────────────────────────────────

/// Wrap `angle` (radians) into the half-open interval `(−π, π]`.
///
/// Values already inside the interval are returned untouched, which makes the
/// function idempotent.  Non-finite input is passed through unchanged.
pub fn normalize_angle(angle: f32) -> f32 {
    if (angle > -PI && angle <= PI) || !angle.is_finite() {
        return angle;
    }
    let mut wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= TAU;
    }
    if wrapped <= -PI {
        wrapped += TAU;
    }
    wrapped
}

// ────────────────────────────────────────────────────────────────────────────
// Poses and frames
// ────────────────────────────────────────────────────────────────────────────

/// Planar pose: position in metres and heading in radians.
///
/// `yaw` is always kept in `(−π, π]` when built through [`Pose2D::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

impl Pose2D {
    pub fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self {
            x,
            y,
            yaw: normalize_angle(yaw),
        }
    }

    /// The pose at the frame origin facing +X.
    pub fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Euclidean distance between the positions of two poses.
    pub fn distance_to(&self, other: &Pose2D) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A planar point, used for obstacle extremes and path telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Name of a coordinate frame (e.g. `"map"`, `"odom"`, `"base_footprint"`).
///
/// A single leading `/` is stripped so `"/map"` and `"map"` name the same
/// frame.  The empty id means "not configured".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameId(String);

impl FrameId {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.strip_prefix('/') {
            Some(stripped) => Self(stripped.to_string()),
            None => Self(name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Goals
// ────────────────────────────────────────────────────────────────────────────

/// Unique identifier issued to every accepted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target pose expressed in a named frame.
///
/// Fields are private: a `Goal` can only be obtained through [`Goal::new`],
/// which rejects non-finite coordinates, so every goal that reaches the
/// executor is well formed and immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    id: GoalId,
    target: Pose2D,
    frame: FrameId,
}

impl Goal {
    /// Validate and accept a goal.
    ///
    /// # Errors
    ///
    /// [`MotionError::InvalidGoal`] when the orientation or position is NaN or
    /// infinite.
    pub fn new(target: Pose2D, frame: impl Into<FrameId>) -> Result<Self, MotionError> {
        if !target.yaw.is_finite() {
            return Err(MotionError::InvalidGoal(
                "an invalid orientation was specified".to_string(),
            ));
        }
        if !target.x.is_finite() || !target.y.is_finite() {
            return Err(MotionError::InvalidGoal(
                "an invalid position was specified".to_string(),
            ));
        }
        Ok(Self {
            id: GoalId::new(),
            target,
            frame: frame.into(),
        })
    }

    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn target(&self) -> Pose2D {
        self.target
    }

    pub fn frame(&self) -> &FrameId {
        &self.frame
    }
}

/// Lifecycle state reported for a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum GoalStatus {
    /// Accepted and executing.
    Active,
    Succeeded,
    /// Terminated by a failure; carries the human-readable reason.
    Aborted(String),
    /// Cancelled by a newer goal or an operator stop request.
    Preempted,
    /// Refused before execution started.
    Rejected(String),
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Active)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Commands and sensing
// ────────────────────────────────────────────────────────────────────────────

/// Differential-drive velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Yaw rate, rad/s, counter-clockwise positive.
    pub angular: f32,
    /// Forward speed, m/s, negative when reversing.
    pub linear: f32,
}

impl VelocityCommand {
    pub fn new(angular: f32, linear: f32) -> Self {
        Self { angular, linear }
    }

    pub fn stop() -> Self {
        Self::default()
    }

    pub fn is_stop(&self) -> bool {
        self.angular == 0.0 && self.linear == 0.0
    }
}

/// Reduced obstacle reading relative to the robot body.
///
/// Distances are in metres; `f32::INFINITY` means nothing was seen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSnapshot {
    /// Free distance along the direction of travel.
    pub forward_dist: f32,
    pub left_dist: f32,
    pub right_dist: f32,
    /// Nearest obstacle point ahead-left, in the base frame.
    pub forward_left: Point2,
    /// Nearest obstacle point ahead-right, in the base frame.
    pub forward_right: Point2,
}

impl ObstacleSnapshot {
    /// A reading with no obstacle in any direction.
    pub fn clear() -> Self {
        Self {
            forward_dist: f32::INFINITY,
            left_dist: f32::INFINITY,
            right_dist: f32::INFINITY,
            forward_left: Point2::default(),
            forward_right: Point2::default(),
        }
    }
}

impl Default for ObstacleSnapshot {
    fn default() -> Self {
        Self::clear()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Emitting component, e.g. `"strider-control::translation"`.
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current UTC time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A velocity command that was sent to the base.
    Command(VelocityCommand),
    /// Two-point straight-line plan published when a goal is accepted.
    PlannedPath {
        frame: FrameId,
        goal: Point2,
        robot: Point2,
    },
    /// Obstacle distances refreshed by the idle loop.
    ObstacleDistance { forward: f32, left: f32, right: f32 },
    /// Lateral controller internals, for PID tuning.
    LateralDebug {
        remaining_x: f32,
        lateral_error: f32,
        rotation: f32,
    },
    GoalStatus { goal_id: GoalId, status: GoalStatus },
    ParameterChange { name: String, value: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Everything that can end a goal early.  The `Display` text is the abort
/// reason reported to the goal's owner.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionError {
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    #[error("{context}: no transform from '{from}' to '{to}'")]
    TransformUnavailable {
        context: String,
        from: String,
        to: String,
    },

    #[error("Obstacle at {distance:.2} m did not clear within {waited_secs:.1} s")]
    ObstaclePersistent { distance: f32, waited_secs: f32 },

    #[error("No progress towards goal for longer than {timeout_secs:.1} s")]
    NoProgress { timeout_secs: f32 },
}
