//! `strider-perception` – the robot's view of space.
//!
//! # Modules
//!
//! - [`transform`] – [`TfBuffer`][transform::TfBuffer]: timestamped graph of
//!   rigid transforms between named frames, plus the
//!   [`PoseSource`][transform::PoseSource] capability the controllers use to
//!   ask "where is frame B relative to frame A right now?".
//! - [`obstacle`] – the [`ObstacleSensor`][obstacle::ObstacleSensor] seam and
//!   the [`ObstacleBoard`][obstacle::ObstacleBoard] single-slot holder through
//!   which the 20 Hz idle loop hands readings to the 50 Hz controllers.

pub mod obstacle;
pub mod transform;

pub use obstacle::{ObstacleBoard, ObstacleSensor};
pub use transform::{LookupError, PoseSource, Quaternion, RigidTransform, Stamp, TfBuffer, Vec3};
