//! `strider-control` – the closed-loop core of the motion executor.
//!
//! A goal is resolved into planning and driving frames ([`frames`]),
//! decomposed into rotate – translate – rotate ([`planner`]), and driven by
//! the [`rotation`] and [`translation`] controllers.  Both controllers tick
//! at 50 Hz, read one [`params`] snapshot per tick and shape their speed with
//! the [`profile`] functions.

pub mod frames;
pub mod params;
pub mod phase;
pub mod planner;
pub mod profile;
pub mod rotation;
pub mod translation;

#[cfg(test)]
mod testkit;

pub use frames::{FrameChoice, FrameResolver, FrameSelection, ResolvedGoal};
pub use params::{MotionParams, ParamError, ParamStore};
pub use phase::{CONTROL_RATE_HZ, MotionContext, PhaseOutcome, PreemptSignal};
pub use planner::{FinalHeading, Maneuver, decompose};
pub use rotation::RotationController;
pub use translation::TranslationController;
