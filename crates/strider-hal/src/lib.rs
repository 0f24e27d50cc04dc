//! `strider-hal` – hardware abstraction for the motion executor.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock] time sources (wall clock and
//!   simulated) and the fixed-rate [`Rate`][clock::Rate] sleeper.
//! - [`pid`] – per-tick PID controller used for lateral drift correction.
//! - [`drive`] – the [`CommandSink`][drive::CommandSink] seam velocity
//!   commands leave through.
//! - [`sim`] – kinematic simulated base and point-obstacle field so the full
//!   stack runs without hardware.

pub mod clock;
pub mod drive;
pub mod pid;
pub mod sim;

pub use clock::{Clock, Rate, SimClock, SystemClock};
pub use drive::{CommandSink, RecordingSink};
pub use pid::PidController;
pub use sim::{SimFrames, SimulatedBase, SimulatedObstacles};
