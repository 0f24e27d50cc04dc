//! `strider-runtime` – goal lifecycle and the two service loops.
//!
//! # Modules
//!
//! - [`goal_slot`] – [`GoalSlot`]: the `Idle → Executing → Preempting`
//!   state machine with a one-element pending mailbox.
//! - [`executor`] – [`GoalExecutor`]: resolves frames, decomposes a goal and
//!   sequences the rotation and translation controllers, publishing every
//!   status transition on [`Topic::GoalStatus`][strider_middleware::Topic].
//! - [`obstacle_monitor`] – [`ObstacleMonitor`]: the 20 Hz idle loop that
//!   refreshes the shared obstacle board.
//! - [`server`] – [`MotionServer`]: owns the idle and execution threads.
//! - [`telemetry`] – [`init_tracing`]: `tracing-subscriber` setup with an
//!   optional OTLP exporter.

pub mod executor;
pub mod goal_slot;
pub mod obstacle_monitor;
pub mod server;
pub mod telemetry;

pub use executor::GoalExecutor;
pub use goal_slot::{Displaced, GoalSlot, SlotState};
pub use obstacle_monitor::{IDLE_RATE_HZ, ObstacleMonitor};
pub use server::{Canceller, MotionServer, ServerError};
pub use telemetry::{TelemetryConfig, TelemetryError, TracerProviderGuard, init_tracing};
