//! `strider-middleware` – telemetry transport.
//!
//! Carries commands, telemetry and goal-status transitions from the control
//! loops to whoever is listening, without the loops knowing who that is.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] built on Tokio
//!   broadcast channels, plus [`BusCommandSink`], which mirrors every velocity
//!   command onto the bus.

pub mod bus;

pub use bus::{BusCommandSink, BusError, EventBus, Topic, TopicReceiver};
