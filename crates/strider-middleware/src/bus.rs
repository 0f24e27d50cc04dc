//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  The control loops run on plain threads; they only ever
//! publish, which never blocks and never needs a runtime.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Commands`] | Every velocity command sent to the base (50 Hz while moving) |
//! | [`Topic::Telemetry`] | Planned path, obstacle distances (20 Hz), lateral-controller debug |
//! | [`Topic::GoalStatus`] | Goal accepted / succeeded / aborted / preempted / rejected |
//! | [`Topic::SystemAlerts`] | Parameter changes, localization fallbacks |

use std::sync::Arc;

use strider_hal::CommandSink;
use strider_types::{Event, EventPayload, VelocityCommand};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Commands,
    Telemetry,
    GoalStatus,
    SystemAlerts,
}

/// Receive-side failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("subscriber on {topic:?} fell behind and missed {skipped} events")]
    Lagged { topic: Topic, skipped: u64 },

    #[error("bus closed for {topic:?}")]
    Closed { topic: Topic },
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    commands: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
    goal_status: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (commands, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        let (goal_status, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            commands,
            telemetry,
            goal_status,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event;
    /// `0` when nobody is listening, which is a normal condition.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "event dropped, no subscribers");
                0
            }
        }
    }

    /// Wrap `payload` in an [`Event`] from `source` and publish it.
    pub fn emit(&self, topic: Topic, source: &str, payload: EventPayload) -> usize {
        self.publish_to(topic, Event::new(source, payload))
    }

    /// Subscribe to a specific [`Topic`] channel.
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Commands => &self.commands,
            Topic::Telemetry => &self.telemetry,
            Topic::GoalStatus => &self.goal_status,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].  Usable from async code
/// ([`recv`][Self::recv]) and from plain threads
/// ([`try_recv`][Self::try_recv], [`blocking_recv`][Self::blocking_recv]).
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    pub async fn recv(&mut self) -> Result<Event, BusError> {
        let topic = self.topic;
        self.receiver.recv().await.map_err(|e| recv_error(topic, e))
    }

    /// Block the current thread until the next event arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Result<Event, BusError> {
        let topic = self.topic;
        self.receiver.blocking_recv().map_err(|e| recv_error(topic, e))
    }

    /// Next buffered event, if any.  `Ok(None)` when the channel is empty.
    pub fn try_recv(&mut self) -> Result<Option<Event>, BusError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(topic = ?self.topic, skipped, "TopicReceiver lagged");
                Err(BusError::Lagged {
                    topic: self.topic,
                    skipped,
                })
            }
            Err(broadcast::error::TryRecvError::Closed) => {
                Err(BusError::Closed { topic: self.topic })
            }
        }
    }

    /// Everything currently buffered, skipping over any lag gap.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(event)) => events.push(event),
                Ok(None) | Err(BusError::Closed { .. }) => return events,
                Err(BusError::Lagged { .. }) => continue,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

fn recv_error(topic: Topic, err: broadcast::error::RecvError) -> BusError {
    match err {
        broadcast::error::RecvError::Lagged(skipped) => {
            warn!(?topic, skipped, "TopicReceiver lagged");
            BusError::Lagged { topic, skipped }
        }
        broadcast::error::RecvError::Closed => BusError::Closed { topic },
    }
}

// ---------------------------------------------------------------------------
// Command mirror
// ---------------------------------------------------------------------------

/// [`CommandSink`] that forwards to an inner sink and mirrors each command on
/// [`Topic::Commands`].
pub struct BusCommandSink {
    inner: Arc<dyn CommandSink>,
    bus: EventBus,
}

impl BusCommandSink {
    pub fn new(inner: Arc<dyn CommandSink>, bus: EventBus) -> Self {
        Self { inner, bus }
    }
}

impl CommandSink for BusCommandSink {
    fn send(&self, command: VelocityCommand) {
        self.inner.send(command);
        self.bus.emit(
            Topic::Commands,
            "strider-middleware::cmd_vel",
            EventPayload::Command(command),
        );
    }
}
