//! The motion server: an idle thread refreshing obstacle readings and an
//! execution thread draining the [`GoalSlot`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strider_control::{MotionContext, ParamStore};
//! use strider_hal::{SimulatedBase, SimulatedObstacles, SystemClock};
//! use strider_middleware::EventBus;
//! use strider_perception::ObstacleBoard;
//! use strider_runtime::MotionServer;
//! use strider_types::Pose2D;
//!
//! let clock = Arc::new(SystemClock::new());
//! let base = Arc::new(SimulatedBase::new(clock.clone()));
//! let ctx = MotionContext {
//!     clock,
//!     poses: base.clone(),
//!     obstacles: Arc::new(SimulatedObstacles::new(base.clone())),
//!     board: Arc::new(ObstacleBoard::new()),
//!     sink: base,
//!     params: Arc::new(ParamStore::default()),
//!     bus: EventBus::default(),
//! };
//! let server = MotionServer::start(ctx).unwrap();
//! server.submit_pose(Pose2D::new(1.0, 0.0, 0.0), "odom").unwrap();
//! server.wait_idle(Duration::from_secs(30));
//! server.shutdown();
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use strider_control::{MotionContext, ParamError};
use strider_middleware::Topic;
use strider_types::{EventPayload, FrameId, Goal, GoalId, GoalStatus, MotionError, Pose2D};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::executor::GoalExecutor;
use crate::goal_slot::{Displaced, GoalSlot, SlotState};
use crate::obstacle_monitor::ObstacleMonitor;

const SOURCE: &str = "strider-runtime::server";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

pub struct MotionServer {
    ctx: MotionContext,
    slot: Arc<GoalSlot>,
    executor: Arc<GoalExecutor>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl MotionServer {
    /// Take a first obstacle reading, then spawn the idle and execution
    /// threads.
    pub fn start(ctx: MotionContext) -> Result<Self, ServerError> {
        let slot = Arc::new(GoalSlot::new());
        let executor = Arc::new(GoalExecutor::new(ctx.clone()));
        let stop = Arc::new(AtomicBool::new(false));
        let monitor = ObstacleMonitor::new(
            ctx.obstacles.clone(),
            ctx.board.clone(),
            ctx.params.clone(),
            ctx.bus.clone(),
        );
        monitor.tick();

        let mut server = Self {
            ctx: ctx.clone(),
            slot: slot.clone(),
            executor: executor.clone(),
            stop: stop.clone(),
            threads: Vec::new(),
        };

        let clock = ctx.clock.clone();
        let idle_stop = stop.clone();
        server.spawn("strider-idle", move || monitor.run(clock, &idle_stop))?;
        server.spawn("strider-exec", move || {
            while let Some(goal) = slot.wait_next() {
                executor.execute(&goal, slot.as_ref());
                slot.finish();
            }
            info!("execution loop stopped");
        })?;

        info!("motion server started");
        Ok(server)
    }

    fn spawn<F>(&mut self, name: &'static str, body: F) -> Result<(), ServerError>
    where
        F: FnOnce() + Send + 'static,
    {
        match thread::Builder::new().name(name.into()).spawn(body) {
            Ok(handle) => {
                self.threads.push(handle);
                Ok(())
            }
            Err(source) => {
                error!(thread = name, error = %source, "thread spawn failed");
                self.stop_threads();
                Err(ServerError::Spawn { name, source })
            }
        }
    }

    pub fn context(&self) -> &MotionContext {
        &self.ctx
    }

    /// Queue `goal`, preempting the executing one.
    pub fn submit(&self, goal: Goal) -> GoalId {
        let id = goal.id();
        let displaced = self.slot.submit(goal);
        report_discarded(&self.executor, &displaced);
        id
    }

    /// Build a goal and submit it; an invalid pose is rejected.
    ///
    /// A rejected goal never gets an id the caller sees.  The `Rejected`
    /// status goes out under a fresh [`GoalId`], with the requested frame
    /// and pose spelled out in the reason so subscribers can tell which
    /// request it was.
    pub fn submit_pose(
        &self,
        pose: Pose2D,
        frame: impl Into<FrameId>,
    ) -> Result<GoalId, MotionError> {
        let frame = frame.into();
        match Goal::new(pose, frame.clone()) {
            Ok(goal) => Ok(self.submit(goal)),
            Err(e) => {
                warn!(
                    reason = %e,
                    frame = %frame,
                    x = pose.x,
                    y = pose.y,
                    yaw = pose.yaw,
                    "goal rejected"
                );
                let reason = format!(
                    "{e} (frame '{frame}', x={}, y={}, yaw={})",
                    pose.x, pose.y, pose.yaw
                );
                self.executor
                    .publish_status(GoalId::new(), GoalStatus::Rejected(reason));
                Err(e)
            }
        }
    }

    /// Stop the executing goal and drop any waiting one.
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// A handle that can stop goals from another thread, e.g. a signal
    /// handler, without owning the server.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            slot: self.slot.clone(),
            executor: self.executor.clone(),
        }
    }

    /// Update one parameter and announce it on the alerts topic.
    pub fn set_param(&self, name: &str, value: &str) -> Result<u64, ParamError> {
        let version = self.ctx.params.set(name, value)?;
        self.ctx.bus.emit(
            Topic::SystemAlerts,
            SOURCE,
            EventPayload::ParameterChange {
                name: name.to_string(),
                value: value.to_string(),
            },
        );
        Ok(version)
    }

    pub fn state(&self) -> SlotState {
        self.slot.state()
    }

    pub fn active_goal(&self) -> Option<GoalId> {
        self.slot.active()
    }

    /// Wait until no goal is executing or waiting.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.slot.wait_idle(timeout)
    }

    fn stop_threads(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.slot.shutdown();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("?").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "thread panicked");
            }
        }
    }

    /// Preempt any goal, stop both threads and wait for them.
    pub fn shutdown(mut self) {
        self.stop_threads();
        info!("motion server stopped");
    }
}

fn report_discarded(executor: &GoalExecutor, displaced: &Displaced) {
    if let Some(id) = displaced.discarded {
        executor.publish_status(id, GoalStatus::Preempted);
    }
}

#[derive(Clone)]
pub struct Canceller {
    slot: Arc<GoalSlot>,
    executor: Arc<GoalExecutor>,
}

impl Canceller {
    pub fn cancel(&self) {
        let displaced = self.slot.cancel();
        report_discarded(&self.executor, &displaced);
    }
}

impl Drop for MotionServer {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strider_control::ParamStore;
    use strider_hal::{SimulatedBase, SimulatedObstacles, SystemClock};
    use strider_middleware::{EventBus, TopicReceiver};
    use strider_perception::ObstacleBoard;
    use strider_types::Point2;

    const LONG: Duration = Duration::from_secs(20);

    struct Harness {
        base: Arc<SimulatedBase>,
        field: Arc<SimulatedObstacles>,
        server: MotionServer,
    }

    /// Wall-clock server with brisk dynamics so goals finish quickly.
    fn harness() -> Harness {
        let clock = Arc::new(SystemClock::new());
        let base = Arc::new(SimulatedBase::new(clock.clone()));
        let field = Arc::new(SimulatedObstacles::new(base.clone()));
        let params = Arc::new(ParamStore::default());
        for (name, value) in [
            ("linear_acceleration", "2.0"),
            ("max_linear_velocity", "1.0"),
            ("linear_gain", "4.0"),
            ("angular_acceleration", "6.0"),
            ("max_turning_velocity", "3.0"),
            ("rotational_gain", "5.0"),
            ("localization_latency", "0.05"),
        ] {
            params.set(name, value).unwrap();
        }
        let ctx = MotionContext {
            clock,
            poses: base.clone(),
            obstacles: field.clone(),
            board: Arc::new(ObstacleBoard::new()),
            sink: base.clone(),
            params,
            bus: EventBus::default(),
        };
        Harness {
            base,
            field,
            server: MotionServer::start(ctx).unwrap(),
        }
    }

    /// Block until `n` status events have arrived.
    fn collect_statuses(rx: &mut TopicReceiver, n: usize) -> Vec<(GoalId, GoalStatus)> {
        let mut out = Vec::new();
        while out.len() < n {
            let event = rx.blocking_recv().unwrap();
            if let EventPayload::GoalStatus { goal_id, status } = event.payload {
                out.push((goal_id, status));
            }
        }
        out
    }

    #[test]
    fn goal_runs_to_success() {
        let h = harness();
        let mut rx = h.server.context().bus.subscribe_to(Topic::GoalStatus);
        let id = h
            .server
            .submit_pose(Pose2D::new(0.6, 0.0, 0.0), "odom")
            .unwrap();

        assert_eq!(
            collect_statuses(&mut rx, 2),
            vec![(id, GoalStatus::Active), (id, GoalStatus::Succeeded)]
        );
        assert!(h.server.wait_idle(LONG));
        assert!((h.base.odom_pose().x - 0.6).abs() < 0.11);
        assert!(h.base.last_command().unwrap().is_stop());
        h.server.shutdown();
    }

    #[test]
    fn non_finite_goal_is_rejected() {
        let h = harness();
        let mut rx = h.server.context().bus.subscribe_to(Topic::GoalStatus);
        let err = h
            .server
            .submit_pose(Pose2D::new(1.0, 0.0, f32::NAN), "odom")
            .unwrap_err();
        assert!(matches!(err, MotionError::InvalidGoal(_)));

        let statuses = collect_statuses(&mut rx, 1);
        match &statuses[0].1 {
            GoalStatus::Rejected(reason) => {
                assert!(reason.contains("frame 'odom'"), "{reason}");
                assert!(reason.contains("yaw=NaN"), "{reason}");
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(h.server.state(), SlotState::Idle);
        assert!(h.base.command_history().is_empty());
    }

    #[test]
    fn new_goal_preempts_blocked_goal() {
        let h = harness();
        h.field.add_point(Point2::new(0.4, 0.0));
        let mut rx = h.server.context().bus.subscribe_to(Topic::GoalStatus);

        let blocked = h
            .server
            .submit_pose(Pose2D::new(2.0, 0.0, 0.0), "odom")
            .unwrap();
        assert_eq!(collect_statuses(&mut rx, 1), vec![(blocked, GoalStatus::Active)]);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(h.server.active_goal(), Some(blocked));

        // Backing up needs no forward clearance.
        let behind = h
            .server
            .submit_pose(Pose2D::new(-0.3, 0.0, 0.0), "odom")
            .unwrap();
        assert_eq!(
            collect_statuses(&mut rx, 3),
            vec![
                (blocked, GoalStatus::Preempted),
                (behind, GoalStatus::Active),
                (behind, GoalStatus::Succeeded),
            ]
        );
        assert!(h.base.odom_pose().x < -0.19);
    }

    #[test]
    fn cancel_stops_executing_goal() {
        let h = harness();
        h.field.add_point(Point2::new(0.4, 0.0));
        let mut rx = h.server.context().bus.subscribe_to(Topic::GoalStatus);
        let id = h
            .server
            .submit_pose(Pose2D::new(2.0, 0.0, 0.0), "odom")
            .unwrap();
        collect_statuses(&mut rx, 1);

        h.server.cancel();
        assert_eq!(collect_statuses(&mut rx, 1), vec![(id, GoalStatus::Preempted)]);
        assert!(h.server.wait_idle(LONG));
        assert!(h.base.last_command().unwrap().is_stop());
    }

    #[test]
    fn canceller_drops_waiting_goal() {
        let h = harness();
        h.field.add_point(Point2::new(0.4, 0.0));
        let mut rx = h.server.context().bus.subscribe_to(Topic::GoalStatus);
        let running = h
            .server
            .submit_pose(Pose2D::new(2.0, 0.0, 0.0), "odom")
            .unwrap();
        collect_statuses(&mut rx, 1);

        // Also blocked, so it can only leave the slot through the cancel.
        let waiting = h
            .server
            .submit_pose(Pose2D::new(3.0, 0.0, 0.0), "odom")
            .unwrap();
        let canceller = h.server.canceller();
        let worker = thread::spawn(move || canceller.cancel());
        worker.join().unwrap();

        // The waiting goal is either dropped from the mailbox or, if the
        // executor already took it, preempted right after going active.
        let mut terminal = Vec::new();
        while terminal.len() < 2 {
            for (id, status) in collect_statuses(&mut rx, 1) {
                if status != GoalStatus::Active {
                    terminal.push((id, status));
                }
            }
        }
        assert!(terminal.contains(&(running, GoalStatus::Preempted)), "{terminal:?}");
        assert!(terminal.contains(&(waiting, GoalStatus::Preempted)), "{terminal:?}");
        assert!(h.server.wait_idle(LONG));
    }

    #[test]
    fn set_param_is_announced() {
        let h = harness();
        let mut alerts = h.server.context().bus.subscribe_to(Topic::SystemAlerts);
        let before = h.server.context().params.version();
        let version = h.server.set_param("abort_timeout", "7.5").unwrap();
        assert!(version > before);
        assert_eq!(h.server.context().params.snapshot().abort_timeout, 7.5);

        let events = alerts.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].payload,
            EventPayload::ParameterChange { name, value } if name == "abort_timeout" && value == "7.5"
        ));
        assert!(h.server.set_param("warp_speed", "9").is_err());
    }

    #[test]
    fn idle_loop_keeps_board_fresh() {
        let h = harness();
        let board = h.server.context().board.clone();
        let first = board.update_count();
        assert!(first >= 1);
        h.field.add_point(Point2::new(1.0, 0.0));
        thread::sleep(Duration::from_millis(200));
        assert!(board.update_count() > first);
        assert!((board.latest().forward_dist - 1.0).abs() < 1e-5);
    }
}
