//! Single-slot, preempting goal mailbox.
//!
//! At most one goal executes and at most one waits.  Submitting while a goal
//! executes raises the preemption flag the running controller polls every
//! tick; submitting while another goal waits replaces (and discards) the
//! waiting one.
//!
//! ```text
//!            submit                       finish
//!   Idle ──────────────► Executing ──────────────► Idle
//!                          │   ▲
//!          submit/cancel   │   │ finish, next goal taken
//!                          ▼   │
//!                        Preempting
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use strider_control::PreemptSignal;
use strider_types::{Goal, GoalId};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Executing,
    /// The executing goal has been asked to stop.
    Preempting,
}

#[derive(Debug)]
struct Inner {
    state: SlotState,
    active: Option<GoalId>,
    pending: Option<Goal>,
    shutdown: bool,
}

/// What a [`GoalSlot::submit`] displaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Displaced {
    /// A waiting goal that was thrown away before it ever ran.
    pub discarded: Option<GoalId>,
    /// The executing goal that has been asked to stop.
    pub preempted: Option<GoalId>,
}

pub struct GoalSlot {
    inner: Mutex<Inner>,
    changed: Condvar,
    preempt: AtomicBool,
}

impl Default for GoalSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl GoalSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SlotState::Idle,
                active: None,
                pending: None,
                shutdown: false,
            }),
            changed: Condvar::new(),
            preempt: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `goal`, preempting whatever is executing.
    pub fn submit(&self, goal: Goal) -> Displaced {
        let mut inner = self.lock();
        let id = goal.id();
        let discarded = inner.pending.replace(goal).map(|g| g.id());
        let preempted = self.request_preempt(&mut inner);
        info!(goal = %id, ?discarded, ?preempted, "goal submitted");
        self.changed.notify_all();
        Displaced {
            discarded,
            preempted,
        }
    }

    /// Stop the executing goal and drop any waiting one.
    pub fn cancel(&self) -> Displaced {
        let mut inner = self.lock();
        let discarded = inner.pending.take().map(|g| g.id());
        let preempted = self.request_preempt(&mut inner);
        info!(?discarded, ?preempted, "goal cancel requested");
        self.changed.notify_all();
        Displaced {
            discarded,
            preempted,
        }
    }

    fn request_preempt(&self, inner: &mut Inner) -> Option<GoalId> {
        match inner.state {
            SlotState::Idle => None,
            SlotState::Executing | SlotState::Preempting => {
                inner.state = SlotState::Preempting;
                self.preempt.store(true, Ordering::SeqCst);
                inner.active
            }
        }
    }

    /// Block until a goal is waiting, then mark it executing and return it.
    ///
    /// Returns `None` once [`shutdown`][Self::shutdown] has been called.
    pub fn wait_next(&self) -> Option<Goal> {
        let mut inner = self.lock();
        loop {
            if inner.shutdown {
                return None;
            }
            if inner.state == SlotState::Idle
                && let Some(goal) = inner.pending.take()
            {
                inner.state = SlotState::Executing;
                inner.active = Some(goal.id());
                self.preempt.store(false, Ordering::SeqCst);
                debug!(goal = %goal.id(), "goal taken for execution");
                return Some(goal);
            }
            inner = self.changed.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Mark the executing goal finished.
    pub fn finish(&self) {
        let mut inner = self.lock();
        inner.state = SlotState::Idle;
        inner.active = None;
        self.preempt.store(false, Ordering::SeqCst);
        self.changed.notify_all();
    }

    /// Wake every waiter and refuse further work.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.shutdown = true;
        self.request_preempt(&mut inner);
        self.changed.notify_all();
    }

    pub fn state(&self) -> SlotState {
        self.lock().state
    }

    pub fn active(&self) -> Option<GoalId> {
        self.lock().active
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Wait until nothing executes and nothing waits.  Returns `false` on
    /// timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        while inner.state != SlotState::Idle || inner.pending.is_some() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            inner = match self.changed.wait_timeout(inner, left) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}

impl PreemptSignal for GoalSlot {
    fn is_preempt_requested(&self) -> bool {
        self.preempt.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use strider_types::Pose2D;

    fn goal(x: f32) -> Goal {
        Goal::new(Pose2D::new(x, 0.0, 0.0), "odom").unwrap()
    }

    #[test]
    fn submit_then_take() {
        let slot = GoalSlot::new();
        assert_eq!(slot.state(), SlotState::Idle);

        let g = goal(1.0);
        let id = g.id();
        assert_eq!(slot.submit(g), Displaced::default());
        assert!(slot.has_pending());

        let taken = slot.wait_next().unwrap();
        assert_eq!(taken.id(), id);
        assert_eq!(slot.state(), SlotState::Executing);
        assert_eq!(slot.active(), Some(id));
        assert!(!slot.is_preempt_requested());

        slot.finish();
        assert_eq!(slot.state(), SlotState::Idle);
        assert!(slot.wait_idle(Duration::from_millis(10)));
    }

    #[test]
    fn submit_while_executing_preempts() {
        let slot = GoalSlot::new();
        let first = goal(1.0);
        let first_id = first.id();
        slot.submit(first);
        slot.wait_next().unwrap();

        let displaced = slot.submit(goal(2.0));
        assert_eq!(displaced.preempted, Some(first_id));
        assert_eq!(slot.state(), SlotState::Preempting);
        assert!(slot.is_preempt_requested());

        slot.finish();
        let next = slot.wait_next().unwrap();
        assert!((next.target().x - 2.0).abs() < 1e-6);
        assert!(!slot.is_preempt_requested());
    }

    #[test]
    fn newer_pending_goal_discards_older() {
        let slot = GoalSlot::new();
        let older = goal(1.0);
        let older_id = older.id();
        slot.submit(older);
        let displaced = slot.submit(goal(2.0));
        assert_eq!(displaced.discarded, Some(older_id));
        assert_eq!(displaced.preempted, None);
        assert!((slot.wait_next().unwrap().target().x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cancel_drops_pending_and_preempts() {
        let slot = GoalSlot::new();
        slot.submit(goal(1.0));
        slot.wait_next().unwrap();
        let waiting = goal(2.0);
        let waiting_id = waiting.id();
        slot.submit(waiting);

        let displaced = slot.cancel();
        assert_eq!(displaced.discarded, Some(waiting_id));
        assert!(slot.is_preempt_requested());
        slot.finish();
        assert!(slot.wait_idle(Duration::from_millis(10)));
    }

    #[test]
    fn cancel_when_idle_is_a_no_op() {
        let slot = GoalSlot::new();
        assert_eq!(slot.cancel(), Displaced::default());
        assert!(!slot.is_preempt_requested());
    }

    #[test]
    fn wait_next_blocks_until_submit() {
        let slot = Arc::new(GoalSlot::new());
        let worker = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait_next().map(|g| g.target().x))
        };
        thread::sleep(Duration::from_millis(20));
        slot.submit(goal(3.0));
        assert_eq!(worker.join().unwrap(), Some(3.0));
    }

    #[test]
    fn shutdown_releases_waiter() {
        let slot = Arc::new(GoalSlot::new());
        let worker = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait_next().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        slot.shutdown();
        assert!(worker.join().unwrap());
    }

    #[test]
    fn wait_idle_times_out_while_executing() {
        let slot = GoalSlot::new();
        slot.submit(goal(1.0));
        slot.wait_next().unwrap();
        assert!(!slot.wait_idle(Duration::from_millis(20)));
    }
}
