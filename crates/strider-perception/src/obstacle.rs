//! Obstacle readings.
//!
//! [`ObstacleSensor`] is the seam behind which range data is reduced to the
//! two questions the controllers ask: how much free space is there in the
//! direction of travel, and how far can the robot turn before it sweeps into
//! something.
//!
//! [`ObstacleBoard`] carries the latest [`ObstacleSnapshot`] from the 20 Hz
//! idle loop to the 50 Hz translation controller.  The snapshot is swapped in
//! as a whole, so a reader never sees fields from two different readings.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use strider_types::ObstacleSnapshot;
use tracing::trace;

/// Directional range queries against the robot's surroundings.
pub trait ObstacleSensor: Send + Sync {
    /// Free distance ahead (`forward = true`) or behind the robot, together
    /// with side clearances.  Points closer than `min_side_dist` to the
    /// travel corridor's edge are ignored for the forward distance.
    fn obstacle_distance(&self, forward: bool, min_side_dist: f32) -> ObstacleSnapshot;

    /// Largest angle (radians, non-negative) the robot can rotate in the
    /// given direction without sweeping into an obstacle.  `π` when the
    /// rotation is unobstructed.
    fn obstacle_angle(&self, counter_clockwise: bool) -> f32;
}

impl<T: ObstacleSensor + ?Sized> ObstacleSensor for Arc<T> {
    fn obstacle_distance(&self, forward: bool, min_side_dist: f32) -> ObstacleSnapshot {
        (**self).obstacle_distance(forward, min_side_dist)
    }

    fn obstacle_angle(&self, counter_clockwise: bool) -> f32 {
        (**self).obstacle_angle(counter_clockwise)
    }
}

/// Single-slot, lock-free holder for the most recent forward reading.
pub struct ObstacleBoard {
    latest: ArcSwap<ObstacleSnapshot>,
    updates: AtomicU64,
}

impl Default for ObstacleBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ObstacleBoard {
    /// Start with a clear reading (all distances infinite).
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(ObstacleSnapshot::clear()),
            updates: AtomicU64::new(0),
        }
    }

    /// Replace the held snapshot.
    pub fn publish(&self, snapshot: ObstacleSnapshot) {
        self.latest.store(Arc::new(snapshot));
        let n = self.updates.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(update = n, forward = snapshot.forward_dist, "obstacle snapshot published");
    }

    /// Copy of the most recently published snapshot.
    pub fn latest(&self) -> ObstacleSnapshot {
        **self.latest.load()
    }

    /// Number of snapshots published so far.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn uniform(d: f32) -> ObstacleSnapshot {
        ObstacleSnapshot {
            forward_dist: d,
            left_dist: d,
            right_dist: d,
            ..ObstacleSnapshot::clear()
        }
    }

    #[test]
    fn starts_clear() {
        let board = ObstacleBoard::new();
        assert!(board.latest().forward_dist.is_infinite());
        assert_eq!(board.update_count(), 0);
    }

    #[test]
    fn latest_returns_last_published() {
        let board = ObstacleBoard::new();
        board.publish(uniform(2.0));
        board.publish(uniform(0.4));
        assert_eq!(board.latest().forward_dist, 0.4);
        assert_eq!(board.update_count(), 2);
    }

    #[test]
    fn concurrent_reader_never_sees_torn_snapshot() {
        let board = Arc::new(ObstacleBoard::new());
        let writer = {
            let board = Arc::clone(&board);
            thread::spawn(move || {
                for i in 0..5_000 {
                    board.publish(uniform(i as f32));
                }
            })
        };

        for _ in 0..5_000 {
            let s = board.latest();
            if s.forward_dist.is_finite() {
                assert_eq!(s.forward_dist, s.left_dist);
                assert_eq!(s.left_dist, s.right_dist);
            }
        }
        writer.join().unwrap();
        assert_eq!(board.update_count(), 5_000);
    }
}
