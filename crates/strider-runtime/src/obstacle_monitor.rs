//! The 20 Hz idle loop that keeps the forward obstacle reading fresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strider_control::ParamStore;
use strider_hal::{Clock, Rate};
use strider_middleware::{EventBus, Topic};
use strider_perception::{ObstacleBoard, ObstacleSensor};
use strider_types::{EventPayload, ObstacleSnapshot};
use tracing::{debug, info};

pub const IDLE_RATE_HZ: f32 = 20.0;

const SOURCE: &str = "strider-runtime::obstacle_monitor";

pub struct ObstacleMonitor {
    sensor: Arc<dyn ObstacleSensor>,
    board: Arc<ObstacleBoard>,
    params: Arc<ParamStore>,
    bus: EventBus,
}

impl ObstacleMonitor {
    pub fn new(
        sensor: Arc<dyn ObstacleSensor>,
        board: Arc<ObstacleBoard>,
        params: Arc<ParamStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            sensor,
            board,
            params,
            bus,
        }
    }

    /// Take one forward reading, publish it to the board and the bus.
    pub fn tick(&self) -> ObstacleSnapshot {
        let min_side_dist = self.params.snapshot().min_side_dist;
        let snapshot = self.sensor.obstacle_distance(true, min_side_dist);
        self.board.publish(snapshot);
        self.bus.emit(
            Topic::Telemetry,
            SOURCE,
            EventPayload::ObstacleDistance {
                forward: snapshot.forward_dist,
                left: snapshot.left_dist,
                right: snapshot.right_dist,
            },
        );
        debug!(forward = snapshot.forward_dist, "obstacle reading");
        snapshot
    }

    /// Tick at [`IDLE_RATE_HZ`] until `stop` is raised.
    pub fn run(&self, clock: Arc<dyn Clock>, stop: &AtomicBool) {
        info!("obstacle monitor started");
        let mut rate = Rate::new(clock, IDLE_RATE_HZ);
        while !stop.load(Ordering::SeqCst) {
            self.tick();
            rate.sleep();
        }
        info!("obstacle monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_hal::{SimClock, SimulatedBase, SimulatedObstacles};
    use strider_types::Point2;

    fn monitor() -> (ObstacleMonitor, Arc<SimulatedObstacles>, Arc<ObstacleBoard>, EventBus) {
        let clock = Arc::new(SimClock::new());
        let base = Arc::new(SimulatedBase::new(clock));
        let field = Arc::new(SimulatedObstacles::new(base));
        let board = Arc::new(ObstacleBoard::new());
        let bus = EventBus::default();
        let m = ObstacleMonitor::new(
            field.clone(),
            board.clone(),
            Arc::new(ParamStore::default()),
            bus.clone(),
        );
        (m, field, board, bus)
    }

    #[test]
    fn tick_publishes_to_board_and_bus() {
        let (m, field, board, bus) = monitor();
        let mut rx = bus.subscribe_to(Topic::Telemetry);
        field.add_point(Point2::new(1.5, 0.0));

        let snap = m.tick();
        assert!((snap.forward_dist - 1.5).abs() < 1e-5);
        assert_eq!(board.latest().forward_dist, snap.forward_dist);
        assert_eq!(board.update_count(), 1);

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::ObstacleDistance { forward, .. } => {
                assert_eq!(*forward, snap.forward_dist)
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn run_exits_when_stopped() {
        let (m, _field, board, _bus) = monitor();
        let stop = AtomicBool::new(true);
        m.run(Arc::new(SimClock::new()), &stop);
        assert_eq!(board.update_count(), 0);
    }

    #[test]
    fn cleared_field_reads_infinite() {
        let (m, field, board, _bus) = monitor();
        field.add_point(Point2::new(0.4, 0.0));
        m.tick();
        field.clear();
        m.tick();
        assert!(board.latest().forward_dist.is_infinite());
    }
}
