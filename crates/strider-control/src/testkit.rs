//! Simulated rig shared by the controller tests.

use std::sync::Arc;

use strider_hal::{SimClock, SimulatedBase, SimulatedObstacles};
use strider_middleware::EventBus;
use strider_perception::ObstacleBoard;
use strider_types::VelocityCommand;

use crate::params::ParamStore;
use crate::phase::MotionContext;

pub(crate) struct Rig {
    pub clock: Arc<SimClock>,
    pub base: Arc<SimulatedBase>,
    pub field: Arc<SimulatedObstacles>,
    pub ctx: MotionContext,
}

impl Rig {
    pub fn new() -> Self {
        let clock = Arc::new(SimClock::new());
        let base = Arc::new(SimulatedBase::new(clock.clone()));
        let field = Arc::new(SimulatedObstacles::new(base.clone()));
        let ctx = MotionContext {
            clock: clock.clone(),
            poses: base.clone(),
            obstacles: field.clone(),
            board: Arc::new(ObstacleBoard::new()),
            sink: base.clone(),
            params: Arc::new(ParamStore::default()),
            bus: EventBus::default(),
        };
        Self {
            clock,
            base,
            field,
            ctx,
        }
    }

    /// Commands the base received, in order.
    pub fn commands(&self) -> Vec<VelocityCommand> {
        self.base
            .command_history()
            .into_iter()
            .map(|(_, c)| c)
            .collect()
    }
}
