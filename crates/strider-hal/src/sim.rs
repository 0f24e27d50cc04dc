//! In-process robot simulation for headless runs and tests.
//!
//! [`SimulatedBase`] is a kinematic differential-drive (unicycle) robot.  It
//! accepts velocity commands as a [`CommandSink`] and answers frame lookups
//! as a [`PoseSource`], integrating its motion up to the clock's current time
//! on every call.  Frames follow the usual mobile-robot layout:
//!
//! ```text
//! map ──(static, optional)──► odom ──(integrated pose)──► base_footprint
//! ```
//!
//! [`SimulatedObstacles`] is a field of point obstacles fixed in the odom
//! frame, seen from the base's current pose through [`ObstacleSensor`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strider_hal::clock::SimClock;
//! use strider_hal::drive::CommandSink;
//! use strider_hal::sim::SimulatedBase;
//! use strider_types::VelocityCommand;
//!
//! let clock = Arc::new(SimClock::new());
//! let base = SimulatedBase::new(clock.clone());
//!
//! base.send(VelocityCommand::new(0.0, 0.5));
//! clock.advance(Duration::from_secs(2));
//! assert!((base.odom_pose().x - 1.0).abs() < 1e-4);
//! ```

use std::f32::consts::{PI, TAU};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use strider_perception::{
    LookupError, ObstacleSensor, PoseSource, RigidTransform, Stamp, TfBuffer,
};
use strider_types::{FrameId, ObstacleSnapshot, Point2, Pose2D, VelocityCommand};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::drive::CommandSink;

// ────────────────────────────────────────────────────────────────────────────
// SimulatedBase
// ────────────────────────────────────────────────────────────────────────────

/// Names of the three frames the simulated base maintains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFrames {
    pub map: FrameId,
    pub odom: FrameId,
    pub base: FrameId,
}

impl Default for SimFrames {
    fn default() -> Self {
        Self {
            map: FrameId::new("map"),
            odom: FrameId::new("odom"),
            base: FrameId::new("base_footprint"),
        }
    }
}

struct BaseState {
    // Integrated in f64; the robot may run for a long time.
    x: f64,
    y: f64,
    yaw: f64,
    command: VelocityCommand,
    /// Externally imposed velocity in the odom frame (wheel slip, a push).
    disturbance: Point2,
    updated_at: Duration,
    map_to_odom: Pose2D,
    map_available: bool,
    odom_available: bool,
    tf: TfBuffer,
    history: Vec<(Duration, VelocityCommand)>,
}

/// Kinematic unicycle robot driven on a [`Clock`].
pub struct SimulatedBase {
    clock: Arc<dyn Clock>,
    frames: SimFrames,
    state: Mutex<BaseState>,
}

impl SimulatedBase {
    /// Robot at the odom origin, with `map` coincident with `odom`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_frames(clock, SimFrames::default())
    }

    pub fn with_frames(clock: Arc<dyn Clock>, frames: SimFrames) -> Self {
        let now = clock.now();
        let mut state = BaseState {
            x: 0.0,
            y: 0.0,
            yaw: 0.0,
            command: VelocityCommand::stop(),
            disturbance: Point2::default(),
            updated_at: now,
            map_to_odom: Pose2D::origin(),
            map_available: true,
            odom_available: true,
            tf: TfBuffer::default(),
            history: Vec::new(),
        };
        Self::publish_map(&frames, &mut state);
        Self::publish_odom(&frames, &mut state);
        Self {
            clock,
            frames,
            state: Mutex::new(state),
        }
    }

    pub fn frames(&self) -> &SimFrames {
        &self.frames
    }

    /// Current pose of the base in the odom frame.
    pub fn odom_pose(&self) -> Pose2D {
        match self.advanced() {
            Some(s) => Pose2D::new(s.x as f32, s.y as f32, s.yaw as f32),
            None => Pose2D::origin(),
        }
    }

    /// Place the robot at `pose` (odom frame) without any motion.
    pub fn teleport(&self, pose: Pose2D) {
        if let Some(mut s) = self.advanced() {
            s.x = f64::from(pose.x);
            s.y = f64::from(pose.y);
            s.yaw = f64::from(pose.yaw);
            Self::publish_odom(&self.frames, &mut s);
        }
    }

    /// Pose of the odom frame in the map frame.
    pub fn set_map_offset(&self, map_to_odom: Pose2D) {
        if let Some(mut s) = self.advanced() {
            s.map_to_odom = map_to_odom;
            Self::publish_map(&self.frames, &mut s);
        }
    }

    /// Simulate gaining or losing global localization (the map → odom edge).
    pub fn set_map_available(&self, available: bool) {
        if let Some(mut s) = self.advanced() {
            s.map_available = available;
            Self::publish_map(&self.frames, &mut s);
            debug!(frame = %self.frames.map, available, "simulated localization changed");
        }
    }

    /// Simulate gaining or losing odometry (the odom → base edge).
    pub fn set_odom_available(&self, available: bool) {
        if let Some(mut s) = self.advanced() {
            s.odom_available = available;
            Self::publish_odom(&self.frames, &mut s);
            debug!(frame = %self.frames.odom, available, "simulated odometry changed");
        }
    }

    /// Impose an extra velocity (m/s, odom frame) on top of commanded motion.
    pub fn set_disturbance(&self, velocity: Point2) {
        if let Some(mut s) = self.advanced() {
            s.disturbance = velocity;
        }
    }

    /// Every command received so far with the time it arrived.
    pub fn command_history(&self) -> Vec<(Duration, VelocityCommand)> {
        self.lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    pub fn last_command(&self) -> Option<VelocityCommand> {
        self.lock().and_then(|s| s.history.last().map(|(_, c)| *c))
    }

    fn lock(&self) -> Option<MutexGuard<'_, BaseState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("simulated base state poisoned");
                None
            }
        }
    }

    /// Lock the state with the motion integrated up to now.
    fn advanced(&self) -> Option<MutexGuard<'_, BaseState>> {
        let mut s = self.lock()?;
        let now = self.clock.now();
        let dt = now.saturating_sub(s.updated_at).as_secs_f64();
        if dt > 0.0 {
            integrate(&mut s, dt);
            s.updated_at = now;
            Self::publish_odom(&self.frames, &mut s);
        }
        Some(s)
    }

    fn publish_map(frames: &SimFrames, s: &mut BaseState) {
        if s.map_available {
            s.tf.set_static_transform(
                frames.map.as_str(),
                frames.odom.as_str(),
                RigidTransform::from_pose(s.map_to_odom),
            );
        } else {
            s.tf.remove_transform(frames.map.as_str(), frames.odom.as_str());
        }
    }

    fn publish_odom(frames: &SimFrames, s: &mut BaseState) {
        if s.odom_available {
            let pose = Pose2D::new(s.x as f32, s.y as f32, s.yaw as f32);
            let at = s.updated_at;
            s.tf.set_transform(
                frames.odom.as_str(),
                frames.base.as_str(),
                RigidTransform::from_pose(pose),
                at,
            );
        } else {
            s.tf.remove_transform(frames.odom.as_str(), frames.base.as_str());
        }
    }
}

/// Exact unicycle integration over `dt` seconds at constant command.
fn integrate(s: &mut BaseState, dt: f64) {
    let v = f64::from(s.command.linear);
    let w = f64::from(s.command.angular);
    let yaw0 = s.yaw;
    if w.abs() < 1e-9 {
        s.x += v * yaw0.cos() * dt;
        s.y += v * yaw0.sin() * dt;
    } else {
        let yaw1 = yaw0 + w * dt;
        s.x += v / w * (yaw1.sin() - yaw0.sin());
        s.y -= v / w * (yaw1.cos() - yaw0.cos());
    }
    s.yaw = (yaw0 + w * dt).rem_euclid(std::f64::consts::TAU);
    if s.yaw > std::f64::consts::PI {
        s.yaw -= std::f64::consts::TAU;
    }
    s.x += f64::from(s.disturbance.x) * dt;
    s.y += f64::from(s.disturbance.y) * dt;
}

impl CommandSink for SimulatedBase {
    fn send(&self, command: VelocityCommand) {
        if let Some(mut s) = self.advanced() {
            s.command = command;
            let at = s.updated_at;
            s.history.push((at, command));
        }
    }
}

impl PoseSource for SimulatedBase {
    fn lookup(
        &self,
        target: &FrameId,
        source: &FrameId,
        stamp: Stamp,
    ) -> Result<RigidTransform, LookupError> {
        let s = self.advanced().ok_or_else(|| {
            LookupError::new(target.as_str(), source.as_str(), "simulation unavailable")
        })?;
        s.tf.lookup(target.as_str(), source.as_str(), stamp)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimulatedObstacles
// ────────────────────────────────────────────────────────────────────────────

/// Point obstacles fixed in the odom frame.
///
/// The robot is modelled as a rectangle `2·half_width` wide for travel and,
/// for rotation, by its forward axis: a point within `turn_radius` blocks a
/// turn once the axis reaches that point's bearing.
pub struct SimulatedObstacles {
    base: Arc<SimulatedBase>,
    points: Mutex<Vec<Point2>>,
    half_width: f32,
    turn_radius: f32,
}

impl SimulatedObstacles {
    pub fn new(base: Arc<SimulatedBase>) -> Self {
        Self {
            base,
            points: Mutex::new(Vec::new()),
            half_width: 0.2,
            turn_radius: 0.4,
        }
    }

    /// Override the robot half width and the radius swept when turning.
    pub fn with_footprint(mut self, half_width: f32, turn_radius: f32) -> Self {
        self.half_width = half_width;
        self.turn_radius = turn_radius;
        self
    }

    /// Add a point obstacle at `(x, y)` in the odom frame.
    pub fn add_point(&self, point: Point2) {
        if let Ok(mut points) = self.points.lock() {
            points.push(point);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut points) = self.points.lock() {
            points.clear();
        }
    }

    pub fn points(&self) -> Vec<Point2> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Obstacles expressed in the robot's base frame.
    fn points_in_base(&self) -> Vec<Point2> {
        let pose = self.base.odom_pose();
        let (sin, cos) = pose.yaw.sin_cos();
        self.points()
            .into_iter()
            .map(|p| {
                let dx = p.x - pose.x;
                let dy = p.y - pose.y;
                Point2::new(cos * dx + sin * dy, -sin * dx + cos * dy)
            })
            .collect()
    }
}

impl ObstacleSensor for SimulatedObstacles {
    fn obstacle_distance(&self, forward: bool, min_side_dist: f32) -> ObstacleSnapshot {
        let corridor = self.half_width + min_side_dist;
        let mut snapshot = ObstacleSnapshot::clear();
        let mut nearest_left = f32::INFINITY;
        let mut nearest_right = f32::INFINITY;

        for p in self.points_in_base() {
            let ahead = if forward { p.x } else { -p.x };

            if ahead > 0.0 && p.y.abs() <= corridor {
                snapshot.forward_dist = snapshot.forward_dist.min(ahead);
                if p.y >= 0.0 && ahead < nearest_left {
                    nearest_left = ahead;
                    snapshot.forward_left = p;
                } else if p.y < 0.0 && ahead < nearest_right {
                    nearest_right = ahead;
                    snapshot.forward_right = p;
                }
            }

            if p.x.abs() <= self.half_width {
                if p.y > 0.0 {
                    snapshot.left_dist = snapshot.left_dist.min(p.y);
                } else if p.y < 0.0 {
                    snapshot.right_dist = snapshot.right_dist.min(-p.y);
                }
            }
        }
        snapshot
    }

    fn obstacle_angle(&self, counter_clockwise: bool) -> f32 {
        self.points_in_base()
            .into_iter()
            .filter(|p| p.x.hypot(p.y) <= self.turn_radius)
            .map(|p| {
                let bearing = p.y.atan2(p.x);
                let sweep = if counter_clockwise { bearing } else { -bearing };
                sweep.rem_euclid(TAU)
            })
            .fold(PI, f32::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use std::f32::consts::FRAC_PI_2;

    fn setup() -> (Arc<SimClock>, Arc<SimulatedBase>) {
        let clock = Arc::new(SimClock::new());
        let base = Arc::new(SimulatedBase::new(clock.clone()));
        (clock, base)
    }

    fn base_in(base: &SimulatedBase, frame: &str) -> Result<Pose2D, LookupError> {
        base.lookup(&FrameId::new(frame), &base.frames().base, Stamp::Latest)
            .map(RigidTransform::to_pose2d)
    }

    #[test]
    fn drives_straight() {
        let (clock, base) = setup();
        base.send(VelocityCommand::new(0.0, 0.25));
        clock.advance(Duration::from_secs(4));
        let p = base.odom_pose();
        assert!((p.x - 1.0).abs() < 1e-4);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn turns_in_place() {
        let (clock, base) = setup();
        base.send(VelocityCommand::new(FRAC_PI_2, 0.0));
        clock.advance(Duration::from_secs(1));
        assert!((base.odom_pose().yaw - FRAC_PI_2).abs() < 1e-4);
    }

    #[test]
    fn drives_an_arc() {
        let (clock, base) = setup();
        // Quarter circle of radius 1 m.
        base.send(VelocityCommand::new(FRAC_PI_2, FRAC_PI_2));
        clock.advance(Duration::from_secs(1));
        let p = base.odom_pose();
        assert!((p.x - 1.0).abs() < 1e-4);
        assert!((p.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn map_lookup_includes_offset() {
        let (clock, base) = setup();
        base.set_map_offset(Pose2D::new(10.0, 0.0, 0.0));
        base.send(VelocityCommand::new(0.0, 1.0));
        clock.advance(Duration::from_secs(1));
        let p = base_in(&base, "map").unwrap();
        assert!((p.x - 11.0).abs() < 1e-4);
    }

    #[test]
    fn localization_loss_fails_map_lookup_only() {
        let (_clock, base) = setup();
        base.set_map_available(false);
        assert!(base_in(&base, "map").is_err());
        assert!(base_in(&base, "odom").is_ok());
        base.set_map_available(true);
        assert!(base_in(&base, "map").is_ok());
    }

    #[test]
    fn odometry_loss_fails_every_lookup() {
        let (_clock, base) = setup();
        base.set_odom_available(false);
        assert!(base_in(&base, "odom").is_err());
        assert!(base_in(&base, "map").is_err());
    }

    #[test]
    fn disturbance_moves_robot_without_command() {
        let (clock, base) = setup();
        base.set_disturbance(Point2::new(-0.1, 0.0));
        clock.advance(Duration::from_secs(2));
        assert!((base.odom_pose().x + 0.2).abs() < 1e-4);
    }

    #[test]
    fn records_command_history() {
        let (clock, base) = setup();
        base.send(VelocityCommand::new(0.1, 0.0));
        clock.advance(Duration::from_millis(20));
        base.send(VelocityCommand::stop());
        let history = base.command_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].0, Duration::from_millis(20));
        assert!(base.last_command().unwrap().is_stop());
    }

    #[test]
    fn obstacle_ahead_and_behind() {
        let (_clock, base) = setup();
        let field = SimulatedObstacles::new(base.clone());
        field.add_point(Point2::new(1.5, 0.1));
        field.add_point(Point2::new(-0.8, -0.1));
        field.add_point(Point2::new(2.0, 3.0)); // far off to the side

        let ahead = field.obstacle_distance(true, 0.3);
        assert!((ahead.forward_dist - 1.5).abs() < 1e-5);
        assert_eq!(ahead.forward_left, Point2::new(1.5, 0.1));

        let behind = field.obstacle_distance(false, 0.3);
        assert!((behind.forward_dist - 0.8).abs() < 1e-5);
        assert_eq!(behind.forward_right, Point2::new(-0.8, -0.1));
    }

    #[test]
    fn side_distances() {
        let (_clock, base) = setup();
        let field = SimulatedObstacles::new(base.clone());
        field.add_point(Point2::new(0.0, 0.7));
        field.add_point(Point2::new(-0.1, -0.4));
        let s = field.obstacle_distance(true, 0.3);
        assert!(s.forward_dist.is_infinite());
        assert!((s.left_dist - 0.7).abs() < 1e-5);
        assert!((s.right_dist - 0.4).abs() < 1e-5);
    }

    #[test]
    fn obstacles_follow_robot_pose() {
        let (_clock, base) = setup();
        let field = SimulatedObstacles::new(base.clone());
        field.add_point(Point2::new(0.0, 2.0));
        assert!(field.obstacle_distance(true, 0.3).forward_dist.is_infinite());

        base.teleport(Pose2D::new(0.0, 0.0, FRAC_PI_2));
        assert!((field.obstacle_distance(true, 0.3).forward_dist - 2.0).abs() < 1e-4);
    }

    #[test]
    fn obstacle_angle_limits_turn_toward_point() {
        let (_clock, base) = setup();
        let field = SimulatedObstacles::new(base.clone());
        assert_eq!(field.obstacle_angle(true), PI);

        // Point 45° to the left, inside the turn radius.
        field.add_point(Point2::new(0.2, 0.2));
        assert!((field.obstacle_angle(true) - PI / 4.0).abs() < 1e-5);
        // Turning clockwise the point is 315° away: capped at π.
        assert_eq!(field.obstacle_angle(false), PI);
    }

    #[test]
    fn wider_footprint_widens_corridor() {
        let (_clock, base) = setup();
        let narrow = SimulatedObstacles::new(base.clone());
        let wide = SimulatedObstacles::new(base).with_footprint(0.5, 0.6);
        for field in [&narrow, &wide] {
            field.add_point(Point2::new(1.0, 0.7));
        }
        // Corridor = half width + min side distance.
        assert!(narrow.obstacle_distance(true, 0.3).forward_dist.is_infinite());
        assert!((wide.obstacle_distance(true, 0.3).forward_dist - 1.0).abs() < 1e-5);
    }
}
