//! Transform Frame (TF) buffer.
//!
//! Maintains a graph of named reference frames and the timestamped rigid-body
//! transforms (translation + quaternion rotation) that relate them.  Edges are
//! stored parent → child, but lookups may walk an edge in either direction:
//! walking against an edge uses its inverse.
//!
//! A transform `T_a_b` is the pose of frame `b` expressed in frame `a`; it
//! maps points written in `b` into `a`.  [`TfBuffer::lookup`]`(a, b, ..)`
//! returns exactly that.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use strider_perception::transform::{RigidTransform, Stamp, TfBuffer, Vec3, Quaternion};
//!
//! let mut tf = TfBuffer::new(Duration::from_secs(3));
//!
//! // odom is 1 m ahead of map.
//! tf.set_static_transform("map", "odom",
//!     RigidTransform::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//! // The robot is 0.5 m ahead of odom.
//! tf.set_transform("odom", "base_footprint",
//!     RigidTransform::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()),
//!     Duration::from_millis(10));
//!
//! let t = tf.lookup("map", "base_footprint", Stamp::Latest).unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-5);
//!
//! // Walking the chain backwards yields the inverse.
//! let back = tf.lookup("base_footprint", "map", Stamp::Latest).unwrap();
//! assert!((back.translation.x + 1.5).abs() < 1e-5);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Mul;
use std::time::Duration;

use strider_types::{FrameId, Pose2D, normalize_angle};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    /// Length of the projection onto the XY plane.
    pub fn planar_norm(self) -> f32 {
        self.x.hypot(self.y)
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// The caller is responsible for providing a unit quaternion.
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Pure rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f32) -> Self {
        let half = 0.5 * yaw;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rescale to unit length.  Long composition chains accumulate rounding
    /// error, so composed rotations are renormalised.
    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n <= f32::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Heading about +Z (the Z-Y-X Euler yaw), in `(−π, π]`.
    pub fn yaw(self) -> f32 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        normalize_angle(siny_cosp.atan2(cosy_cosp))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RigidTransform
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in B into A, rotate it by `rotation` then add `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl RigidTransform {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Lift a planar pose into a transform lying in the XY plane.
    pub fn from_pose(pose: Pose2D) -> Self {
        Self::new(Vec3::new(pose.x, pose.y, 0.0), Quaternion::from_yaw(pose.yaw))
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation).normalized();
        Self::new(translated, rotated)
    }

    /// T_A_B → T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation).neg(), inv_rot)
    }

    /// Map a point written in the child frame into the parent frame.
    pub fn apply(self, point: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(point))
    }

    pub fn yaw(self) -> f32 {
        self.rotation.yaw()
    }

    /// Project onto the plane: `(x, y, yaw)`.
    pub fn to_pose2d(self) -> Pose2D {
        Pose2D::new(self.translation.x, self.translation.y, self.yaw())
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lookup API
// ────────────────────────────────────────────────────────────────────────────

/// Which instant a lookup should be answered for.
///
/// Times are offsets from the owning clock's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// The most recent data available on every edge.
    Latest,
    At(Duration),
}

/// A transform could not be produced.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot express '{source_frame}' in '{target_frame}': {reason}")]
pub struct LookupError {
    pub target_frame: String,
    pub source_frame: String,
    pub reason: String,
}

impl LookupError {
    pub fn new(target: &str, source: &str, reason: impl Into<String>) -> Self {
        Self {
            target_frame: target.to_string(),
            source_frame: source.to_string(),
            reason: reason.into(),
        }
    }
}

/// Capability for frame-to-frame rigid-transform lookup.
///
/// Implementations must fail fast: a missing or stale transform is an error,
/// never a wait.
pub trait PoseSource: Send + Sync {
    /// Return T_target_source: the pose of `source` expressed in `target`.
    fn lookup(
        &self,
        target: &FrameId,
        source: &FrameId,
        stamp: Stamp,
    ) -> Result<RigidTransform, LookupError>;

    /// Re-express `pose`, currently written in frame `from`, in frame `to`.
    fn transform_pose(
        &self,
        from: &FrameId,
        to: &FrameId,
        pose: RigidTransform,
    ) -> Result<RigidTransform, LookupError> {
        Ok(self.lookup(to, from, Stamp::Latest)? * pose)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EdgeHistory {
    /// Samples ordered by stamp, oldest first.
    samples: VecDeque<(Duration, RigidTransform)>,
    is_static: bool,
}

impl EdgeHistory {
    fn sample(&self, stamp: Stamp) -> Result<RigidTransform, &'static str> {
        let (newest_stamp, newest) = self.samples.back().copied().ok_or("no data")?;
        if self.is_static {
            return Ok(newest);
        }
        match stamp {
            Stamp::Latest => Ok(newest),
            Stamp::At(t) => {
                if t > newest_stamp {
                    return Err("lookup would require extrapolation into the future");
                }
                self.samples
                    .iter()
                    .rev()
                    .find(|(s, _)| *s <= t)
                    .map(|(_, tf)| *tf)
                    .ok_or("lookup would require extrapolation into the past")
            }
        }
    }
}

/// Timestamped graph of named frames and the [`RigidTransform`]s that relate
/// them.
///
/// Dynamic edges keep a history no longer than the configured cache
/// duration; static edges hold a single transform valid at every time.
#[derive(Debug)]
pub struct TfBuffer {
    /// `edges[parent][child]`
    edges: HashMap<String, HashMap<String, EdgeHistory>>,
    /// `parents[child]` – reverse adjacency used to walk edges backwards.
    parents: HashMap<String, HashSet<String>>,
    cache: Duration,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl TfBuffer {
    /// Create an empty buffer keeping `cache` worth of history per edge.
    pub fn new(cache: Duration) -> Self {
        Self {
            edges: HashMap::new(),
            parents: HashMap::new(),
            cache,
        }
    }

    /// Record the pose of `child_frame` in `parent_frame` at `stamp`.
    ///
    /// Samples older than the newest one are dropped; history older than the
    /// cache duration is pruned.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: RigidTransform,
        stamp: Duration,
    ) {
        let cache = self.cache;
        let edge = self.edge_mut(parent_frame, child_frame);
        edge.is_static = false;
        if let Some((newest, _)) = edge.samples.back()
            && stamp < *newest
        {
            return;
        }
        edge.samples.push_back((stamp, transform));
        while let Some((oldest, _)) = edge.samples.front() {
            if stamp.saturating_sub(*oldest) > cache && edge.samples.len() > 1 {
                edge.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a transform that never changes (e.g. a sensor mount).
    pub fn set_static_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: RigidTransform,
    ) {
        let edge = self.edge_mut(parent_frame, child_frame);
        edge.is_static = true;
        edge.samples.clear();
        edge.samples.push_back((Duration::ZERO, transform));
    }

    /// Forget the edge between `parent_frame` and `child_frame`.
    ///
    /// Returns `true` if an edge was removed.
    pub fn remove_transform(&mut self, parent_frame: &str, child_frame: &str) -> bool {
        let removed = self
            .edges
            .get_mut(parent_frame)
            .and_then(|children| children.remove(child_frame))
            .is_some();
        if let Some(parents) = self.parents.get_mut(child_frame) {
            parents.remove(parent_frame);
        }
        removed
    }

    /// Compute T_target_source by breadth-first search over the frame graph.
    pub fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Stamp,
    ) -> Result<RigidTransform, LookupError> {
        if target_frame == source_frame {
            return Ok(RigidTransform::identity());
        }

        // Each queue item carries T_target_current.
        let mut queue: VecDeque<(String, RigidTransform)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut last_failure: Option<&'static str> = None;

        queue.push_back((target_frame.to_string(), RigidTransform::identity()));
        visited.insert(target_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            let forward = self
                .edges
                .get(&current)
                .into_iter()
                .flat_map(|children| children.iter())
                .map(|(child, edge)| (child.clone(), edge.sample(stamp)));
            let backward = self
                .parents
                .get(&current)
                .into_iter()
                .flat_map(|parents| parents.iter())
                .filter_map(|parent| {
                    let edge = self.edges.get(parent)?.get(&current)?;
                    Some((parent.clone(), edge.sample(stamp).map(RigidTransform::inverse)))
                });

            for (next, edge_tf) in forward.chain(backward) {
                if visited.contains(&next) {
                    continue;
                }
                let edge_tf = match edge_tf {
                    Ok(tf) => tf,
                    Err(reason) => {
                        last_failure = Some(reason);
                        continue;
                    }
                };
                let composed = accumulated * edge_tf;
                if next == source_frame {
                    return Ok(composed);
                }
                visited.insert(next.clone());
                queue.push_back((next, composed));
            }
        }

        let reason = last_failure.unwrap_or("frames are not connected");
        Err(LookupError::new(target_frame, source_frame, reason))
    }

    fn edge_mut(&mut self, parent_frame: &str, child_frame: &str) -> &mut EdgeHistory {
        self.parents
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string());
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .entry(child_frame.to_string())
            .or_default()
    }
}

impl PoseSource for TfBuffer {
    fn lookup(
        &self,
        target: &FrameId,
        source: &FrameId,
        stamp: Stamp,
    ) -> Result<RigidTransform, LookupError> {
        TfBuffer::lookup(self, target.as_str(), source.as_str(), stamp)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
