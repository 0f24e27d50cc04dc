//! Motion parameters and the store that publishes them to the control loops.
//!
//! [`MotionParams`] is a plain value: serde-loadable, every field defaulted,
//! settable by name for runtime reconfiguration.  [`ParamStore`] holds the
//! live copy behind an atomic pointer swap.  A control tick takes one
//! [`ParamStore::snapshot`] and reads every field from it, so no tick ever
//! mixes values from before and after an update.
//!
//! Values are not cross-checked (a minimum may exceed its maximum); the
//! velocity profiles are written to stay well-defined regardless.
//!
//! # Example
//!
//! ```rust
//! use strider_control::params::ParamStore;
//!
//! let store = ParamStore::default();
//! let before = store.snapshot();
//! store.set("max_linear_velocity", "0.8").unwrap();
//!
//! assert_eq!(before.max_linear_velocity, 0.5); // old snapshot is untouched
//! assert_eq!(store.snapshot().max_linear_velocity, 0.8);
//! assert_eq!(store.version(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Failure to apply a named parameter update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    Unknown(String),

    #[error("invalid value '{value}' for '{name}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

macro_rules! motion_params {
    (
        numeric { $( $(#[$nmeta:meta])* $num:ident = $ndefault:expr ),* $(,)? }
        frames { $( $(#[$fmeta:meta])* $frame:ident = $fdefault:expr ),* $(,)? }
    ) => {
        /// Tunables read by the controllers on every tick.
        ///
        /// Distances are metres, angles radians, velocities per second and
        /// durations seconds.  An empty frame name means "not configured".
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct MotionParams {
            $( $(#[$nmeta])* pub $num: f32, )*
            $( $(#[$fmeta])* pub $frame: String, )*
        }

        impl Default for MotionParams {
            fn default() -> Self {
                Self {
                    $( $num: $ndefault, )*
                    $( $frame: String::from($fdefault), )*
                }
            }
        }

        impl MotionParams {
            /// Every parameter name, in declaration order.
            pub const NAMES: &'static [&'static str] =
                &[ $( stringify!($num), )* $( stringify!($frame), )* ];

            /// Set one parameter from its textual form.
            pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), ParamError> {
                match name {
                    $( stringify!($num) => {
                        self.$num = parse_number(name, value)?;
                    } )*
                    $( stringify!($frame) => {
                        self.$frame = value.trim().trim_start_matches('/').to_string();
                    } )*
                    _ => return Err(ParamError::Unknown(name.to_string())),
                }
                Ok(())
            }

            /// Current value of one parameter, rendered as text.
            pub fn get_field(&self, name: &str) -> Option<String> {
                match name {
                    $( stringify!($num) => Some(self.$num.to_string()), )*
                    $( stringify!($frame) => Some(self.$frame.clone()), )*
                    _ => None,
                }
            }
        }
    };
}

motion_params! {
    numeric {
        min_turning_velocity = 0.02,
        max_turning_velocity = 1.0,
        angular_acceleration = 0.3,
        /// Heading error below which a rotation is complete.
        angular_tolerance = 0.01,
        max_linear_velocity = 0.5,
        linear_acceleration = 0.1,
        /// Distance below which a translation may complete.
        linear_tolerance = 0.1,
        lateral_kp = 2.0,
        lateral_ki = 0.0,
        lateral_kd = 20.0,
        linear_gain = 1.0,
        rotational_gain = 2.5,
        /// Linear speed below which a translation may complete.
        velocity_threshold = 0.1,
        /// Extra clearance each side of the travel corridor.
        min_side_dist = 0.3,
        max_lateral_velocity = 0.5,
        /// Scales the lateral offset before it enters the PID.
        side_recover_weight = 1.0,
        /// Settling pause after a rotation or translation.
        localization_latency = 0.5,
        /// How long distance-to-goal may keep growing before giving up.
        abort_timeout = 5.0,
        obstacle_wait_threshold = 60.0,
        forward_obstacle_threshold = 0.5,
        /// Goals closer than this and behind the robot are reached in reverse.
        reverse_without_turning_threshold = 0.5,
    }
    frames {
        preferred_planning_frame = "",
        alternate_planning_frame = "odom",
        preferred_driving_frame = "map",
        alternate_driving_frame = "odom",
        base_frame = "base_footprint",
    }
}

fn parse_number(name: &str, value: &str) -> Result<f32, ParamError> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|e| ParamError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Seconds to a [`Duration`].  Negative and NaN values become zero; values
/// too large to represent (including `inf`) saturate to [`Duration::MAX`].
pub fn secs(value: f32) -> Duration {
    match Duration::try_from_secs_f32(value) {
        Ok(d) => d,
        Err(_) if value > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

impl MotionParams {
    pub fn localization_latency(&self) -> Duration {
        secs(self.localization_latency)
    }

    pub fn abort_timeout(&self) -> Duration {
        secs(self.abort_timeout)
    }

    pub fn obstacle_wait_threshold(&self) -> Duration {
        secs(self.obstacle_wait_threshold)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ParamStore
// ────────────────────────────────────────────────────────────────────────────

/// Versioned, atomically swapped [`MotionParams`].
///
/// Readers never block.  Writers are serialised so read-modify-write updates
/// from different threads do not lose each other's changes.
pub struct ParamStore {
    current: ArcSwap<MotionParams>,
    version: AtomicU64,
    writer: Mutex<()>,
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new(MotionParams::default())
    }
}

impl ParamStore {
    pub fn new(params: MotionParams) -> Self {
        Self {
            current: ArcSwap::from_pointee(params),
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    /// A consistent view of every parameter.
    pub fn snapshot(&self) -> Arc<MotionParams> {
        self.current.load_full()
    }

    /// Number of updates applied since construction.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Swap in a whole new parameter set.  Returns the new version.
    pub fn replace(&self, params: MotionParams) -> u64 {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.current.store(Arc::new(params));
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Apply `f` to a copy of the current parameters and publish the result.
    ///
    /// Nothing is published when `f` fails.
    pub fn update<F>(&self, f: F) -> Result<u64, ParamError>
    where
        F: FnOnce(&mut MotionParams) -> Result<(), ParamError>,
    {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = MotionParams::clone(&self.current.load());
        f(&mut next)?;
        self.current.store(Arc::new(next));
        Ok(self.version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Set one parameter by name.  Returns the new version.
    pub fn set(&self, name: &str, value: &str) -> Result<u64, ParamError> {
        let version = self.update(|p| p.set_field(name, value))?;
        info!(param = name, value, version, "parameter updated");
        Ok(version)
    }
}
