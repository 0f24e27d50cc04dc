//! Discrete PID (Proportional–Integral–Derivative) controller.
//!
//! The controller runs once per control tick: the caller hands it the current
//! error and gets back a corrective output.  Integral and derivative are
//! per-tick sums and differences, so gains are tuned for a fixed loop rate.
//!
//! # Example
//!
//! ```rust
//! use strider_hal::pid::PidController;
//!
//! let mut pid = PidController::new(2.0, 0.0, 20.0);
//! pid.set_output_limits(-0.5, 0.5);
//!
//! let output = pid.update(0.1);
//! assert_eq!(output, 0.5); // 2·0.1 + 20·0.1 saturates
//! ```

/// A tunable per-tick PID controller.
///
/// Gains and output limits may change between ticks via
/// [`PidController::set_gains`] and [`PidController::set_output_limits`];
/// accumulated state is kept.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    integral: f32,
    prev_error: f32,
    output_min: f32,
    output_max: f32,
}

impl PidController {
    /// Create a new controller with the given gains.
    ///
    /// Output is unclamped by default (`f32::NEG_INFINITY` to `f32::INFINITY`).
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            prev_error: 0.0,
            output_min: f32::NEG_INFINITY,
            output_max: f32::INFINITY,
        }
    }

    pub fn set_gains(&mut self, kp: f32, ki: f32, kd: f32) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// Limit the output to `[min, max]`.
    ///
    /// The limits are applied as `max(min, min(max, raw))` and are not
    /// checked against each other.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Advance one tick with the current `error` and return the limited
    /// output.
    ///
    /// The error before the first tick is taken to be zero.
    pub fn update(&mut self, error: f32) -> f32 {
        self.integral += error;
        let derivative = error - self.prev_error;
        self.prev_error = error;

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;
        self.output_min.max(self.output_max.min(raw))
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Reset internal state (integral accumulator and derivative memory).
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }
}
