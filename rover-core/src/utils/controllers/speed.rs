//! Closed-loop speed control settings.

use crate::utils::command::{PidConfig, RoverError};

/// Holds the active PID gain set. Replacement is always wholesale.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedControlConfig {
    gains: Option<PidConfig>,
}

impl SpeedControlConfig {
    pub const fn new() -> Self {
        Self { gains: None }
    }

    /// Swap in a new gain set, returning the previous one.
    pub fn replace(
        &mut self,
        gains: PidConfig,
    ) -> Option<PidConfig> {
        self.gains.replace(gains)
    }

    /// Gains to hand to the wheels, or all-zero gains if none were set.
    pub fn gains(&self) -> PidConfig {
        self.gains.unwrap_or_default()
    }

    pub fn is_configured(&self) -> bool {
        self.gains.is_some()
    }
}

/// A simple discrete PID controller driven at a fixed period.
#[derive(Debug, Clone, Copy)]
pub struct PidController {
    gains: PidConfig,
    prev_err: f32,
    integral: f32,
    dt: f32,
}

impl PidController {
    /// `dt` is the step period in seconds and must be positive and finite.
    pub fn new(
        gains: PidConfig,
        dt: f32,
    ) -> Result<Self, RoverError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(RoverError::BadInput);
        }
        Ok(Self {
            gains,
            prev_err: 0.0,
            integral: 0.0,
            dt,
        })
    }

    pub fn period(&self) -> f32 {
        self.dt
    }

    /// Install new gains; history is reset so old error terms don't leak in.
    pub fn set_gains(
        &mut self,
        gains: PidConfig,
    ) {
        if self.gains != gains {
            self.gains = gains;
            self.reset();
        }
    }

    pub fn gains(&self) -> PidConfig {
        self.gains
    }

    /// Compute control output for the current error.
    pub fn update(
        &mut self,
        error: f32,
    ) -> f32 {
        self.integral += error * self.dt;
        let derivative = (error - self.prev_err) / self.dt;
        self.prev_err = error;
        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    /// Reset integrator and derivative history.
    pub fn reset(&mut self) {
        self.prev_err = 0.0;
        self.integral = 0.0;
    }
}
