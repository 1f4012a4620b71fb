//! Differential (tank) drive over two externally owned wheel handles.
//!
//! The controller never owns the wheels. It borrows them through `RefCell`
//! references between `attach` and `detach` and refuses motion while
//! detached.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{queue::CommandQueue, speed::SpeedControlConfig};
#[cfg(feature = "encoders")]
use super::telemetry::{EncoderChanges, EncoderTelemetry};
use crate::utils::{
    command::{PidConfig, RoverError, SpeedCommand, TankCommand},
    config::MAX_PWM,
};

/// Actuation primitives of a single wheel.
pub trait DriveWheel {
    type Error: core::fmt::Debug;

    /// Open-loop drive at a fixed duty. Disables closed-loop control.
    fn set_power(
        &mut self,
        forward: bool,
        power: u8,
    ) -> Result<(), Self::Error>;

    /// Closed-loop drive toward a target speed. Enables closed-loop control.
    fn set_speed(
        &mut self,
        forward: bool,
        speed: f32,
        gains: &PidConfig,
    ) -> Result<(), Self::Error>;

    /// Raw, monotonic encoder count.
    fn read_encoder_count(&mut self) -> u32;

    /// One closed-loop step, called once per control loop iteration.
    fn regulate(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Last direction and magnitude sent to a wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelState {
    pub forward: bool,
    pub value: f32,
    pub closed_loop: bool,
}

impl WheelState {
    pub const fn stopped() -> Self {
        Self {
            forward: true,
            value: 0.0,
            closed_loop: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.value == 0.0 && !self.closed_loop
    }
}

impl Default for WheelState {
    fn default() -> Self {
        Self::stopped()
    }
}

struct WheelPair<'a, W> {
    left: &'a RefCell<W>,
    right: &'a RefCell<W>,
}

/// Applies tank commands to a left/right wheel pair.
pub struct MotorController<'a, W, M: RawMutex, const N: usize> {
    queue: &'a CommandQueue<M, N>,
    wheels: Option<WheelPair<'a, W>>,
    left: WheelState,
    right: WheelState,
    speed_control: SpeedControlConfig,
    #[cfg(feature = "encoders")]
    telemetry: EncoderTelemetry,
}

impl<'a, W, M, const N: usize> MotorController<'a, W, M, N>
where
    W: DriveWheel,
    M: RawMutex,
{
    /// Create a detached controller; `halt` drains `queue`.
    pub fn new(queue: &'a CommandQueue<M, N>) -> Self {
        Self {
            queue,
            wheels: None,
            left: WheelState::stopped(),
            right: WheelState::stopped(),
            speed_control: SpeedControlConfig::new(),
            #[cfg(feature = "encoders")]
            telemetry: EncoderTelemetry::new(),
        }
    }

    pub fn attached(&self) -> bool {
        self.wheels.is_some()
    }

    /// Bind the wheel handles. Attaching again re-binds to the new handles.
    pub fn attach(
        &mut self,
        left: &'a RefCell<W>,
        right: &'a RefCell<W>,
    ) -> &mut Self {
        if self.wheels.is_some() {
            tracing::info!("re-attaching wheels");
        }
        self.wheels = Some(WheelPair { left, right });
        self
    }

    /// Release the wheel handles. No-op when already detached.
    pub fn detach(&mut self) -> &mut Self {
        if self.wheels.take().is_some() {
            tracing::info!("wheels detached");
        }
        self
    }

    /// Replace the gain set used by the next closed-loop command.
    pub fn set_speed_control(
        &mut self,
        gains: PidConfig,
    ) -> &mut Self {
        tracing::info!(?gains, "speed control gains replaced");
        self.speed_control.replace(gains);
        self
    }

    pub fn speed_control(&self) -> &SpeedControlConfig {
        &self.speed_control
    }

    pub fn left_state(&self) -> WheelState {
        self.left
    }

    pub fn right_state(&self) -> WheelState {
        self.right
    }

    /// Drive both wheels according to `command`.
    pub fn execute(
        &mut self,
        command: &TankCommand,
    ) -> Result<(), RoverError> {
        let wheels = self.wheels.as_ref().ok_or(RoverError::NotAttached)?;
        let gains = self.speed_control.gains();
        tracing::debug!(?command, "executing tank command");

        drive_wheel(
            "left",
            wheels.left,
            &mut self.left,
            command.use_speed_control,
            command.left,
            &gains,
        );
        drive_wheel(
            "right",
            wheels.right,
            &mut self.right,
            command.use_speed_control,
            command.right,
            &gains,
        );
        Ok(())
    }

    /// Stop immediately: drop every queued command, zero both wheels and
    /// disengage closed-loop control.
    pub fn halt(&mut self) -> &mut Self {
        let dropped = self.queue.clear();
        tracing::info!(dropped, "halt");
        self.stop_wheels()
    }

    /// Zero both wheels without touching the queue.
    ///
    /// A wheel that refuses the stop keeps its previous state.
    pub fn stop_wheels(&mut self) -> &mut Self {
        let Some(wheels) = self.wheels.as_ref() else {
            return self;
        };
        for (name, wheel, state) in [
            ("left", wheels.left, &mut self.left),
            ("right", wheels.right, &mut self.right),
        ] {
            match wheel.borrow_mut().set_power(true, 0) {
                Ok(()) => *state = WheelState::stopped(),
                Err(error) => tracing::error!(wheel = name, ?error, "failed to stop wheel"),
            }
        }
        self
    }

    /// Run the closed-loop step of every wheel under speed control.
    pub fn regulate(&mut self) {
        let Some(wheels) = self.wheels.as_ref() else {
            return;
        };
        for (name, wheel, state) in [
            ("left", wheels.left, &self.left),
            ("right", wheels.right, &self.right),
        ] {
            if !state.closed_loop {
                continue;
            }
            if let Err(error) = wheel.borrow_mut().regulate() {
                tracing::error!(wheel = name, ?error, "speed regulation failed");
            }
        }
    }

    /// Latest left encoder count, or `None` while detached.
    pub fn read_left_wheel_encoder(&self) -> Option<u32> {
        self.wheels
            .as_ref()
            .map(|wheels| wheels.left.borrow_mut().read_encoder_count())
    }

    /// Latest right encoder count, or `None` while detached.
    pub fn read_right_wheel_encoder(&self) -> Option<u32> {
        self.wheels
            .as_ref()
            .map(|wheels| wheels.right.borrow_mut().read_encoder_count())
    }

    /// Read both encoders and log whichever count changed.
    #[cfg(feature = "encoders")]
    pub fn log_wheel_encoders(&mut self) -> EncoderChanges {
        let left = self.read_left_wheel_encoder();
        let right = self.read_right_wheel_encoder();
        self.telemetry.log_changes(left, right)
    }
}

fn drive_wheel<W: DriveWheel>(
    name: &str,
    wheel: &RefCell<W>,
    state: &mut WheelState,
    use_speed_control: bool,
    command: SpeedCommand,
    gains: &PidConfig,
) {
    let mut wheel = wheel.borrow_mut();
    let result = if use_speed_control {
        wheel.set_speed(command.forward, command.value, gains)
    } else {
        wheel.set_power(command.forward, duty(command.value))
    };

    match result {
        Ok(()) => {
            *state = WheelState {
                forward: command.forward,
                value: command.value,
                closed_loop: use_speed_control,
            };
        }
        Err(error) => tracing::error!(wheel = name, ?error, "wheel command failed"),
    }
}

fn duty(value: f32) -> u8 {
    value.clamp(0.0, f32::from(MAX_PWM)) as u8
}
