//! Rover command values.
//!
//! Both transports produce a [`RoverCommand`]; only the `Tank` variant is
//! buffered, `Halt` and `Pid` take the out-of-band paths on the command bus.

pub mod parser;

/// Errors raised along the command pipeline.
///
/// The first three are reported back to the originating transport; the
/// others stay on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoverError {
    /// Null, empty, missing or out-of-range input.
    #[error("bad command")]
    BadInput,
    /// Malformed `cmd(...)` envelope.
    #[error("malformed wrapped command")]
    ParseFailure,
    /// The command queue is at capacity; the command was dropped.
    #[error("command queue is full")]
    QueueFull,
    /// Nothing to dequeue.
    #[error("command queue is empty")]
    QueueEmpty,
    /// Motion requested before wheels were attached.
    #[error("wheels are not attached")]
    NotAttached,
}

impl RoverError {
    /// Negative status code carried in HTTP/socket replies.
    pub const fn status(self) -> i32 {
        match self {
            RoverError::BadInput => -1,
            RoverError::ParseFailure => -2,
            RoverError::QueueFull => -3,
            RoverError::QueueEmpty => -4,
            RoverError::NotAttached => -5,
        }
    }
}

/// Direction and magnitude for a single wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpeedCommand {
    pub forward: bool,
    pub value: f32,
}

impl SpeedCommand {
    pub const fn new(forward: bool, value: f32) -> Self {
        Self { forward, value }
    }
}

/// One drive instruction for both wheels.
///
/// With `use_speed_control` the wheels are driven toward `value` as a target
/// speed; otherwise `value` is applied directly as a duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TankCommand {
    pub use_speed_control: bool,
    pub left: SpeedCommand,
    pub right: SpeedCommand,
}

impl TankCommand {
    pub const fn new(use_speed_control: bool, left: SpeedCommand, right: SpeedCommand) -> Self {
        Self {
            use_speed_control,
            left,
            right,
        }
    }

    /// Open-loop command with both wheels at zero.
    pub const fn stopped() -> Self {
        Self::new(false, SpeedCommand::new(true, 0.0), SpeedCommand::new(true, 0.0))
    }
}

/// Gain set for closed-loop wheel speed control.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidConfig {
    /// Maximum measured wheel speed.
    pub max_speed: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidConfig {
    pub const fn new(max_speed: f32, kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            max_speed,
            kp,
            ki,
            kd,
        }
    }
}

/// Any command a transport can submit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RoverCommand {
    #[default]
    Noop,
    Halt,
    Tank(TankCommand),
    Pid(PidConfig),
}
