//! Module Exports
//!
//! This file exports the command pipeline between the transports and the
//! wheels.
//!
//! - `queue`: bounded FIFO of drive commands
//! - `motor`: tank-drive controller over two borrowed wheel handles
//! - `speed`: PID gain storage and the discrete PID step
//! - `hbridge`: PWM H-bridge wheel implementing `DriveWheel`
//! - `telemetry`: change-only encoder logging (feature `encoders`)

pub mod hbridge;
pub mod motor;
pub mod queue;
pub mod speed;
#[cfg(feature = "encoders")]
pub mod telemetry;

use embassy_sync::{
    blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex},
    signal::Signal,
};
use embassy_time::{Duration, Ticker};

pub use hbridge::HBridgeWheel;
pub use motor::{DriveWheel, MotorController, WheelState};
pub use queue::CommandQueue;
pub use speed::{PidController, SpeedControlConfig};

use crate::utils::{
    command::{parser, PidConfig, RoverCommand, RoverError, TankCommand},
    config::{COMMAND_QUEUE_CAPACITY, CONTROL_LOOP_HZ},
};

/// Status reported for an accepted command.
pub const SUCCESS: i32 = 0;

/// Shared hand-off between the network tasks and the control loop.
pub static COMMAND_BUS: CommandBus<CriticalSectionRawMutex, COMMAND_QUEUE_CAPACITY> =
    CommandBus::new();

/// Outcome of a text command submitted on the socket channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmitCommandResult {
    /// [`SUCCESS`] or the negative [`RoverError::status`].
    pub status: i32,
    /// Client id from a wrapped command.
    pub id: Option<u32>,
    pub command: RoverCommand,
}

impl SubmitCommandResult {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS
    }
}

/// Drive commands are queued; halt and gain updates bypass the queue.
pub struct CommandBus<M: RawMutex, const N: usize> {
    queue: CommandQueue<M, N>,
    halt: Signal<M, ()>,
    gains: Signal<M, PidConfig>,
}

impl<M: RawMutex, const N: usize> CommandBus<M, N> {
    pub const fn new() -> Self {
        Self {
            queue: CommandQueue::new(),
            halt: Signal::new(),
            gains: Signal::new(),
        }
    }

    pub fn queue(&self) -> &CommandQueue<M, N> {
        &self.queue
    }

    /// Route a parsed command. Only a full queue can fail.
    ///
    /// A halt drains the queue here, so drive commands accepted after it are
    /// kept and executed once the wheels have stopped.
    pub fn submit(
        &self,
        command: RoverCommand,
    ) -> Result<(), RoverError> {
        match command {
            RoverCommand::Noop => Ok(()),
            RoverCommand::Halt => {
                let dropped = self.queue.clear();
                tracing::info!(dropped, "halt requested");
                self.halt.signal(());
                Ok(())
            }
            RoverCommand::Tank(tank) => self.queue.enqueue(tank),
            RoverCommand::Pid(gains) => {
                self.gains.signal(gains);
                Ok(())
            }
        }
    }

    /// Submit an open-loop direction/speed pair (the `/rover` query).
    pub fn submit_turtle_command(
        &self,
        direction: Option<&str>,
        speed: Option<&str>,
    ) -> Result<RoverCommand, RoverError> {
        let command = parser::parse_turtle(direction, speed, false)?;
        self.submit(command)?;
        Ok(command)
    }

    /// Submit raw socket text, either turtle (`forward,100`) or wrapped
    /// (`cmd(1,tank(...))`).
    pub fn submit_tank_command(
        &self,
        raw: &str,
    ) -> SubmitCommandResult {
        let parsed = if parser::is_wrapped(raw) {
            parser::parse_wrapped(raw).map(|wrapped| (Some(wrapped.id), wrapped.command))
        } else {
            parser::parse(raw).map(|command| (None, command))
        };

        let (id, command) = match parsed {
            Ok(parsed) => parsed,
            Err(error) => {
                return SubmitCommandResult {
                    status: error.status(),
                    id: None,
                    command: RoverCommand::Noop,
                }
            }
        };

        let status = match self.submit(command) {
            Ok(()) => SUCCESS,
            Err(error) => error.status(),
        };
        SubmitCommandResult {
            status,
            id,
            command,
        }
    }

    /// Next queued drive command, consumed once per loop iteration.
    pub fn dequeue_next_command(&self) -> Result<TankCommand, RoverError> {
        self.queue.dequeue()
    }

    /// Consume a pending halt request.
    pub fn take_halt(&self) -> bool {
        self.halt.try_take().is_some()
    }

    /// Consume the most recent gain update, if any.
    pub fn take_gains(&self) -> Option<PidConfig> {
        self.gains.try_take()
    }
}

impl<M: RawMutex, const N: usize> Default for CommandBus<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The control loop: drains the bus into the motor controller.
pub struct RoverController<'a, W, M: RawMutex, const N: usize> {
    bus: &'a CommandBus<M, N>,
    pub motors: MotorController<'a, W, M, N>,
}

impl<'a, W, M, const N: usize> RoverController<'a, W, M, N>
where
    W: DriveWheel,
    M: RawMutex,
{
    /// Create a controller whose wheels still need attaching.
    pub fn new(bus: &'a CommandBus<M, N>) -> Self {
        Self {
            bus,
            motors: MotorController::new(bus.queue()),
        }
    }

    /// One loop iteration. Returns the drive command executed, if any.
    pub fn poll(&mut self) -> Option<TankCommand> {
        if self.bus.take_halt() {
            self.motors.stop_wheels();
        }
        if let Some(gains) = self.bus.take_gains() {
            self.motors.set_speed_control(gains);
        }
        self.motors.regulate();

        let executed = match self.bus.dequeue_next_command() {
            Ok(command) => match self.motors.execute(&command) {
                Ok(()) => Some(command),
                Err(error) => {
                    tracing::warn!(?error, ?command, "dropping drive command");
                    None
                }
            },
            Err(_) => None,
        };

        #[cfg(feature = "encoders")]
        self.motors.log_wheel_encoders();

        executed
    }

    /// Poll forever at `CONTROL_LOOP_HZ`.
    pub async fn run(&mut self) -> ! {
        tracing::info!("Control loop started: {}Hz", CONTROL_LOOP_HZ);
        let mut ticker = Ticker::every(Duration::from_hz(CONTROL_LOOP_HZ));
        loop {
            self.poll();
            ticker.next().await;
        }
    }
}
