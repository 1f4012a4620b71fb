//! Compile-time limits and defaults for the rover.

/// Number of drive commands buffered between the transports and the loop.
pub const COMMAND_QUEUE_CAPACITY: usize = 4;

/// Largest open-loop duty value a wheel accepts.
pub const MAX_PWM: u8 = 255;

/// Control loop frequency.
pub const CONTROL_LOOP_HZ: u64 = 50;

/// Default port for the HTTP server (also serves the `/ws` command socket).
pub const HTTP_PORT: u16 = 80;

/// Version of the `cmd(...)` grammar accepted on the command socket.
pub const WRAPPED_GRAMMAR_VERSION: u8 = 1;
