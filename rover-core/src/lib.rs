//! Command pipeline and tank-drive control for a two-wheel rover on no-std
//! embedded platforms.
//!
//! Motion commands arrive over HTTP or a WebSocket, are parsed, buffered in a
//! bounded queue and executed one per control-loop tick against two wheel
//! handles. For a host-side simulation, see `rover-app/mock-rover`.
#![no_std]

extern crate alloc;

#[cfg(test)]
use critical_section as _;

pub mod utils;
