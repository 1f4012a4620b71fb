//! Utility re-exports for the rover.
//!
//! - `command`: command values and the text parser for both transports
//! - `config`: compile-time limits and defaults
//! - `connection`: HTTP + WebSocket server feeding the command bus
//! - `controllers`: command queue, motor controller and control loop

pub mod command;
pub mod config;
pub mod connection;
pub mod controllers;

pub use command::{parser, PidConfig, RoverCommand, RoverError, SpeedCommand, TankCommand};
pub use connection::server::run as http;
pub use controllers::{RoverController, COMMAND_BUS};
