//! Bounded FIFO between the transports and the control loop.
//!
//! Producers and the consumer never wait on each other: a full queue rejects
//! the new command and an empty queue returns immediately.

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, TryReceiveError, TrySendError},
};

use crate::utils::command::{RoverError, TankCommand};

/// Fixed-capacity queue of drive commands, stored by value.
pub struct CommandQueue<M: RawMutex, const N: usize> {
    channel: Channel<M, TankCommand, N>,
}

impl<M: RawMutex, const N: usize> CommandQueue<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Append a command. A full queue drops `command`, keeping older entries.
    pub fn enqueue(&self, command: TankCommand) -> Result<(), RoverError> {
        self.channel
            .try_send(command)
            .map_err(|TrySendError::Full(_)| RoverError::QueueFull)
    }

    /// Remove and return the oldest command.
    pub fn dequeue(&self) -> Result<TankCommand, RoverError> {
        self.channel
            .try_receive()
            .map_err(|TryReceiveError::Empty| RoverError::QueueEmpty)
    }

    /// Discard every pending command, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.channel.try_receive().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<M: RawMutex, const N: usize> Default for CommandQueue<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
