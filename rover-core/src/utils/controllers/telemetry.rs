//! Change-only wheel encoder logging.
//!
//! The loop polls the encoders every tick; a line is only emitted when a
//! wheel's count differs from the one last logged for it.

/// Counts that were logged by one [`EncoderTelemetry::log_changes`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderChanges {
    pub left: Option<u32>,
    pub right: Option<u32>,
}

impl EncoderChanges {
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderTelemetry {
    last_left: Option<u32>,
    last_right: Option<u32>,
}

impl EncoderTelemetry {
    pub const fn new() -> Self {
        Self {
            last_left: None,
            last_right: None,
        }
    }

    /// Log each reading that changed since it was last logged.
    ///
    /// `None` means the wheel could not be read (detached) and is skipped.
    pub fn log_changes(
        &mut self,
        left: Option<u32>,
        right: Option<u32>,
    ) -> EncoderChanges {
        let changes = EncoderChanges {
            left: changed(&mut self.last_left, left),
            right: changed(&mut self.last_right, right),
        };
        if let Some(count) = changes.left {
            tracing::debug!(count, "left wheel encoder");
        }
        if let Some(count) = changes.right {
            tracing::debug!(count, "right wheel encoder");
        }
        changes
    }
}

fn changed(
    last: &mut Option<u32>,
    reading: Option<u32>,
) -> Option<u32> {
    let count = reading?;
    if *last == Some(count) {
        return None;
    }
    *last = Some(count);
    Some(count)
}
