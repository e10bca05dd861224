//! Per-session counters

use std::fmt;

/// Statistics for a single client session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub retunes: u64,
    pub retune_failures: u64,
    pub command_errors: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, len: usize) {
        self.frames_sent += 1;
        self.bytes_sent += len as u64;
    }

    pub fn record_retune(&mut self) {
        self.retunes += 1;
    }

    pub fn record_retune_failure(&mut self) {
        self.retune_failures += 1;
    }

    pub fn record_command_error(&mut self) {
        self.command_errors += 1;
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frames: {} ({} bytes) | Retunes: {} (failed: {}) | Command errors: {}",
            self.frames_sent,
            self.bytes_sent,
            self.retunes,
            self.retune_failures,
            self.command_errors
        )
    }
}
