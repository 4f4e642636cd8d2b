//! rootlink Shared Types
//!
//! This crate provides the execution model shared by the escalation chain,
//! the service bridge and the CLI: results, the response classifier, report
//! parsing, the chunked transfer codec and the bridge state machine.

pub mod classify;
pub mod outcome;
pub mod report;
pub mod state_machine;
pub mod transfer;
pub mod wrapper;

use std::fmt;
use std::time::Duration;

pub use classify::{classify, looks_like_payload_output, looks_like_tool_failure, Classification};
pub use outcome::{assess, ExecError};
pub use report::ReportOutcome;

/// Status reported when the channel call itself could not complete
pub const STATUS_CHANNEL_ERROR: i32 = -1;

/// Status reported when no answer arrived within the timeout budget
pub const STATUS_TIMEOUT: i32 = -2;

/// Timing and sizing parameters for device communication
pub mod timing {
    use std::time::Duration;

    /// Default budget for a plain shell request
    pub const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

    /// Budget for running a full payload script
    pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Budget for capability probes
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Budget for a service-bridge probe job (start, run, poll)
    pub const PROBE_BRIDGE_TIMEOUT: Duration = Duration::from_secs(15);

    /// Budget for service control and small bookkeeping requests
    pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

    /// Budget for decoding the staged wrapper on the device
    pub const DECODE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Delay after stopping the service before touching its files
    pub const SETTLE_DELAY: Duration = Duration::from_millis(300);

    /// Interval between completion-marker polls
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Maximum base64 characters written per shell request
    pub const CHUNK_SIZE: usize = 4000;

    /// How long the wrapper parks after the payload exits (one day)
    pub const PARK_SECS: u64 = 86_400;
}

/// Opaque identifier of a device on the control channel (serial or address)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRef(String);

impl DeviceRef {
    /// Create a device reference from a serial or address
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// The serial as passed to the channel
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceRef {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}

impl From<String> for DeviceRef {
    fn from(serial: String) -> Self {
        Self(serial)
    }
}

/// A command to run with elevated privileges, plus its time budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    pub timeout: Duration,
}

impl Command {
    /// Create a command with an explicit timeout
    pub fn new(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            timeout,
        }
    }

    /// Create a command with the default shell timeout
    pub fn shell(text: impl Into<String>) -> Self {
        Self::new(text, timing::SHELL_TIMEOUT)
    }
}

/// Combined output text and status of one channel request or privileged run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub text: String,
    pub status: i32,
}

impl ExecResult {
    /// Create a result from text and status
    pub fn new(text: impl Into<String>, status: i32) -> Self {
        Self {
            text: text.into(),
            status,
        }
    }

    /// A result for a transport call that could not complete
    pub fn channel_error(text: impl Into<String>) -> Self {
        Self::new(text, STATUS_CHANNEL_ERROR)
    }

    /// A result for a request that exceeded its budget
    pub fn timeout(text: impl Into<String>) -> Self {
        Self::new(text, STATUS_TIMEOUT)
    }

    /// Check if the status is zero
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Check if the status is the timeout sentinel
    pub fn timed_out(&self) -> bool {
        self.status == STATUS_TIMEOUT
    }

    /// Text with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}
