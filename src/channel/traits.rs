//! Channel trait abstraction for pluggable device transports

use async_trait::async_trait;
use rootlink_shared::{DeviceRef, ExecResult};
use std::path::PathBuf;
use std::time::Duration;

/// A request addressed to one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Run a command in the device's unprivileged shell
    Shell(String),
    /// Copy a host file onto the device
    Push { local: PathBuf, remote: String },
    /// Set a system property (also how init services are started/stopped)
    SetProperty { key: String, value: String },
}

impl Request {
    pub fn shell(command: impl Into<String>) -> Self {
        Request::Shell(command.into())
    }

    pub fn set_property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Request::SetProperty {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A request to the channel host rather than a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Enumerate attached devices
    ListDevices,
    /// Attach a network device by `host:port`
    Connect(String),
}

/// Opaque request/response transport to devices.
///
/// Implementations never fail: a missing transport binary, a spawn error or
/// a timeout all come back as an [`ExecResult`] with a sentinel status and
/// explanatory text, so callers reason about every outcome the same way.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Execute one request against a device
    async fn send(&self, device: &DeviceRef, request: &Request, timeout: Duration) -> ExecResult;

    /// Execute one host-level request
    async fn host(&self, request: &HostRequest, timeout: Duration) -> ExecResult;

    /// Human-readable name for this channel
    fn name(&self) -> &'static str;
}
