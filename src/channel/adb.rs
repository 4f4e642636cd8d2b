//! ADB channel implementation

use crate::channel::traits::{Channel, HostRequest, Request};
use async_trait::async_trait;
use rootlink_shared::{DeviceRef, ExecResult, STATUS_CHANNEL_ERROR};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Channel that shells out to an `adb` executable
#[derive(Debug, Clone)]
pub struct AdbChannel {
    exe: PathBuf,
}

impl AdbChannel {
    /// Create a channel for the given adb executable
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Path of the adb executable in use
    pub fn exe(&self) -> &Path {
        &self.exe
    }

    async fn run(&self, args: Vec<OsString>, budget: Duration) -> ExecResult {
        debug!("[ADB] {} {:?}", self.exe.display(), args);

        let mut cmd = Command::new(&self.exe);
        // A timed-out request must not leave a local adb process behind
        cmd.kill_on_drop(true);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match timeout(budget, cmd.output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                // Killed by a signal: no exit code to report
                let status = output.status.code().unwrap_or(STATUS_CHANNEL_ERROR);
                ExecResult::new(text, status)
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                warn!("[ADB] executable not found: {}", self.exe.display());
                ExecResult::channel_error(format!(
                    "ADB executable not found: {}",
                    self.exe.display()
                ))
            }
            Ok(Err(e)) => {
                warn!("[ADB] failed to run {}: {}", self.exe.display(), e);
                ExecResult::channel_error(format!("Failed to run {}: {}", self.exe.display(), e))
            }
            Err(_) => {
                warn!("[ADB] request exceeded {:?}", budget);
                ExecResult::timeout("TIMEOUT")
            }
        }
    }
}

/// Build the adb argument vector for a device request
pub fn device_args(device: &DeviceRef, request: &Request) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-s".into(), device.as_str().into()];
    match request {
        Request::Shell(command) => {
            args.push("shell".into());
            args.push(command.into());
        }
        Request::Push { local, remote } => {
            args.push("push".into());
            args.push(local.as_os_str().to_owned());
            args.push(remote.into());
        }
        Request::SetProperty { key, value } => {
            args.push("shell".into());
            args.push(format!("setprop {} {}", key, value).into());
        }
    }
    args
}

/// Build the adb argument vector for a host request
pub fn host_args(request: &HostRequest) -> Vec<OsString> {
    match request {
        HostRequest::ListDevices => vec!["devices".into()],
        HostRequest::Connect(addr) => vec!["connect".into(), addr.into()],
    }
}

#[async_trait]
impl Channel for AdbChannel {
    async fn send(&self, device: &DeviceRef, request: &Request, budget: Duration) -> ExecResult {
        self.run(device_args(device, request), budget).await
    }

    async fn host(&self, request: &HostRequest, budget: Duration) -> ExecResult {
        self.run(host_args(request), budget).await
    }

    fn name(&self) -> &'static str {
        "adb"
    }
}
