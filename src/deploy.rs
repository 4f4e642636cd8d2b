//! Script Deployer
//!
//! Pushes a host script with Unix line endings and runs it privileged.

use crate::channel::{Channel, Request};
use crate::escalation::PrivilegedExecutor;
use anyhow::{bail, Context, Result};
use rootlink_shared::wrapper::DEVICE_SHELL;
use rootlink_shared::{timing, Command, DeviceRef, ExecResult};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Budget for one file push
const PUSH_TIMEOUT: Duration = Duration::from_secs(60);

/// Replace CRLF with LF
pub fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

/// Push `local` to `remote` on the device with LF line endings
pub async fn push_script(
    channel: &dyn Channel,
    device: &DeviceRef,
    local: &Path,
    remote: &str,
) -> Result<()> {
    let bytes = tokio::fs::read(local)
        .await
        .with_context(|| format!("Failed to read {}", local.display()))?;

    let mut staged = tempfile::Builder::new()
        .prefix("rootlink-")
        .suffix(".lf")
        .tempfile()
        .context("Failed to create temporary file")?;
    staged
        .write_all(&normalize_line_endings(&bytes))
        .and_then(|_| staged.flush())
        .context("Failed to write temporary file")?;

    debug!("[DEPLOY] staged {} at {}", local.display(), staged.path().display());

    let reply = channel
        .send(
            device,
            &Request::Push {
                local: staged.path().to_path_buf(),
                remote: remote.to_string(),
            },
            PUSH_TIMEOUT,
        )
        .await;
    if !reply.success() {
        bail!("push {} -> {} failed: {}", local.display(), remote, reply.trimmed());
    }

    info!("[DEPLOY] {} -> {}", local.display(), remote);
    Ok(())
}

/// Shell line running a pushed script with quoted arguments
pub fn script_command(remote: &str, args: &[String]) -> Result<String> {
    let mut words = vec![DEVICE_SHELL.to_string(), remote.to_string()];
    words.extend(args.iter().cloned());
    shlex::try_join(words.iter().map(String::as_str)).context("Script arguments cannot be quoted")
}

/// Run a pushed script through the privileged executor
pub async fn run_script(
    executor: &PrivilegedExecutor,
    device: &DeviceRef,
    remote: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<ExecResult> {
    let line = script_command(remote, args)?;
    let command = Command::new(line, timeout.unwrap_or(timing::SCRIPT_TIMEOUT));
    info!("[DEPLOY] running {} on {}", remote, device);
    Ok(executor.execute(device, &command).await)
}
