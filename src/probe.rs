//! Capability Prober
//!
//! Answers yes/no capability questions by running trivial marker commands
//! through the full escalation chain, service bridge included.

use crate::escalation::PrivilegedExecutor;
use rootlink_shared::{looks_like_tool_failure, timing, Command, DeviceRef, ExecResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Probe commands and the tokens that prove them
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Token echoed by the privileged probe
    pub root_token: String,
    /// Helper utility checked by the helper probe
    pub helper_path: String,
    /// Lower-case text the helper prints about itself
    pub helper_token: String,
    /// Budget for each probe command
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            root_token: "ROOT_OK".into(),
            helper_path: "/system/xbin/resetprop".into(),
            helper_token: "resetprop".into(),
            timeout: timing::PROBE_TIMEOUT,
        }
    }
}

/// Outcome of a probe, with the deciding attempt's text kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub present: bool,
    pub result: ExecResult,
}

/// Both preflight answers for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub privileged: ProbeReport,
    pub helper: ProbeReport,
}

impl Preflight {
    pub fn ready(&self) -> bool {
        self.privileged.present && self.helper.present
    }
}

pub struct CapabilityProber {
    executor: Arc<PrivilegedExecutor>,
    config: ProbeConfig,
}

impl CapabilityProber {
    pub fn new(executor: Arc<PrivilegedExecutor>, config: ProbeConfig) -> Self {
        Self { executor, config }
    }

    /// Is privileged execution available on this device?
    pub async fn privileged(&self, device: &DeviceRef) -> ProbeReport {
        let command = Command::new(format!("echo {}", self.config.root_token), self.config.timeout);
        let result = self.executor.execute(device, &command).await;
        let present = result.text.contains(&self.config.root_token);

        if present {
            info!("[PROBE] {} privileged execution available", device);
        } else {
            warn!(
                "[PROBE] {} privileged execution unavailable: {}",
                device,
                result.trimmed()
            );
        }
        ProbeReport { present, result }
    }

    /// Is the helper utility installed and working?
    ///
    /// The helper exits non-zero after printing its version, so the status
    /// is ignored. The text must name the helper and must not be a shell
    /// error about it.
    pub async fn helper(&self, device: &DeviceRef) -> ProbeReport {
        let command = Command::new(
            format!("{} --version", self.config.helper_path),
            self.config.timeout,
        );
        let result = self.executor.execute(device, &command).await;
        let present = result
            .text
            .to_lowercase()
            .contains(&self.config.helper_token.to_lowercase())
            && !looks_like_tool_failure(&result.text);

        if present {
            info!("[PROBE] {} helper {} present", device, self.config.helper_path);
        } else {
            warn!("[PROBE] {} helper {} missing", device, self.config.helper_path);
        }
        ProbeReport { present, result }
    }

    /// Run both probes
    pub async fn preflight(&self, device: &DeviceRef) -> Preflight {
        let privileged = self.privileged(device).await;
        let helper = self.helper(device).await;
        Preflight { privileged, helper }
    }
}
