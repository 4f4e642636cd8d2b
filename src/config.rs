//! Runtime configuration
//!
//! Defaults live on each component's config struct; `ROOTLINK_*`
//! environment variables override them and CLI flags override both.

use crate::bridge::BridgeConfig;
use crate::escalation::PrivilegeConfig;
use crate::probe::ProbeConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Aggregated configuration for one run
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Explicit adb executable; located automatically when unset
    pub adb: Option<PathBuf>,
    /// Budget for `exec` and `run` commands; per-command default when unset
    pub timeout: Option<Duration>,
    pub privilege: PrivilegeConfig,
    pub bridge: BridgeConfig,
    pub probe: ProbeConfig,
}

impl AppConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(adb) = lookup("ROOTLINK_ADB") {
            config.adb = Some(PathBuf::from(adb));
        }

        if let Some(service) = lookup("ROOTLINK_SERVICE") {
            config.set_service(&service);
        }

        if let Some(dir) = lookup("ROOTLINK_SCRATCH_DIR") {
            config.set_scratch_dir(&dir);
        }

        if let Some(su) = lookup("ROOTLINK_SU_PATH") {
            config.privilege.renamed_binary = su;
        }

        if let Some(helper) = lookup("ROOTLINK_HELPER") {
            config.probe.helper_token = helper_token(&helper);
            config.probe.helper_path = helper;
        }

        if let Some(raw) = lookup("ROOTLINK_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Some(Duration::from_secs(secs)),
                _ => warn!("Ignoring ROOTLINK_TIMEOUT_SECS={:?}: not a positive integer", raw),
            }
        }

        config
    }

    /// Use a different init service; the wrapper path follows its name
    pub fn set_service(&mut self, service: &str) {
        self.bridge.service = service.to_string();
        self.bridge.script_path = format!(
            "{}/{}_boot.sh",
            self.bridge.scratch_dir.trim_end_matches('/'),
            service
        );
    }

    /// Move every scratch file to `dir`
    pub fn set_scratch_dir(&mut self, dir: &str) {
        let dir = dir.trim_end_matches('/');
        self.bridge.scratch_dir = dir.to_string();
        self.privilege.scratch_dir = dir.to_string();
        self.bridge.script_path = format!("{}/{}_boot.sh", dir, self.bridge.service);
    }
}

/// Identifying token for a helper binary: its file name, lower-cased
fn helper_token(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_lowercase()
}
