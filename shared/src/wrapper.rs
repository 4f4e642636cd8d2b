//! Service-bridge workspace and wrapper script
//!
//! The init service executes one fixed script path. Each bridge job stages
//! a fresh wrapper there that runs the caller's command, records its output
//! and exit code in job-specific files, then parks so the init manager's
//! automatic restart does not run the payload a second time.

use std::fmt;

/// Shell used on the device for every wrapper
pub const DEVICE_SHELL: &str = "/system/bin/sh";

/// Identifier namespacing one bridge job's scratch files
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Wrap an identifier; anything outside `[A-Za-z0-9_-]` is dropped
    /// so the id is always safe inside an unquoted path
    pub fn new(raw: impl AsRef<str>) -> Self {
        let cleaned: String = raw
            .as_ref()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        Self(cleaned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-device files used by one bridge job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Directory holding every job's files
    pub scratch_dir: String,
    /// Appears when the job finishes; holds the exit code
    pub done_marker: String,
    /// Combined stdout/stderr of the job
    pub log: String,
    /// base64 text while the wrapper is being transferred
    pub staging: String,
    /// Executable the init service runs (fixed by the service definition)
    pub script: String,
}

impl Workspace {
    /// Lay out job files under `scratch_dir`; `script` is shared by all jobs
    pub fn for_job(scratch_dir: &str, script: &str, job: &JobId) -> Self {
        let dir = scratch_dir.trim_end_matches('/');
        Self {
            scratch_dir: dir.to_string(),
            done_marker: format!("{dir}/.rootlink_{job}.done"),
            log: format!("{dir}/.rootlink_{job}.log"),
            staging: format!("{dir}/.rootlink_{job}.b64"),
            script: script.to_string(),
        }
    }

    /// Shell command removing job files left in the scratch directory,
    /// including ones from runs that never drained.
    ///
    /// Only safe while the device's bridge lock is held.
    pub fn clear_command(&self) -> String {
        format!(
            "rm -f {dir}/.rootlink_*.done {dir}/.rootlink_*.log {dir}/.rootlink_*.b64",
            dir = self.scratch_dir
        )
    }

    /// Shell command printing the marker, silent if absent
    pub fn read_marker_command(&self) -> String {
        format!("cat {} 2>/dev/null", self.done_marker)
    }

    /// Shell command printing the log, silent if absent
    pub fn read_log_command(&self) -> String {
        format!("cat {} 2>/dev/null", self.log)
    }

    /// Shell command writing one staged chunk
    pub fn stage_command(&self, chunk: &str, first: bool) -> String {
        let redirect = if first { ">" } else { ">>" };
        format!("echo '{}' {} {}", chunk, redirect, self.staging)
    }

    /// Shell command turning staged base64 into the executable wrapper
    pub fn install_command(&self) -> String {
        format!(
            "base64 -d {staging} > {script} && chmod 755 {script}; _rc=$?; rm -f {staging}; exit $_rc",
            staging = self.staging,
            script = self.script,
        )
    }
}

/// Build the wrapper the init service will execute for `command`
pub fn compose_wrapper(command: &str, workspace: &Workspace, park_secs: u64) -> String {
    format!(
        "#!{shell}\n\
         rm -f {marker}\n\
         (\n\
         {command}\n\
         ) > {log} 2>&1\n\
         _rc=$?\n\
         echo $_rc > {marker}\n\
         chmod 666 {log} {marker}\n\
         sleep {park_secs}\n",
        shell = DEVICE_SHELL,
        marker = workspace.done_marker,
        log = workspace.log,
    )
}

/// Parse the completion marker; only a bare exit code counts.
///
/// Anything else (empty reply, a shell error from the channel, a marker
/// caught mid-write) means the job has not finished yet.
pub fn parse_marker(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> Workspace {
        Workspace::for_job(
            "/data/local/tmp/",
            "/data/local/tmp/rootlink_boot.sh",
            &JobId::new("a1b2c3"),
        )
    }

    #[test]
    fn test_job_files_are_namespaced() {
        let ws = workspace();
        assert_eq!(ws.done_marker, "/data/local/tmp/.rootlink_a1b2c3.done");
        assert_eq!(ws.log, "/data/local/tmp/.rootlink_a1b2c3.log");
        assert_eq!(ws.staging, "/data/local/tmp/.rootlink_a1b2c3.b64");
        assert_eq!(ws.script, "/data/local/tmp/rootlink_boot.sh");

        let other = Workspace::for_job("/data/local/tmp", &ws.script, &JobId::new("ffff"));
        assert_ne!(other.done_marker, ws.done_marker);
        assert_eq!(other.script, ws.script);
    }

    #[test]
    fn test_clear_sweeps_every_job() {
        let ws = workspace();
        assert_eq!(
            ws.clear_command(),
            "rm -f /data/local/tmp/.rootlink_*.done /data/local/tmp/.rootlink_*.log /data/local/tmp/.rootlink_*.b64"
        );
        assert!(!ws.clear_command().contains(&ws.script));
    }

    #[test]
    fn test_job_id_is_path_safe() {
        assert_eq!(JobId::new("ab/../c d;e").as_str(), "abcde");
    }

    #[test]
    fn test_wrapper_layout() {
        let ws = workspace();
        let script = compose_wrapper("echo ROOT_OK", &ws, 86_400);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/system/bin/sh");
        assert_eq!(lines[1], format!("rm -f {}", ws.done_marker));
        assert_eq!(lines[2], "(");
        assert_eq!(lines[3], "echo ROOT_OK");
        assert_eq!(lines[4], format!(") > {} 2>&1", ws.log));
        assert_eq!(lines[5], "_rc=$?");
        assert_eq!(lines[6], format!("echo $_rc > {}", ws.done_marker));
        assert_eq!(lines[7], format!("chmod 666 {} {}", ws.log, ws.done_marker));
        assert_eq!(lines[8], "sleep 86400");
    }

    #[test]
    fn test_stage_commands_overwrite_then_append() {
        let ws = workspace();
        assert_eq!(
            ws.stage_command("QUJD", true),
            format!("echo 'QUJD' > {}", ws.staging)
        );
        assert_eq!(
            ws.stage_command("REVG", false),
            format!("echo 'REVG' >> {}", ws.staging)
        );
    }

    #[test]
    fn test_marker_parsing() {
        assert_eq!(parse_marker("0\n"), Some(0));
        assert_eq!(parse_marker(" 127 "), Some(127));
        assert_eq!(parse_marker(""), None);
        assert_eq!(parse_marker("cat: /x: Permission denied"), None);
        assert_eq!(parse_marker("-1"), None);
    }
}
