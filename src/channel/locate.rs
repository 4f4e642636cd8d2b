//! Locating the adb executable on the host

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Budget for `adb version` when probing PATH
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Well-known install locations, in lookup order
fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    for var in ["ROOTLINK_ADB", "ADB_PATH"] {
        if let Ok(path) = env::var(var) {
            candidates.push(PathBuf::from(path));
        }
    }

    for var in ["ANDROID_SDK_ROOT", "ANDROID_HOME"] {
        if let Ok(root) = env::var(var) {
            let tools = PathBuf::from(root).join("platform-tools");
            candidates.push(tools.join("adb"));
            candidates.push(tools.join("adb.exe"));
        }
    }

    // Emulator-bundled adb on Windows hosts
    let program_files = [
        env::var("ProgramFiles").unwrap_or_else(|_| r"C:\Program Files".into()),
        env::var("ProgramFiles(x86)").unwrap_or_else(|_| r"C:\Program Files (x86)".into()),
    ];
    for dir in program_files {
        candidates.push(PathBuf::from(dir).join("BlueStacks_nxt").join("HD-Adb.exe"));
    }

    if let Ok(local) = env::var("LOCALAPPDATA") {
        candidates.push(
            PathBuf::from(local)
                .join("Android")
                .join("Sdk")
                .join("platform-tools")
                .join("adb.exe"),
        );
    }

    candidates
}

/// Check that `exe version` runs and exits cleanly
async fn responds_to_version(exe: &Path) -> bool {
    let mut cmd = Command::new(exe);
    cmd.kill_on_drop(true)
        .arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    matches!(
        timeout(VERSION_PROBE_TIMEOUT, cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

/// Find an adb executable.
///
/// An explicit path is trusted as given. Otherwise the first existing
/// well-known location wins, then `adb`/`adb.exe` on PATH.
pub async fn find_adb(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    for candidate in candidate_paths() {
        if candidate.is_file() {
            debug!("[ADB] found {}", candidate.display());
            return Some(candidate);
        }
    }

    for name in ["adb", "adb.exe"] {
        let path = PathBuf::from(name);
        if responds_to_version(&path).await {
            debug!("[ADB] using {} from PATH", name);
            return Some(path);
        }
    }

    None
}
