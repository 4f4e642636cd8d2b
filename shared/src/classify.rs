//! Response Classifier
//!
//! Decides whether a channel response proves the payload ran, or whether the
//! escalation tool itself failed before the payload could start.

use crate::ExecResult;

/// Tokens any payload prints to prove it executed, independent of exit code
pub const PAYLOAD_MARKERS: &[&str] = &[
    "===", "[PASS]", "[FAIL]", "[CRIT]", "INSTALL_", "ALREADY_", "REMOUNT_",
];

/// Lower-case fragments of shell errors raised when the escalation binary
/// is missing, unreadable or refuses to run
pub const TOOL_FAILURE_FRAGMENTS: &[&str] = &[
    "inaccessible",
    "not found",
    "no such file",
    "permission denied",
    "cannot execute",
    "not permitted",
];

/// How a response relates to the payload that was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Payload markers present; the payload ran regardless of status
    PayloadRan,
    /// The escalation mechanism is unusable on this device
    ToolFailure,
    /// Neither markers nor a recognizable tool error
    Ambiguous,
}

/// Check if the text carries any payload marker
pub fn looks_like_payload_output(text: &str) -> bool {
    PAYLOAD_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Check if the text reads like the escalation binary failed.
///
/// Never true when payload markers are present: a payload may print
/// "permission denied" as part of its own diagnostics.
pub fn looks_like_tool_failure(text: &str) -> bool {
    if looks_like_payload_output(text) {
        return false;
    }
    let lower = text.to_lowercase();
    TOOL_FAILURE_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

/// Classify a complete result
pub fn classify(result: &ExecResult) -> Classification {
    if looks_like_payload_output(&result.text) {
        Classification::PayloadRan
    } else if !result.success() && looks_like_tool_failure(&result.text) {
        Classification::ToolFailure
    } else {
        Classification::Ambiguous
    }
}
