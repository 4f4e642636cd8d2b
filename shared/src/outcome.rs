//! Error taxonomy for privileged execution results
//!
//! Tool failures are recovered inside the escalation chain and never appear
//! here. Everything that does reach a caller keeps the verbatim output.

use crate::report::critical_count;
use crate::{looks_like_payload_output, ExecResult, STATUS_CHANNEL_ERROR, STATUS_TIMEOUT};
use thiserror::Error;

/// Why a privileged execution did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("channel request failed: {}", .text.trim())]
    Channel { text: String },

    #[error("no completion signal within budget; remote state unknown")]
    Timeout { text: String },

    #[error("payload reported failure (status {status}, {critical} critical)")]
    PayloadFailure {
        status: i32,
        critical: u32,
        text: String,
    },

    #[error("unrecognized output (status {status})")]
    Ambiguous { status: i32, text: String },
}

impl ExecError {
    /// The verbatim output behind this error
    pub fn text(&self) -> &str {
        match self {
            ExecError::Channel { text }
            | ExecError::Timeout { text }
            | ExecError::PayloadFailure { text, .. }
            | ExecError::Ambiguous { text, .. } => text,
        }
    }
}

/// Map a final result onto success or one of the error kinds
pub fn assess(result: &ExecResult) -> Result<&ExecResult, ExecError> {
    match result.status {
        0 => Ok(result),
        STATUS_CHANNEL_ERROR => Err(ExecError::Channel {
            text: result.text.clone(),
        }),
        STATUS_TIMEOUT => Err(ExecError::Timeout {
            text: result.text.clone(),
        }),
        status if looks_like_payload_output(&result.text) => Err(ExecError::PayloadFailure {
            status,
            critical: critical_count(&result.text).unwrap_or(0),
            text: result.text.clone(),
        }),
        status => Err(ExecError::Ambiguous {
            status,
            text: result.text.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_status_is_success() {
        let result = ExecResult::new("ROOT_OK", 0);
        assert_eq!(assess(&result), Ok(&result));
    }

    #[test]
    fn test_critical_payload_failure() {
        let text = "=== RESULTS ===\n[CRIT] props leak\nPASS: 3  FAIL: 2  CRIT: 2\nFAILURES DETECTED";
        let err = assess(&ExecResult::new(text, 2)).unwrap_err();
        assert_eq!(
            err,
            ExecError::PayloadFailure {
                status: 2,
                critical: 2,
                text: text.into(),
            }
        );
    }

    #[test]
    fn test_sentinels_map_to_channel_and_timeout() {
        let err = assess(&ExecResult::timeout("partial log")).unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert_eq!(err.text(), "partial log");

        let err = assess(&ExecResult::channel_error("adb executable not found: adb")).unwrap_err();
        assert!(matches!(err, ExecError::Channel { .. }));
    }

    #[test]
    fn test_unmarked_failure_is_ambiguous_and_keeps_text() {
        let err = assess(&ExecResult::new("/system/bin/sh: su: not found", 127)).unwrap_err();
        assert_eq!(
            err,
            ExecError::Ambiguous {
                status: 127,
                text: "/system/bin/sh: su: not found".into(),
            }
        );
    }
}
