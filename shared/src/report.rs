//! Payload report interpretation
//!
//! Payload scripts finish with a summary line. This module maps that
//! summary onto a small ordinal outcome space with matching exit codes:
//!
//! ```text
//! 0 = ALL CLEAR
//! 1 = failures detected
//! 2 = critical failures detected
//! 3 = no parseable summary (the payload did not run)
//! ```

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Summary line printed when every check passed
pub const ALL_CLEAR: &str = "ALL CLEAR";

/// Summary line printed when at least one check failed
pub const FAILURES_DETECTED: &str = "FAILURES DETECTED";

fn crit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"CRIT:\s*(\d+)").expect("static pattern compiles"))
}

/// Extract the `CRIT: n` count, if the payload printed one
pub fn critical_count(text: &str) -> Option<u32> {
    crit_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Outcome of a payload run as reported by its own summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Clean,
    FailuresDetected,
    CriticalFailures(u32),
    DidNotRun,
}

impl ReportOutcome {
    /// Interpret payload output
    pub fn parse(text: &str) -> Self {
        let critical = critical_count(text);
        let has_summary =
            critical.is_some() || text.contains(ALL_CLEAR) || text.contains(FAILURES_DETECTED);

        if !has_summary {
            return ReportOutcome::DidNotRun;
        }

        match critical {
            Some(count) if count > 0 => ReportOutcome::CriticalFailures(count),
            _ if text.contains(ALL_CLEAR) => ReportOutcome::Clean,
            _ => ReportOutcome::FailuresDetected,
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportOutcome::Clean => 0,
            ReportOutcome::FailuresDetected => 1,
            ReportOutcome::CriticalFailures(_) => 2,
            ReportOutcome::DidNotRun => 3,
        }
    }
}

impl fmt::Display for ReportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportOutcome::Clean => write!(f, "all clear"),
            ReportOutcome::FailuresDetected => write!(f, "failures detected"),
            ReportOutcome::CriticalFailures(n) => write!(f, "{} critical failure(s)", n),
            ReportOutcome::DidNotRun => write!(f, "payload produced no summary"),
        }
    }
}
