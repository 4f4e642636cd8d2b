//! Escalation method descriptors and the stop/continue rule

use rootlink_shared::wrapper::JobId;
use rootlink_shared::{classify, timing, Classification, ExecResult};
use std::fmt;
use std::time::Duration;

/// One technique for obtaining privileged execution, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationMethod {
    /// Command piped into the privilege binary under its renamed path
    RenamedBinaryPipe,
    /// Command piped into the privilege binary by its generic name
    GenericBinaryPipe,
    /// Privilege binary with `-c`, output captured through a scratch file
    RedirectedOutput,
    /// Delegated to the init-service bridge
    ServiceBridge,
}

impl fmt::Display for EscalationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EscalationMethod::RenamedBinaryPipe => "renamed-binary-pipe",
            EscalationMethod::GenericBinaryPipe => "generic-binary-pipe",
            EscalationMethod::RedirectedOutput => "redirected-output",
            EscalationMethod::ServiceBridge => "service-bridge",
        };
        f.write_str(name)
    }
}

/// What to do with a result that is neither success nor a tool failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguousPolicy {
    /// Always try the next method
    FallThrough,
    /// Return non-empty output, try the next method on empty output
    KeepIfNonEmpty,
}

/// A method paired with its ambiguity policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub method: EscalationMethod,
    pub on_ambiguous: AmbiguousPolicy,
}

impl MethodSpec {
    pub const fn new(method: EscalationMethod, on_ambiguous: AmbiguousPolicy) -> Self {
        Self {
            method,
            on_ambiguous,
        }
    }
}

/// Ordered list of methods tried by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationChain {
    methods: Vec<MethodSpec>,
}

impl EscalationChain {
    pub fn new(methods: Vec<MethodSpec>) -> Self {
        Self { methods }
    }

    /// Pipe variants, then redirect, then the service bridge
    pub fn standard() -> Self {
        Self::new(vec![
            MethodSpec::new(EscalationMethod::RenamedBinaryPipe, AmbiguousPolicy::FallThrough),
            MethodSpec::new(EscalationMethod::GenericBinaryPipe, AmbiguousPolicy::FallThrough),
            MethodSpec::new(EscalationMethod::RedirectedOutput, AmbiguousPolicy::KeepIfNonEmpty),
            MethodSpec::new(EscalationMethod::ServiceBridge, AmbiguousPolicy::KeepIfNonEmpty),
        ])
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }
}

impl Default for EscalationChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of one method attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// This result is the executor's answer
    Return,
    /// Try the next method
    FallThrough,
}

/// Decide whether a method's result ends the chain.
///
/// Success and payload output always return. The last method's result
/// returns unconditionally. A tool failure falls through. Anything else
/// follows the method's ambiguity policy.
pub fn decide(result: &ExecResult, policy: AmbiguousPolicy, is_last: bool) -> Step {
    let classification = classify(result);
    if result.success() || classification == Classification::PayloadRan || is_last {
        return Step::Return;
    }
    match (classification, policy) {
        (Classification::ToolFailure, _) => Step::FallThrough,
        (_, AmbiguousPolicy::FallThrough) => Step::FallThrough,
        (_, AmbiguousPolicy::KeepIfNonEmpty) if result.trimmed().is_empty() => Step::FallThrough,
        (_, AmbiguousPolicy::KeepIfNonEmpty) => Step::Return,
    }
}

/// Device-side names used by the direct methods
#[derive(Debug, Clone)]
pub struct PrivilegeConfig {
    /// Privilege binary after a root manager has renamed it
    pub renamed_binary: String,
    /// Privilege binary as found on PATH
    pub generic_binary: String,
    /// Scratch directory for redirected output
    pub scratch_dir: String,
    /// Smallest budget handed to the service bridge
    pub min_bridge_budget: Duration,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            renamed_binary: "/system/xbin/.s".into(),
            generic_binary: "su".into(),
            scratch_dir: "/data/local/tmp".into(),
            min_bridge_budget: timing::PROBE_BRIDGE_TIMEOUT,
        }
    }
}

/// Shell line for a direct method, or `None` for the service bridge
pub fn shell_line(
    method: EscalationMethod,
    command: &str,
    config: &PrivilegeConfig,
    call: &JobId,
) -> Result<Option<String>, shlex::QuoteError> {
    let line = match method {
        EscalationMethod::RenamedBinaryPipe => {
            format!("echo {} | {}", shlex::try_quote(command)?, config.renamed_binary)
        }
        EscalationMethod::GenericBinaryPipe => {
            format!("echo {} | {}", shlex::try_quote(command)?, config.generic_binary)
        }
        EscalationMethod::RedirectedOutput => {
            let out = redirect_path(config, call);
            let inner = format!("( {} ) > {} 2>&1", command, out);
            format!(
                "{} -c {}; _rc=$?; cat {} 2>/dev/null; rm -f {}; exit $_rc",
                config.generic_binary,
                shlex::try_quote(&inner)?,
                out,
                out
            )
        }
        EscalationMethod::ServiceBridge => return Ok(None),
    };
    Ok(Some(line))
}

/// Scratch file receiving redirected output for one call
pub fn redirect_path(config: &PrivilegeConfig, call: &JobId) -> String {
    format!(
        "{}/.rootlink_{}.out",
        config.scratch_dir.trim_end_matches('/'),
        call
    )
}
