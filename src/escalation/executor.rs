//! Privileged executor - walks the escalation chain for one command

use crate::bridge::ServiceBridge;
use crate::channel::{Channel, Request};
use crate::escalation::methods::{
    decide, shell_line, EscalationChain, EscalationMethod, PrivilegeConfig, Step,
};
use rootlink_shared::wrapper::JobId;
use rootlink_shared::{Command, DeviceRef, ExecResult};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One method attempt and its result
#[derive(Debug, Clone)]
pub struct Attempt {
    pub method: EscalationMethod,
    pub result: ExecResult,
}

/// Runs commands with elevated privileges over an unprivileged channel
pub struct PrivilegedExecutor {
    channel: Arc<dyn Channel>,
    bridge: Arc<ServiceBridge>,
    chain: EscalationChain,
    config: PrivilegeConfig,
}

impl PrivilegedExecutor {
    /// Create an executor with the standard chain
    pub fn new(channel: Arc<dyn Channel>, bridge: Arc<ServiceBridge>, config: PrivilegeConfig) -> Self {
        Self {
            channel,
            bridge,
            chain: EscalationChain::standard(),
            config,
        }
    }

    /// Replace the escalation chain
    pub fn with_chain(mut self, chain: EscalationChain) -> Self {
        self.chain = chain;
        self
    }

    /// Execute a command, returning the deciding method's result
    pub async fn execute(&self, device: &DeviceRef, command: &Command) -> ExecResult {
        let attempts = self.execute_traced(device, command).await;
        match attempts.into_iter().last() {
            Some(attempt) => attempt.result,
            None => ExecResult::new("no escalation methods configured", 1),
        }
    }

    /// Execute a command, returning every attempt in order.
    ///
    /// The last attempt is the deciding one.
    pub async fn execute_traced(&self, device: &DeviceRef, command: &Command) -> Vec<Attempt> {
        let methods = self.chain.methods();
        let mut attempts = Vec::with_capacity(methods.len());

        for (index, spec) in methods.iter().enumerate() {
            let is_last = index + 1 == methods.len();
            let result = self.attempt(device, spec.method, command).await;
            let step = decide(&result, spec.on_ambiguous, is_last);

            debug!(
                "[EXEC] {} {} -> status {} ({:?})",
                device, spec.method, result.status, step
            );

            attempts.push(Attempt {
                method: spec.method,
                result,
            });

            if step == Step::Return {
                info!("[EXEC] {} answered by {}", device, spec.method);
                break;
            }
        }

        attempts
    }

    async fn attempt(&self, device: &DeviceRef, method: EscalationMethod, command: &Command) -> ExecResult {
        let call = JobId::new(&Uuid::new_v4().simple().to_string()[..12]);
        let line = match shell_line(method, &command.text, &self.config, &call) {
            Ok(line) => line,
            Err(e) => {
                warn!("[EXEC] cannot quote command for {}: {}", method, e);
                return ExecResult::new(format!("cannot quote command: {}", e), 1);
            }
        };

        match line {
            Some(line) => {
                self.channel
                    .send(device, &Request::Shell(line), command.timeout)
                    .await
            }
            None => self.through_bridge(device, command).await,
        }
    }

    async fn through_bridge(&self, device: &DeviceRef, command: &Command) -> ExecResult {
        if !self.bridge.is_available(device).await {
            let service = &self.bridge.config().service;
            warn!("[EXEC] {} has no init service '{}'", device, service);
            return ExecResult::new(
                format!("service bridge unavailable: init service '{}' not found", service),
                1,
            );
        }

        let budget = command.timeout.max(self.config.min_bridge_budget);
        self.bridge.run(device, &command.text, budget).await.result
    }
}
