//! Service Bridge
//!
//! Turns a restart-prone init service into a one-shot privileged execution
//! primitive: stop, clear, stage a wrapper, start, poll for the completion
//! marker, collect, then stop and clean up again. Every path out of a run
//! passes through Draining, so the service is never left running.

use crate::bridge::locks::DeviceLocks;
use crate::channel::{Channel, Request};
use rootlink_shared::state_machine::{BridgeEvent, BridgeStateMachine};
use rootlink_shared::transfer::encode_chunks;
use rootlink_shared::wrapper::{compose_wrapper, parse_marker, JobId, Workspace};
use rootlink_shared::{looks_like_tool_failure, timing, DeviceRef, ExecResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Text returned when a job never signals completion and left no log
pub const BRIDGE_TIMEOUT_TEXT: &str = "TIMEOUT: init service did not complete";

/// Configuration for the service bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Init service name addressed by ctl.start / ctl.stop
    pub service: String,
    /// Directory for per-job marker, log and staging files
    pub scratch_dir: String,
    /// Executable the service definition runs
    pub script_path: String,
    /// Directory holding init service definitions
    pub rc_dir: String,
    /// Delay after stopping the service
    pub settle_delay: Duration,
    /// Interval between completion-marker polls
    pub poll_interval: Duration,
    /// Budget for each control/bookkeeping request
    pub control_timeout: Duration,
    /// Budget for the on-device decode step
    pub decode_timeout: Duration,
    /// Base64 characters per staging request
    pub chunk_size: usize,
    /// Seconds the wrapper parks after the payload exits
    pub park_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            service: "rootlink".into(),
            scratch_dir: "/data/local/tmp".into(),
            script_path: "/data/local/tmp/rootlink_boot.sh".into(),
            rc_dir: "/system/etc/init".into(),
            settle_delay: timing::SETTLE_DELAY,
            poll_interval: timing::POLL_INTERVAL,
            control_timeout: timing::CONTROL_TIMEOUT,
            decode_timeout: timing::DECODE_TIMEOUT,
            chunk_size: timing::CHUNK_SIZE,
            park_secs: timing::PARK_SECS,
        }
    }
}

impl BridgeConfig {
    /// Path of the service definition on the device
    pub fn rc_path(&self) -> String {
        format!("{}/{}.rc", self.rc_dir.trim_end_matches('/'), self.service)
    }
}

/// One unit of work submitted to the bridge
#[derive(Debug, Clone)]
pub struct ServiceJob {
    pub id: JobId,
    pub command: String,
    pub workspace: Workspace,
}

impl ServiceJob {
    /// Create a job with a fresh id
    pub fn new(command: impl Into<String>, config: &BridgeConfig) -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self::with_id(JobId::new(&raw[..12]), command, config)
    }

    /// Create a job with a caller-chosen id
    pub fn with_id(id: JobId, command: impl Into<String>, config: &BridgeConfig) -> Self {
        let workspace = Workspace::for_job(&config.scratch_dir, &config.script_path, &id);
        Self {
            id,
            command: command.into(),
            workspace,
        }
    }

    /// The wrapper script the service will run for this job
    pub fn wrapper(&self, park_secs: u64) -> String {
        compose_wrapper(&self.command, &self.workspace, park_secs)
    }
}

/// How a bridge run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Marker observed with this exit code
    Exited(i32),
    /// No marker within the budget; the payload may still be running
    TimedOut,
    /// Wrapper could not be installed; the service was never started
    StagingFailed,
    /// The device refused to start the service
    StartFailed,
}

/// Result of one bridge run
#[derive(Debug, Clone)]
pub struct BridgeReport {
    pub job: JobId,
    pub result: ExecResult,
    pub completion: Completion,
}

/// Drives the init service as a one-shot executor
pub struct ServiceBridge {
    channel: Arc<dyn Channel>,
    config: BridgeConfig,
    locks: DeviceLocks,
}

impl ServiceBridge {
    /// Create a new bridge over a channel
    pub fn new(channel: Arc<dyn Channel>, config: BridgeConfig) -> Self {
        Self {
            channel,
            config,
            locks: DeviceLocks::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn shell(&self, device: &DeviceRef, command: String, budget: Duration) -> ExecResult {
        self.channel
            .send(device, &Request::Shell(command), budget)
            .await
    }

    async fn control(&self, device: &DeviceRef, verb: &str) -> ExecResult {
        let result = self
            .channel
            .send(
                device,
                &Request::set_property(verb, self.config.service.as_str()),
                self.config.control_timeout,
            )
            .await;
        if !result.success() {
            warn!(
                "[BRIDGE] {} {} on {} returned {}: {}",
                verb,
                self.config.service,
                device,
                result.status,
                result.trimmed()
            );
        }
        result
    }

    /// Check whether the bridge service is defined on this device.
    ///
    /// On a fresh boot `init.svc.<name>` stays empty until the service is
    /// first triggered, so the definition file is checked as well.
    pub async fn is_available(&self, device: &DeviceRef) -> bool {
        let reply = self
            .shell(
                device,
                format!("getprop init.svc.{}", self.config.service),
                self.config.control_timeout,
            )
            .await;
        if reply.success() && !reply.trimmed().is_empty() && !looks_like_tool_failure(&reply.text) {
            return true;
        }

        let reply = self
            .shell(
                device,
                format!("ls {} 2>/dev/null && echo RC_EXISTS", self.config.rc_path()),
                self.config.control_timeout,
            )
            .await;
        reply.text.contains("RC_EXISTS")
    }

    /// Run `command` through the service, waiting up to `budget` for it
    pub async fn run(&self, device: &DeviceRef, command: &str, budget: Duration) -> BridgeReport {
        let _guard = self.locks.acquire(device).await;
        let job = ServiceJob::new(command, &self.config);
        let mut fsm = BridgeStateMachine::new();

        info!(
            "[BRIDGE] {} job {} via service {}",
            device, job.id, self.config.service
        );

        // Stop: breaks any relaunch loop left from an earlier run
        advance(&mut fsm, BridgeEvent::StopRequested);
        self.control(device, "ctl.stop").await;
        sleep(self.config.settle_delay).await;
        advance(&mut fsm, BridgeEvent::Stopped);

        // Clear
        self.shell(device, job.workspace.clear_command(), self.config.control_timeout)
            .await;

        // Compose and transfer
        if let Err(failure) = self.stage(device, &job).await {
            error!("[BRIDGE] {} job {} staging failed: {}", device, job.id, failure.trimmed());
            advance(&mut fsm, BridgeEvent::StagingFailed);
            self.drain(device, &job, &mut fsm).await;
            return BridgeReport {
                job: job.id,
                result: ExecResult::new(
                    format!("service bridge staging failed: {}", failure.trimmed()),
                    if failure.status == 0 { 1 } else { failure.status },
                ),
                completion: Completion::StagingFailed,
            };
        }

        // Start
        let start = self.control(device, "ctl.start").await;
        if !start.success() {
            error!(
                "[BRIDGE] {} job {} could not start service {}",
                device, job.id, self.config.service
            );
            advance(&mut fsm, BridgeEvent::StartFailed);
            self.drain(device, &job, &mut fsm).await;
            return BridgeReport {
                job: job.id,
                result: ExecResult::new(
                    format!("service bridge start failed: {}", start.trimmed()),
                    start.status,
                ),
                completion: Completion::StartFailed,
            };
        }
        advance(&mut fsm, BridgeEvent::Started);

        // Poll
        let exit_code = self.poll(device, &job, budget).await;

        let report = match exit_code {
            Some(code) => {
                let log = self
                    .shell(device, job.workspace.read_log_command(), self.config.decode_timeout)
                    .await;
                advance(&mut fsm, BridgeEvent::Completed);
                info!("[BRIDGE] {} job {} exited with {}", device, job.id, code);
                self.drain(device, &job, &mut fsm).await;
                BridgeReport {
                    job: job.id,
                    result: ExecResult::new(log.text, code),
                    completion: Completion::Exited(code),
                }
            }
            None => {
                warn!(
                    "[BRIDGE] {} job {} gave no completion signal within {:?}",
                    device, job.id, budget
                );
                advance(&mut fsm, BridgeEvent::TimedOut);
                // Stop first so the log stops growing, then read what exists
                self.control(device, "ctl.stop").await;
                let log = self
                    .shell(device, job.workspace.read_log_command(), self.config.control_timeout)
                    .await;
                self.clean(device, &job).await;
                advance(&mut fsm, BridgeEvent::Drained);

                let text = if log.success() && !log.trimmed().is_empty() {
                    log.text
                } else {
                    BRIDGE_TIMEOUT_TEXT.to_string()
                };
                BridgeReport {
                    job: job.id,
                    result: ExecResult::timeout(text),
                    completion: Completion::TimedOut,
                }
            }
        };

        if !fsm.is_settled() {
            // Service state is unknown; never report this as a clean exit
            error!("[BRIDGE] {} run ended in phase {:?}", device, fsm.phase());
            return BridgeReport {
                job: report.job,
                result: ExecResult::timeout(report.result.text),
                completion: Completion::TimedOut,
            };
        }
        debug!(
            "[BRIDGE] {} settled after {} stop(s)",
            device,
            fsm.stops_requested()
        );
        report
    }

    /// Write the wrapper to the device in chunks and install it
    async fn stage(&self, device: &DeviceRef, job: &ServiceJob) -> Result<(), ExecResult> {
        let wrapper = job.wrapper(self.config.park_secs);
        let chunks = encode_chunks(wrapper.as_bytes(), self.config.chunk_size)
            .map_err(|e| ExecResult::new(e.to_string(), 1))?;

        debug!(
            "[BRIDGE] staging {} bytes in {} chunk(s)",
            wrapper.len(),
            chunks.len()
        );

        for (index, chunk) in chunks.iter().enumerate() {
            let reply = self
                .shell(
                    device,
                    job.workspace.stage_command(chunk, index == 0),
                    self.config.control_timeout,
                )
                .await;
            if !reply.success() {
                return Err(reply);
            }
        }

        let reply = self
            .shell(device, job.workspace.install_command(), self.config.decode_timeout)
            .await;
        if reply.success() {
            Ok(())
        } else {
            Err(reply)
        }
    }

    /// Poll the completion marker until it holds an exit code or the budget runs out
    async fn poll(&self, device: &DeviceRef, job: &ServiceJob, budget: Duration) -> Option<i32> {
        let deadline = Instant::now() + budget;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            sleep(self.config.poll_interval.min(remaining)).await;

            // No single read may outlive the budget
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let reply = self
                .shell(
                    device,
                    job.workspace.read_marker_command(),
                    self.config.control_timeout.min(remaining),
                )
                .await;
            if let Some(code) = parse_marker(&reply.text) {
                return Some(code);
            }
        }
    }

    /// Remove the job's marker, log and staging files
    async fn clean(&self, device: &DeviceRef, job: &ServiceJob) {
        let ws = &job.workspace;
        self.shell(
            device,
            format!("rm -f {} {} {}", ws.done_marker, ws.log, ws.staging),
            self.config.control_timeout,
        )
        .await;
    }

    /// Stop the parked service and remove job files
    async fn drain(&self, device: &DeviceRef, job: &ServiceJob, fsm: &mut BridgeStateMachine) {
        self.control(device, "ctl.stop").await;
        self.clean(device, job).await;
        advance(fsm, BridgeEvent::Drained);
    }
}

fn advance(fsm: &mut BridgeStateMachine, event: BridgeEvent) {
    match fsm.process_event(event) {
        Ok(phase) => debug!("[BRIDGE] {:?} -> {:?}", event, phase),
        Err(e) => error!("[BRIDGE] {}", e),
    }
}
