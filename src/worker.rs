//! Background job worker
//!
//! Runs privileged jobs off the caller's task, one at a time, and reports
//! progress as typed events over a channel.

use crate::escalation::PrivilegedExecutor;
use anyhow::{anyhow, Result};
use rootlink_shared::{Command, DeviceRef, ExecResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Events emitted by the job worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// The job left the queue and is executing
    Started { job: u64, device: DeviceRef },
    /// The job finished; `result` is the executor's answer
    Finished {
        job: u64,
        device: DeviceRef,
        result: ExecResult,
    },
}

struct Submission {
    job: u64,
    device: DeviceRef,
    command: Command,
}

/// Executes submitted jobs sequentially on a spawned task
pub struct JobWorker {
    next_job: AtomicU64,
    /// Channel to submit jobs to the worker loop
    job_tx: mpsc::Sender<Submission>,
    /// Channel to receive job events
    event_rx: mpsc::Receiver<JobEvent>,
}

impl JobWorker {
    /// Create a worker and start its loop
    pub fn new(executor: Arc<PrivilegedExecutor>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Submission>(32);
        let (event_tx, event_rx) = mpsc::channel::<JobEvent>(64);

        tokio::spawn(async move {
            worker_loop(executor, job_rx, event_tx).await;
        });

        Self {
            next_job: AtomicU64::new(0),
            job_tx,
            event_rx,
        }
    }

    /// Queue a command; returns the job id used in its events
    pub async fn submit(&self, device: DeviceRef, command: Command) -> Result<u64> {
        let job = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        self.job_tx
            .send(Submission {
                job,
                device,
                command,
            })
            .await
            .map_err(|_| anyhow!("Job worker stopped"))?;
        Ok(job)
    }

    /// Receive the next job event
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.event_rx.recv().await
    }
}

async fn worker_loop(
    executor: Arc<PrivilegedExecutor>,
    mut job_rx: mpsc::Receiver<Submission>,
    event_tx: mpsc::Sender<JobEvent>,
) {
    while let Some(Submission {
        job,
        device,
        command,
    }) = job_rx.recv().await
    {
        info!("[WORKER] job {} on {}", job, device);
        if event_tx
            .send(JobEvent::Started {
                job,
                device: device.clone(),
            })
            .await
            .is_err()
        {
            break;
        }

        let result = executor.execute(&device, &command).await;

        debug!("[WORKER] job {} finished with {}", job, result.status);
        if event_tx
            .send(JobEvent::Finished {
                job,
                device,
                result,
            })
            .await
            .is_err()
        {
            break;
        }
    }
    debug!("[WORKER] loop exited");
}
