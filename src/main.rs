mod bridge;
mod channel;
mod config;
mod deploy;
mod device;
mod escalation;
mod probe;
mod worker;

use anyhow::{anyhow, Context, Result};
use bridge::ServiceBridge;
use channel::{find_adb, AdbChannel, Channel};
use clap::{Parser, Subcommand};
use config::AppConfig;
use escalation::PrivilegedExecutor;
use probe::CapabilityProber;
use rootlink_shared::{assess, timing, Command, DeviceRef, ExecResult, ReportOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use worker::{JobEvent, JobWorker};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Run privileged commands on Android devices over adb
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the adb executable (overrides ROOTLINK_ADB)
    #[arg(long, global = true)]
    adb: Option<PathBuf>,

    /// Target device serial
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Attach these host:port devices before listing
    #[arg(long, global = true, value_name = "ADDR")]
    connect: Vec<String>,

    /// Init service used as the last-resort bridge (overrides ROOTLINK_SERVICE)
    #[arg(long, global = true)]
    service: Option<String>,

    /// Command budget in seconds (overrides ROOTLINK_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List attached devices
    Devices,
    /// Check privileged execution and the helper utility
    Check,
    /// Run a shell command with elevated privileges
    Exec {
        /// Run on every attached device
        #[arg(long, default_value_t = false)]
        all: bool,
        /// Command text; words are joined with spaces
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Push a script and run it with elevated privileges
    Run {
        /// Local script
        script: PathBuf,
        /// Remote path (default: scratch directory + file name)
        #[arg(long)]
        remote: Option<String>,
        /// Exit with the script's summary outcome instead of its status
        #[arg(long, default_value_t = false)]
        report: bool,
        /// Arguments passed to the script
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

/// Wired components for one invocation
struct Runtime {
    config: AppConfig,
    channel: Arc<dyn Channel>,
    executor: Arc<PrivilegedExecutor>,
}

impl Runtime {
    async fn new(cli: &Cli) -> Result<Self> {
        let mut config = AppConfig::from_env();
        if let Some(adb) = &cli.adb {
            config.adb = Some(adb.clone());
        }
        if let Some(service) = &cli.service {
            config.set_service(service);
        }
        if let Some(secs) = cli.timeout {
            config.timeout = Some(Duration::from_secs(secs));
        }

        let exe = find_adb(config.adb.as_deref())
            .await
            .ok_or_else(|| anyhow!("adb not found; pass --adb or set ROOTLINK_ADB"))?;
        let adb = AdbChannel::new(exe);
        info!("[ADB] using {} via {} channel", adb.exe().display(), adb.name());

        let channel: Arc<dyn Channel> = Arc::new(adb);
        let bridge = Arc::new(ServiceBridge::new(channel.clone(), config.bridge.clone()));
        let executor = Arc::new(PrivilegedExecutor::new(
            channel.clone(),
            bridge,
            config.privilege.clone(),
        ));

        Ok(Self {
            config,
            channel,
            executor,
        })
    }

    async fn devices(&self, cli: &Cli) -> Result<Vec<DeviceRef>> {
        for address in &cli.connect {
            if let Err(reply) = device::connect(self.channel.as_ref(), address).await {
                warn!("[ADB] could not connect {}: {}", address, reply.trimmed());
            }
        }
        device::list_devices(self.channel.as_ref())
            .await
            .map_err(|reply| anyhow!("adb devices failed: {}", reply.trimmed()))
    }

    async fn target(&self, cli: &Cli) -> Result<DeviceRef> {
        let devices = self.devices(cli).await?;
        let device = device::select_device(&devices, cli.device.as_deref())?;
        debug!("[ADB] target {}", device);
        Ok(device)
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let rt = Runtime::new(&cli).await?;

    match &cli.command {
        Action::Devices => {
            for device in rt.devices(&cli).await? {
                println!("{}", device);
            }
            Ok(0)
        }
        Action::Check => {
            let device = rt.target(&cli).await?;
            let prober = CapabilityProber::new(rt.executor.clone(), rt.config.probe.clone());
            let preflight = prober.preflight(&device).await;

            println!(
                "{}: privileged execution {}",
                device,
                if preflight.privileged.present { "available" } else { "unavailable" }
            );
            println!(
                "{}: {} {}",
                device,
                rt.config.probe.helper_path,
                if preflight.helper.present { "present" } else { "missing" }
            );
            Ok(if preflight.privileged.present { 0 } else { 1 })
        }
        Action::Exec { all, command } => {
            let devices = if *all {
                let devices = rt.devices(&cli).await?;
                if devices.is_empty() {
                    return Err(device::SelectError::NoDevices.into());
                }
                devices
            } else {
                vec![rt.target(&cli).await?]
            };
            let text = command.join(" ");
            let budget = rt.config.timeout.unwrap_or(timing::SHELL_TIMEOUT);
            exec_on(rt.executor.clone(), devices, Command::new(text, budget)).await
        }
        Action::Run {
            script,
            remote,
            report,
            args,
        } => {
            let device = rt.target(&cli).await?;
            let remote = match remote {
                Some(remote) => remote.clone(),
                None => {
                    let name = script
                        .file_name()
                        .and_then(|n| n.to_str())
                        .context("Script path has no usable file name")?;
                    format!("{}/{}", rt.config.privilege.scratch_dir, name)
                }
            };

            deploy::push_script(rt.channel.as_ref(), &device, script, &remote).await?;
            let result =
                deploy::run_script(&rt.executor, &device, &remote, args, rt.config.timeout).await?;
            print!("{}", result.text);

            if *report {
                let outcome = ReportOutcome::parse(&result.text);
                info!("[DEPLOY] {}: {}", device, outcome);
                Ok(outcome.exit_code())
            } else {
                Ok(exit_code(&result))
            }
        }
    }
}

/// Run one command per device on the job worker, printing results as they finish
async fn exec_on(
    executor: Arc<PrivilegedExecutor>,
    devices: Vec<DeviceRef>,
    command: Command,
) -> Result<i32> {
    let mut worker = JobWorker::new(executor);
    let mut pending = devices.len();
    let mut code = 0;
    let prefixed = pending > 1;

    for device in devices {
        worker.submit(device, command.clone()).await?;
    }

    while pending > 0 {
        match worker.recv().await {
            Some(JobEvent::Started { device, .. }) => debug!("[WORKER] started on {}", device),
            Some(JobEvent::Finished { device, result, .. }) => {
                if prefixed {
                    for line in result.text.lines() {
                        println!("{}: {}", device, line);
                    }
                } else {
                    print!("{}", result.text);
                }
                let status = exit_code(&result);
                if code == 0 {
                    code = status;
                }
                pending -= 1;
            }
            None => return Err(anyhow!("job worker stopped with {} job(s) pending", pending)),
        }
    }
    Ok(code)
}

/// Process exit code for a final result; sentinels become 1
fn exit_code(result: &ExecResult) -> i32 {
    match assess(result) {
        Ok(_) => 0,
        Err(e) => {
            warn!("[EXEC] {}", e);
            if result.status > 0 {
                result.status
            } else {
                1
            }
        }
    }
}
