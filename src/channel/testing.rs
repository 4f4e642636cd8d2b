//! In-memory channels for tests
//!
//! `ScriptedChannel` answers by substring rules and records every request.
//! `SimulatedDevice` interprets the shell commands the service bridge
//! issues against a file table and an init service that runs whatever
//! wrapper sits at its script path.

use crate::channel::traits::{Channel, HostRequest, Request};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rootlink_shared::{DeviceRef, ExecResult};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Render a request the way it would reach the device shell
pub fn render(request: &Request) -> String {
    match request {
        Request::Shell(command) => command.clone(),
        Request::Push { local, remote } => format!("push {} {}", local.display(), remote),
        Request::SetProperty { key, value } => format!("setprop {} {}", key, value),
    }
}

fn render_host(request: &HostRequest) -> String {
    match request {
        HostRequest::ListDevices => "devices".into(),
        HostRequest::Connect(addr) => format!("connect {}", addr),
    }
}

/// Channel answering from substring rules
pub struct ScriptedChannel {
    /// First matching rule wins; queued replies are consumed before the
    /// rule's steady reply
    rules: Mutex<Vec<(String, VecDeque<ExecResult>, ExecResult)>>,
    fallback: ExecResult,
    log: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedChannel {
    /// Create a channel answering `fallback` to anything unmatched
    pub fn new(fallback: ExecResult) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests containing `pattern` with `reply`
    pub fn on(self, pattern: &str, reply: ExecResult) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), VecDeque::new(), reply));
        self
    }

    /// Answer with `first` replies in order, then `reply` forever
    pub fn on_sequence(self, pattern: &str, first: Vec<ExecResult>, reply: ExecResult) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), first.into(), reply));
        self
    }

    /// Every request seen so far, rendered
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    /// Timeouts passed with each request containing `pattern`
    pub fn timeouts(&self, pattern: &str) -> Vec<Duration> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.contains(pattern))
            .map(|(_, timeout)| *timeout)
            .collect()
    }

    /// Number of requests containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.requests().iter().filter(|r| r.contains(pattern)).count()
    }

    fn answer(&self, rendered: String, timeout: Duration) -> ExecResult {
        let mut rules = self.rules.lock().unwrap();
        let reply = rules
            .iter_mut()
            .find(|(pattern, _, _)| rendered.contains(pattern.as_str()))
            .map(|(_, queued, steady)| queued.pop_front().unwrap_or_else(|| steady.clone()))
            .unwrap_or_else(|| self.fallback.clone());
        self.log.lock().unwrap().push((rendered, timeout));
        reply
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn send(&self, _device: &DeviceRef, request: &Request, timeout: Duration) -> ExecResult {
        self.answer(render(request), timeout)
    }

    async fn host(&self, request: &HostRequest, timeout: Duration) -> ExecResult {
        self.answer(render_host(request), timeout)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

type PayloadRunner = Box<dyn Fn(&str) -> Option<ExecResult> + Send + Sync>;

#[derive(Default)]
struct DeviceState {
    files: BTreeMap<String, String>,
    service_running: bool,
    starts: u32,
    stops: u32,
    log: Vec<String>,
}

/// A device with a working init-service bridge and a scratch file table
pub struct SimulatedDevice {
    service: String,
    script_path: String,
    installed: bool,
    runner: PayloadRunner,
    fallback: ExecResult,
    pushed: Mutex<HashMap<String, Vec<u8>>>,
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    /// `runner` maps the payload command to its output, or `None` for a
    /// payload that never finishes
    pub fn new(
        service: &str,
        script_path: &str,
        runner: impl Fn(&str) -> Option<ExecResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            service: service.to_string(),
            script_path: script_path.to_string(),
            installed: true,
            runner: Box::new(runner),
            fallback: ExecResult::new("/system/bin/sh: su: not found", 127),
            pushed: Mutex::new(HashMap::new()),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Remove the init service definition from this device
    pub fn without_service(mut self) -> Self {
        self.installed = false;
        self
    }

    /// Reply for shell commands the simulation does not interpret
    pub fn with_fallback(mut self, reply: ExecResult) -> Self {
        self.fallback = reply;
        self
    }

    /// Start with `content` already at `path`
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn pushed(&self, remote: &str) -> Option<Vec<u8>> {
        self.pushed.lock().unwrap().get(remote).cloned()
    }

    pub fn service_running(&self) -> bool {
        self.state.lock().unwrap().service_running
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().unwrap().stops
    }

    /// Every request seen so far, rendered
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    fn set_property(&self, state: &mut DeviceState, key: &str, value: &str) -> ExecResult {
        if value != self.service || !self.installed {
            return ExecResult::new("", 0);
        }
        match key {
            "ctl.stop" => {
                state.stops += 1;
                state.service_running = false;
            }
            "ctl.start" => {
                state.starts += 1;
                state.service_running = true;
                self.run_wrapper(state);
            }
            _ => {}
        }
        ExecResult::new("", 0)
    }

    /// Execute the staged wrapper the way init would
    fn run_wrapper(&self, state: &mut DeviceState) {
        let Some(script) = state.files.get(&self.script_path).cloned() else {
            return;
        };
        let lines: Vec<&str> = script.lines().collect();
        let Some(open) = lines.iter().position(|l| *l == "(") else {
            return;
        };
        let Some(close) = lines.iter().position(|l| l.starts_with(") > ")) else {
            return;
        };
        let command = lines[open + 1..close].join("\n");
        let log = lines[close].split_whitespace().nth(2).unwrap_or_default().to_string();
        let marker = lines
            .iter()
            .find(|l| l.starts_with("echo $_rc > "))
            .and_then(|l| l.split_whitespace().last())
            .unwrap_or_default()
            .to_string();

        state.files.remove(&marker);
        if let Some(result) = (self.runner)(&command) {
            state.files.insert(log, result.text);
            state.files.insert(marker, format!("{}\n", result.status));
        }
    }

    fn shell(&self, state: &mut DeviceState, command: &str) -> ExecResult {
        let tokens: Vec<&str> = command.split_whitespace().collect();

        if let Some(prop) = command.strip_prefix("getprop init.svc.") {
            if self.installed && prop.trim() == self.service {
                let phase = if state.service_running { "running" } else { "stopped" };
                return ExecResult::new(format!("{}\n", phase), 0);
            }
            return ExecResult::new("\n", 0);
        }

        if command.starts_with("ls ") && command.contains("RC_EXISTS") {
            if self.installed {
                return ExecResult::new(format!("/system/etc/init/{}.rc\nRC_EXISTS\n", self.service), 0);
            }
            return ExecResult::new("", 1);
        }

        if command.starts_with("rm -f ") {
            for path in &tokens[2..] {
                match path.split_once('*') {
                    Some((prefix, suffix)) => state.files.retain(|file, _| {
                        !(file.len() >= prefix.len() + suffix.len()
                            && file.starts_with(prefix)
                            && file.ends_with(suffix))
                    }),
                    None => {
                        state.files.remove(*path);
                    }
                }
            }
            return ExecResult::new("", 0);
        }

        if command.starts_with("cat ") && tokens.len() >= 2 {
            return match state.files.get(tokens[1]) {
                Some(content) => ExecResult::new(content.clone(), 0),
                None => ExecResult::new("", 1),
            };
        }

        if let Some(rest) = command.strip_prefix("echo '") {
            if let Some((chunk, redirect)) = rest.split_once('\'') {
                let redirect = redirect.trim();
                if let Some(path) = redirect.strip_prefix(">>") {
                    state
                        .files
                        .entry(path.trim().to_string())
                        .or_default()
                        .push_str(&format!("{}\n", chunk));
                    return ExecResult::new("", 0);
                }
                if let Some(path) = redirect.strip_prefix('>') {
                    state
                        .files
                        .insert(path.trim().to_string(), format!("{}\n", chunk));
                    return ExecResult::new("", 0);
                }
            }
        }

        if command.starts_with("base64 -d ") && tokens.len() >= 5 {
            let staging = tokens[2];
            let script = tokens[4];
            let staged = state.files.remove(staging).map(|text| {
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD.decode(compact)
            });
            return match staged {
                Some(Ok(bytes)) => {
                    state
                        .files
                        .insert(script.to_string(), String::from_utf8_lossy(&bytes).into_owned());
                    ExecResult::new("", 0)
                }
                _ => ExecResult::new("base64: invalid input\n", 1),
            };
        }

        self.fallback.clone()
    }
}

#[async_trait]
impl Channel for SimulatedDevice {
    async fn send(&self, _device: &DeviceRef, request: &Request, _timeout: Duration) -> ExecResult {
        let mut state = self.state.lock().unwrap();
        state.log.push(render(request));
        match request {
            Request::Shell(command) => self.shell(&mut state, command),
            Request::SetProperty { key, value } => self.set_property(&mut state, key, value),
            Request::Push { local, remote } => match std::fs::read(local) {
                Ok(bytes) => {
                    self.pushed.lock().unwrap().insert(remote.clone(), bytes);
                    ExecResult::new(format!("{}: 1 file pushed\n", local.display()), 0)
                }
                Err(e) => ExecResult::new(format!("adb: error: {}\n", e), 1),
            },
        }
    }

    async fn host(&self, request: &HostRequest, _timeout: Duration) -> ExecResult {
        self.state.lock().unwrap().log.push(render_host(request));
        ExecResult::new("", 0)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
