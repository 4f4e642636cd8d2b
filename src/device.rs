//! Device discovery and selection

use crate::channel::{Channel, HostRequest};
use rootlink_shared::{timing, DeviceRef, ExecResult};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Budget for `adb connect`
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Device selection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("no devices connected")]
    NoDevices,

    #[error("device {0} is not connected")]
    NotConnected(String),

    #[error("multiple devices connected ({}); choose one with --device", .0.join(", "))]
    MultipleDevices(Vec<String>),
}

/// Serials of devices in the `device` state.
///
/// Skips the header line and devices that are `offline` or `unauthorized`.
pub fn parse_device_list(text: &str) -> Vec<DeviceRef> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(serial), Some("device")) => Some(DeviceRef::from(serial)),
                _ => None,
            }
        })
        .collect()
}

/// Port an emulator console serial or a `host:port` serial answers on.
///
/// `emulator-N` listens for adb on N+1.
fn adb_port(serial: &str) -> Option<u16> {
    if let Some(console) = serial.strip_prefix("emulator-") {
        return console.parse::<u16>().ok()?.checked_add(1);
    }
    let (_, port) = serial.rsplit_once(':')?;
    port.parse().ok()
}

/// Drop network serials that duplicate an emulator serial, and repeats.
///
/// Order is kept; when both forms are present the emulator serial wins.
pub fn dedup_by_port(devices: Vec<DeviceRef>) -> Vec<DeviceRef> {
    let emulator_ports: HashSet<u16> = devices
        .iter()
        .filter(|d| d.as_str().starts_with("emulator-"))
        .filter_map(|d| adb_port(d.as_str()))
        .collect();

    let mut seen_ports = HashSet::new();
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|device| {
            let serial = device.as_str();
            if !seen.insert(device.clone()) {
                return false;
            }
            match adb_port(serial) {
                Some(port) if !serial.starts_with("emulator-") && emulator_ports.contains(&port) => {
                    debug!("[ADB] {} duplicates an emulator serial", serial);
                    false
                }
                Some(port) => seen_ports.insert(port),
                None => true,
            }
        })
        .collect()
}

/// List attached devices, de-duplicated
pub async fn list_devices(channel: &dyn Channel) -> Result<Vec<DeviceRef>, ExecResult> {
    let reply = channel
        .host(&HostRequest::ListDevices, timing::CONTROL_TIMEOUT)
        .await;
    if !reply.success() {
        warn!("[ADB] device listing failed: {}", reply.trimmed());
        return Err(reply);
    }
    Ok(dedup_by_port(parse_device_list(&reply.text)))
}

/// Attach a network device by `host:port`
pub async fn connect(channel: &dyn Channel, address: &str) -> Result<(), ExecResult> {
    let reply = channel
        .host(&HostRequest::Connect(address.to_string()), CONNECT_TIMEOUT)
        .await;
    if reply.text.contains("connected to") {
        info!("[ADB] connected to {}", address);
        Ok(())
    } else {
        warn!("[ADB] connect {} failed: {}", address, reply.trimmed());
        Err(reply)
    }
}

/// Pick the target device.
///
/// An explicit serial must be attached; otherwise exactly one device must be.
pub fn select_device(devices: &[DeviceRef], requested: Option<&str>) -> Result<DeviceRef, SelectError> {
    if let Some(serial) = requested {
        return devices
            .iter()
            .find(|d| d.as_str() == serial)
            .cloned()
            .ok_or_else(|| SelectError::NotConnected(serial.to_string()));
    }
    match devices {
        [] => Err(SelectError::NoDevices),
        [only] => Ok(only.clone()),
        many => Err(SelectError::MultipleDevices(
            many.iter().map(|d| d.to_string()).collect(),
        )),
    }
}
