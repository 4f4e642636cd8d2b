//! Init-service bridge
//!
//! Last-resort privileged execution through a restart-prone init service.

pub mod locks;
pub mod service;

pub use locks::DeviceLocks;
pub use service::{BridgeConfig, BridgeReport, Completion, ServiceBridge, BRIDGE_TIMEOUT_TEXT};
