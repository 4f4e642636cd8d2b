//! Device channel layer
//!
//! One opaque request/response primitive per device: shell command, file
//! push, property set. Every failure comes back as text plus a status.

pub mod adb;
pub mod locate;
#[cfg(test)]
pub mod testing;
pub mod traits;

pub use adb::AdbChannel;
pub use locate::find_adb;
pub use traits::{Channel, HostRequest, Request};
