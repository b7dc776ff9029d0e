//! Wireless-network configuration manager core.
//!
//! This crate owns the device's radio configuration lifecycle: applying new
//! AP/STA/APSTA configurations, falling back to the last known-good one when
//! an apply fails, persisting successful configurations to the key-value
//! store, and publishing reference-counted scan snapshots to concurrent
//! readers. It is hardware-agnostic: the radio driver, key-value store, IP
//! stack, clock, and wake-up scheduler are traits (see [`platform`]) so the
//! whole state machine can be tested on the host.
//!
//! The firmware crate binds these traits to `esp-idf-svc` and feeds system
//! events into [`WifiManager::notify_event`].

pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod flags;
pub mod manager;
pub mod persist;
pub mod platform;
pub mod scan;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{IpInfo, WifiConfig, WifiMode, MAX_AP_CLIENTS, MAX_DNS_SERVERS};
pub use error::{Error, Result};
pub use flags::Flag;
pub use manager::{Dispatch, RadioEvent, WifiManager, WmState};
pub use scan::{ScanSnapshot, MAX_SCAN_RECORDS};
