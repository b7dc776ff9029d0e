//! Platform seams: the capability surfaces the manager consumes.
//!
//! The firmware crate implements these against `esp-idf-svc`; the tests
//! implement them with in-memory mocks. The manager never talks to hardware
//! except through these traits.

use std::net::Ipv4Addr;
use std::time::Duration;

use embedded_svc::wifi::{AccessPointInfo, ClientConfiguration, Configuration};

use crate::config::{IpInfo, MAX_DNS_SERVERS};
use crate::error::Result;

/// Monotonic milliseconds. Wraps around; compare with [`ticks_after`].
pub type Tick = u32;

/// `true` iff `now` is at or past `deadline`, with unsigned wraparound
/// semantics (FreeRTOS `time_after` style).
#[must_use]
pub fn ticks_after(now: Tick, deadline: Tick) -> bool {
    now.wrapping_sub(deadline) < u32::MAX / 2
}

/// Monotonic clock used for transition deadlines and snapshot timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Wall-clock backed [`Clock`], counting from construction.
pub struct StdClock {
    start: std::time::Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Tick {
        // Truncation is deliberate; tick comparisons are wraparound-safe.
        self.start.elapsed().as_millis() as Tick
    }
}

/// The radio driver capability surface.
///
/// `Configuration` carries both the mode and the per-interface settings, so
/// one getter/setter pair covers what a C driver splits into `get_mode` /
/// `set_mode` / `get_config` / `set_config`. All calls may block for the
/// driver's own latency; they are only ever made by the state machine while
/// it holds the config lock.
pub trait Radio: Send {
    fn get_configuration(&mut self) -> Result<Configuration>;
    fn set_configuration(&mut self, conf: &Configuration) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    /// Kick off an active scan (hidden SSIDs included) without blocking for
    /// the results; completion arrives as a scan-done event.
    fn scan_start(&mut self) -> Result<()>;
    fn scan_stop(&mut self) -> Result<()>;
    fn scan_result_count(&mut self) -> Result<usize>;
    fn scan_results(&mut self, limit: usize) -> Result<Vec<AccessPointInfo>>;
    /// Begin a push-button WPS exchange; the outcome arrives as events.
    fn wps_start(&mut self) -> Result<()>;
    fn wps_stop(&mut self) -> Result<()>;
    /// Station credentials the driver currently holds. After a successful
    /// WPS exchange these are the credentials the peer provided.
    fn sta_credentials(&mut self) -> Result<ClientConfiguration>;
}

/// IP-stack adapter: DHCP client control and static addressing.
pub trait IpAdapter: Send {
    fn configure_ap(&mut self, ip: &IpInfo) -> Result<()>;
    fn configure_sta_static(
        &mut self,
        ip: &IpInfo,
        dns: &[Option<Ipv4Addr>; MAX_DNS_SERVERS],
    ) -> Result<()>;
    fn dhcpc_start(&mut self) -> Result<()>;
    fn dhcpc_stop(&mut self) -> Result<()>;
}

/// Typed key-value store for one namespace, shaped after `EspNvs`.
pub trait ConfigStore: Send {
    fn get_u32(&mut self, key: &str) -> Result<Option<u32>>;
    fn set_u32(&mut self, key: &str, value: u32) -> Result<()>;
    fn blob_len(&mut self, key: &str) -> Result<Option<usize>>;
    /// Read a blob into `buf`, returning the filled prefix. `buf` must be at
    /// least [`ConfigStore::blob_len`] bytes.
    fn get_blob<'a>(&mut self, key: &str, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>>;
    fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<bool>;
    /// Drop every record in the namespace.
    fn erase_all(&mut self) -> Result<()>;
}

/// One-shot delayable wake-up for the state machine.
///
/// Two drivers exist: the worker-task variant in [`crate::dispatch`] and a
/// firmware-side one-shot timer. Requests coalesce: the earliest requested
/// deadline wins.
pub trait WakeScheduler: Send + Sync {
    fn wake_soon(&self, delay: Duration);
}
