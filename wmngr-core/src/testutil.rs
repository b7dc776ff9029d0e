//! In-memory mock collaborators shared by the module tests.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_svc::wifi::{
    AccessPointInfo, AuthMethod, ClientConfiguration, Configuration, SecondaryChannel,
};
use enumset::EnumSet;

use crate::config::{IpInfo, MAX_DNS_SERVERS};
use crate::error::{Error, Result};
use crate::platform::{Clock, ConfigStore, IpAdapter, Radio, Tick, WakeScheduler};

pub fn ap_record(ssid: &str) -> AccessPointInfo {
    AccessPointInfo {
        ssid: ssid.try_into().unwrap(),
        bssid: [0; 6],
        channel: 6,
        secondary_channel: SecondaryChannel::None,
        signal_strength: -42,
        protocols: EnumSet::new(),
        auth_method: Some(AuthMethod::WPA2Personal),
    }
}

// ---------------------------------------------------------------------------
// Store

#[derive(Default)]
struct MemStoreInner {
    u32s: HashMap<String, u32>,
    blobs: HashMap<String, Vec<u8>>,
    writes_left: Option<usize>,
}

impl MemStoreInner {
    fn consume_write(&mut self) -> Result<()> {
        match self.writes_left {
            Some(0) => Err(Error::Io),
            Some(ref mut n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Cloneable in-memory [`ConfigStore`]; clones share the same records so a
/// test can keep a handle while the manager owns a boxed one.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemStoreInner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.u32s.is_empty() && inner.blobs.is_empty()
    }

    pub fn drop_key(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.u32s.remove(key);
        inner.blobs.remove(key);
    }

    pub fn truncate_blob(&self, key: &str, len: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(blob) = inner.blobs.get_mut(key) {
            blob.truncate(len);
        }
    }

    pub fn u32_record(&self, key: &str) -> Option<u32> {
        self.inner.lock().unwrap().u32s.get(key).copied()
    }

    pub fn blob_record(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().blobs.get(key).cloned()
    }

    /// Make every write past the next `n` fail with [`Error::Io`]. Pass
    /// `usize::MAX` to effectively disable failure injection again.
    pub fn fail_after_writes(&self, n: usize) {
        self.inner.lock().unwrap().writes_left =
            if n == usize::MAX { None } else { Some(n) };
    }
}

impl ConfigStore for MemStore {
    fn get_u32(&mut self, key: &str) -> Result<Option<u32>> {
        Ok(self.inner.lock().unwrap().u32s.get(key).copied())
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.consume_write()?;
        inner.u32s.insert(key.to_owned(), value);
        Ok(())
    }

    fn blob_len(&mut self, key: &str) -> Result<Option<usize>> {
        Ok(self.inner.lock().unwrap().blobs.get(key).map(Vec::len))
    }

    fn get_blob<'a>(&mut self, key: &str, buf: &'a mut [u8]) -> Result<Option<&'a [u8]>> {
        let inner = self.inner.lock().unwrap();
        match inner.blobs.get(key) {
            Some(blob) => {
                if buf.len() < blob.len() {
                    return Err(Error::InvalidArg);
                }
                buf[..blob.len()].copy_from_slice(blob);
                Ok(Some(&buf[..blob.len()]))
            }
            None => Ok(None),
        }
    }

    fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.consume_write()?;
        inner.blobs.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let had = inner.u32s.remove(key).is_some() | inner.blobs.remove(key).is_some();
        Ok(had)
    }

    fn erase_all(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.u32s.clear();
        inner.blobs.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Radio

#[derive(Default)]
pub struct RadioShared {
    pub conf: Option<Configuration>,
    pub started: bool,
    pub connect_calls: usize,
    pub disconnect_calls: usize,
    pub scan_starts: usize,
    pub scan_stops: usize,
    pub scan_records: Vec<AccessPointInfo>,
    pub wps_active: bool,
    pub wps_credentials: Option<ClientConfiguration>,
    pub fail_set_configuration: bool,
    pub fail_scan_start: bool,
    pub fail_wps_start: bool,
}

/// Cloneable scripted [`Radio`]; tests keep one handle to steer and inspect
/// it while the manager drives the other.
#[derive(Clone, Default)]
pub struct MockRadio {
    shared: Arc<Mutex<RadioShared>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut RadioShared) -> T) -> T {
        f(&mut self.shared.lock().unwrap())
    }
}

impl Radio for MockRadio {
    fn get_configuration(&mut self) -> Result<Configuration> {
        let shared = self.shared.lock().unwrap();
        Ok(shared.conf.clone().unwrap_or(Configuration::None))
    }

    fn set_configuration(&mut self, conf: &Configuration) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_set_configuration {
            return Err(Error::Io);
        }
        shared.conf = Some(conf.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.shared.lock().unwrap().started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.shared.lock().unwrap().started = false;
        Ok(())
    }

    fn connect(&mut self) -> Result<()> {
        self.shared.lock().unwrap().connect_calls += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.shared.lock().unwrap().disconnect_calls += 1;
        Ok(())
    }

    fn scan_start(&mut self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_scan_start {
            return Err(Error::Io);
        }
        shared.scan_starts += 1;
        Ok(())
    }

    fn scan_stop(&mut self) -> Result<()> {
        self.shared.lock().unwrap().scan_stops += 1;
        Ok(())
    }

    fn scan_result_count(&mut self) -> Result<usize> {
        Ok(self.shared.lock().unwrap().scan_records.len())
    }

    fn scan_results(&mut self, limit: usize) -> Result<Vec<AccessPointInfo>> {
        let shared = self.shared.lock().unwrap();
        Ok(shared.scan_records.iter().take(limit).cloned().collect())
    }

    fn wps_start(&mut self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_wps_start {
            return Err(Error::Io);
        }
        shared.wps_active = true;
        Ok(())
    }

    fn wps_stop(&mut self) -> Result<()> {
        self.shared.lock().unwrap().wps_active = false;
        Ok(())
    }

    fn sta_credentials(&mut self) -> Result<ClientConfiguration> {
        let shared = self.shared.lock().unwrap();
        shared.wps_credentials.clone().ok_or(Error::NotFound)
    }
}

// ---------------------------------------------------------------------------
// IP adapter

#[derive(Default)]
pub struct IpShared {
    pub ap_configured: usize,
    pub static_configured: usize,
    pub dhcpc_starts: usize,
    pub dhcpc_stops: usize,
    pub last_static: Option<IpInfo>,
}

#[derive(Clone, Default)]
pub struct MockIp {
    shared: Arc<Mutex<IpShared>>,
}

impl MockIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut IpShared) -> T) -> T {
        f(&mut self.shared.lock().unwrap())
    }
}

impl IpAdapter for MockIp {
    fn configure_ap(&mut self, _ip: &IpInfo) -> Result<()> {
        self.shared.lock().unwrap().ap_configured += 1;
        Ok(())
    }

    fn configure_sta_static(
        &mut self,
        ip: &IpInfo,
        _dns: &[Option<Ipv4Addr>; MAX_DNS_SERVERS],
    ) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.static_configured += 1;
        shared.last_static = Some(*ip);
        Ok(())
    }

    fn dhcpc_start(&mut self) -> Result<()> {
        self.shared.lock().unwrap().dhcpc_starts += 1;
        Ok(())
    }

    fn dhcpc_stop(&mut self) -> Result<()> {
        self.shared.lock().unwrap().dhcpc_stops += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clock and scheduler

/// Manually advanced [`Clock`].
#[derive(Clone, Default)]
pub struct MockClock {
    now: Arc<AtomicU32>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u32) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::SeqCst)
    }
}

/// Records wake-up requests instead of scheduling anything.
#[derive(Clone, Default)]
pub struct MockScheduler {
    wakes: Arc<Mutex<Vec<Duration>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake_count(&self) -> usize {
        self.wakes.lock().unwrap().len()
    }
}

impl WakeScheduler for MockScheduler {
    fn wake_soon(&self, delay: Duration) {
        self.wakes.lock().unwrap().push(delay);
    }
}
