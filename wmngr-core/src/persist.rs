//! Persistence of known-good configurations.
//!
//! One namespace, fixed keys: the scalar fields go in as u32 records, the
//! aggregate sections as serialized blobs. A blob that is missing or fails
//! to decode is treated as "no valid config" — a half-written or tampered
//! record must read as absent, never as a mixed old/new configuration.

use std::net::Ipv4Addr;

use embedded_svc::wifi::{AccessPointConfiguration, ClientConfiguration};
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{IpInfo, WifiConfig, WifiMode, MAX_DNS_SERVERS};
use crate::error::{Error, Result};
use crate::platform::ConfigStore;

/// NVS namespace the firmware opens the store on.
pub const NVS_NAMESPACE: &str = "esp_wmngr";

const KEY_MODE: &str = "mode";
const KEY_STA_STATIC: &str = "sta_static";
const KEY_STA_CONNECT: &str = "sta_connect";
const KEY_AP: &str = "ap";
const KEY_STA: &str = "sta";
const KEY_AP_IP: &str = "ap_ip";
const KEY_STA_IP: &str = "sta_ip";
const KEY_STA_DNS: &str = "sta_dns";

/// Every record key, in write order. Also used by store adapters that can
/// only erase key-by-key.
pub const KEYS: &[&str] = &[
    KEY_MODE,
    KEY_STA_STATIC,
    KEY_STA_CONNECT,
    KEY_AP,
    KEY_STA,
    KEY_AP_IP,
    KEY_STA_IP,
    KEY_STA_DNS,
];

/// Store `cfg`, never leaving a partial record behind.
///
/// The namespace is erased first; a failure during the writes erases it
/// again, so the next boot materialises defaults instead of reading a
/// half-written configuration. Defaults themselves are never persisted.
pub fn save(store: &mut dyn ConfigStore, cfg: &WifiConfig) -> Result<()> {
    store.erase_all()?;
    if cfg.is_default {
        debug!("not persisting default configuration");
        return Ok(());
    }
    let result = write_all(store, cfg);
    if result.is_err() {
        if let Err(e) = store.erase_all() {
            error!("erasing partial configuration failed: {e}");
        }
    }
    result
}

fn write_all(store: &mut dyn ConfigStore, cfg: &WifiConfig) -> Result<()> {
    store.set_u32(KEY_MODE, cfg.mode.as_u32())?;
    store.set_u32(KEY_STA_STATIC, u32::from(cfg.sta_static))?;
    store.set_u32(KEY_STA_CONNECT, u32::from(cfg.sta_connect))?;
    write_blob(store, KEY_AP, &cfg.ap)?;
    write_blob(store, KEY_STA, &cfg.sta)?;
    write_blob(store, KEY_AP_IP, &cfg.ap_ip)?;
    write_blob(store, KEY_STA_IP, &cfg.sta_ip)?;
    write_blob(store, KEY_STA_DNS, &cfg.sta_dns)?;
    Ok(())
}

/// Load the persisted configuration. Any missing or undecodable record
/// makes the whole configuration count as absent.
pub fn load(store: &mut dyn ConfigStore) -> Result<WifiConfig> {
    let mode = store
        .get_u32(KEY_MODE)?
        .and_then(WifiMode::from_u32)
        .ok_or(Error::NotFound)?;
    let sta_static = read_bool(store, KEY_STA_STATIC)?;
    let sta_connect = read_bool(store, KEY_STA_CONNECT)?;
    let ap: AccessPointConfiguration = read_blob(store, KEY_AP)?;
    let sta: ClientConfiguration = read_blob(store, KEY_STA)?;
    let ap_ip: IpInfo = read_blob(store, KEY_AP_IP)?;
    let sta_ip: IpInfo = read_blob(store, KEY_STA_IP)?;
    let sta_dns: [Option<Ipv4Addr>; MAX_DNS_SERVERS] = read_blob(store, KEY_STA_DNS)?;

    Ok(WifiConfig {
        is_default: false,
        mode,
        ap,
        ap_ip,
        sta,
        sta_static,
        sta_ip,
        sta_dns,
        sta_connect,
    })
}

fn read_bool(store: &mut dyn ConfigStore, key: &str) -> Result<bool> {
    match store.get_u32(key)? {
        Some(v) => Ok(v != 0),
        None => Err(Error::NotFound),
    }
}

fn write_blob<T: Serialize>(store: &mut dyn ConfigStore, key: &str, value: &T) -> Result<()> {
    let blob = serde_json::to_vec(value).map_err(|_| Error::Io)?;
    store.set_blob(key, &blob)
}

fn read_blob<T: DeserializeOwned>(store: &mut dyn ConfigStore, key: &str) -> Result<T> {
    let len = store.blob_len(key)?.ok_or(Error::NotFound)?;
    let mut buf = vec![0u8; len];
    let data = store.get_blob(key, &mut buf)?.ok_or(Error::NotFound)?;
    // A record that does not decode cleanly is as good as no record.
    serde_json::from_slice(data).map_err(|_| Error::NotFound)
}
