//! NVS-backed implementation of the manager's configuration store.

use anyhow::Result;
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use log::{debug, warn};
use wmngr_core::error::Error;
use wmngr_core::persist::{KEYS, NVS_NAMESPACE};
use wmngr_core::platform::ConfigStore;

pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> Result<Self> {
        debug!("opening NVS namespace {NVS_NAMESPACE}");
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

fn store_err(op: &str, key: &str, e: esp_idf_svc::sys::EspError) -> Error {
    warn!("NVS {op} '{key}' failed: {e}");
    Error::Io
}

impl ConfigStore for NvsStore {
    fn get_u32(&mut self, key: &str) -> wmngr_core::Result<Option<u32>> {
        self.nvs.get_u32(key).map_err(|e| store_err("get", key, e))
    }

    fn set_u32(&mut self, key: &str, value: u32) -> wmngr_core::Result<()> {
        self.nvs
            .set_u32(key, value)
            .map_err(|e| store_err("set", key, e))
    }

    fn blob_len(&mut self, key: &str) -> wmngr_core::Result<Option<usize>> {
        self.nvs
            .blob_len(key)
            .map_err(|e| store_err("stat", key, e))
    }

    fn get_blob<'a>(
        &mut self,
        key: &str,
        buf: &'a mut [u8],
    ) -> wmngr_core::Result<Option<&'a [u8]>> {
        self.nvs
            .get_blob(key, buf)
            .map_err(|e| store_err("get", key, e))
    }

    fn set_blob(&mut self, key: &str, value: &[u8]) -> wmngr_core::Result<()> {
        self.nvs
            .set_blob(key, value)
            .map_err(|e| store_err("set", key, e))
    }

    fn remove(&mut self, key: &str) -> wmngr_core::Result<bool> {
        self.nvs.remove(key).map_err(|e| store_err("remove", key, e))
    }

    fn erase_all(&mut self) -> wmngr_core::Result<()> {
        // EspNvs exposes no whole-namespace erase; the record set is fixed,
        // so dropping every known key is equivalent.
        for key in KEYS {
            self.nvs
                .remove(key)
                .map_err(|e| store_err("remove", key, e))?;
        }
        Ok(())
    }
}
