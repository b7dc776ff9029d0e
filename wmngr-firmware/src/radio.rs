//! `esp-idf-svc` implementation of the radio capability surface.
//!
//! Owns the `EspWifi` handle exclusively; only the manager's state machine
//! calls in here. ESP errors are logged at the call site and mapped onto the
//! manager's error kinds.

use std::time::Duration;

use embedded_svc::wifi::{AccessPointInfo, ClientConfiguration, Configuration};
use esp_idf_svc::wifi::{EspWifi, ScanConfig, ScanType, WpsConfig, WpsFactoryInfo, WpsType};
use log::warn;
use wmngr_core::error::{Error, Result};
use wmngr_core::platform::Radio;

const WPS_CONFIG: WpsConfig = WpsConfig {
    wps_type: WpsType::Pbc,
    factory_info: WpsFactoryInfo {
        manufacturer: "espressif",
        model_number: "esp32",
        model_name: "wmngr",
        device_name: "wmngr",
    },
};

pub struct EspRadio {
    wifi: EspWifi<'static>,
}

impl EspRadio {
    #[must_use]
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self { wifi }
    }
}

impl Radio for EspRadio {
    fn get_configuration(&mut self) -> Result<Configuration> {
        self.wifi.get_configuration().map_err(|e| {
            warn!("wifi get_configuration failed: {e}");
            Error::Io
        })
    }

    fn set_configuration(&mut self, conf: &Configuration) -> Result<()> {
        self.wifi.set_configuration(conf).map_err(|e| {
            warn!("wifi set_configuration failed: {e}");
            Error::Io
        })
    }

    fn start(&mut self) -> Result<()> {
        self.wifi.start().map_err(|e| {
            warn!("wifi start failed: {e}");
            Error::Io
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.wifi.stop().map_err(|e| {
            warn!("wifi stop failed: {e}");
            Error::Io
        })
    }

    fn connect(&mut self) -> Result<()> {
        self.wifi.connect().map_err(|e| {
            warn!("wifi connect failed: {e}");
            Error::Io
        })
    }

    fn disconnect(&mut self) -> Result<()> {
        // Disconnecting while unassociated is routine during reconfigures.
        self.wifi.disconnect().map_err(|e| {
            log::debug!("wifi disconnect failed: {e}");
            Error::Io
        })
    }

    fn scan_start(&mut self) -> Result<()> {
        let scan_config = ScanConfig {
            scan_type: ScanType::Active {
                min: Duration::ZERO,
                max: Duration::ZERO,
            },
            show_hidden: true,
            ..Default::default()
        };
        self.wifi
            .driver_mut()
            .start_scan(&scan_config, false)
            .map_err(|e| {
                warn!("scan start failed: {e}");
                Error::Io
            })
    }

    fn scan_stop(&mut self) -> Result<()> {
        self.wifi.driver_mut().stop_scan().map_err(|e| {
            warn!("scan stop failed: {e}");
            Error::Io
        })
    }

    fn scan_result_count(&mut self) -> Result<usize> {
        self.wifi.driver_mut().get_scan_result_count().map_err(|e| {
            warn!("reading scan result count failed: {e}");
            Error::Io
        })
    }

    fn scan_results(&mut self, limit: usize) -> Result<Vec<AccessPointInfo>> {
        let mut records = self.wifi.driver_mut().get_scan_result().map_err(|e| {
            warn!("fetching scan results failed: {e}");
            Error::Io
        })?;
        records.truncate(limit);
        Ok(records)
    }

    fn wps_start(&mut self) -> Result<()> {
        self.wifi
            .driver_mut()
            .start_wps(&WPS_CONFIG)
            .map(|_| ())
            .map_err(|e| {
                warn!("WPS start failed: {e}");
                Error::Io
            })
    }

    fn wps_stop(&mut self) -> Result<()> {
        self.wifi
            .driver_mut()
            .stop_wps()
            .map(|_| ())
            .map_err(|e| {
                warn!("WPS stop failed: {e}");
                Error::Io
            })
    }

    fn sta_credentials(&mut self) -> Result<ClientConfiguration> {
        match self.get_configuration()? {
            Configuration::Client(sta) | Configuration::Mixed(sta, _) => Ok(sta),
            _ => Err(Error::NotFound),
        }
    }
}
