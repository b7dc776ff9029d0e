//! The configuration value type applied to the radio and persisted to the
//! key-value store.

use std::net::Ipv4Addr;

use embedded_svc::wifi::{
    AccessPointConfiguration, ClientConfiguration, Configuration,
};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::defaults;

/// DNS slots carried for static station addressing (main, backup, fallback).
pub const MAX_DNS_SERVERS: usize = 3;

/// AP client limit enforced whenever a configuration is applied.
pub const MAX_AP_CLIENTS: u16 = 3;

/// IPv4 addressing for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Default for IpInfo {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Radio role. Values persist as the ESP `wifi_mode_t` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiMode {
    /// Join an existing network.
    Sta,
    /// Host a network.
    Ap,
    /// Both roles on the same radio.
    ApSta,
}

impl WifiMode {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Sta => 1,
            Self::Ap => 2,
            Self::ApSta => 3,
        }
    }

    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Sta),
            2 => Some(Self::Ap),
            3 => Some(Self::ApSta),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ap_bearing(self) -> bool {
        matches!(self, Self::Ap | Self::ApSta)
    }

    /// Scanning requires a station interface.
    #[must_use]
    pub fn is_sta_bearing(self) -> bool {
        matches!(self, Self::Sta | Self::ApSta)
    }
}

impl Default for WifiMode {
    fn default() -> Self {
        Self::ApSta
    }
}

/// The full configuration the manager applies, persists, and falls back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    /// Synthesized from compiled defaults; never persisted.
    pub is_default: bool,
    pub mode: WifiMode,
    pub ap: AccessPointConfiguration,
    pub ap_ip: IpInfo,
    pub sta: ClientConfiguration,
    /// Use `sta_ip`/`sta_dns` verbatim and suppress the DHCP client.
    pub sta_static: bool,
    pub sta_ip: IpInfo,
    pub sta_dns: [Option<Ipv4Addr>; MAX_DNS_SERVERS],
    /// Attempt to join the target network once the config is applied.
    pub sta_connect: bool,
}

impl Default for WifiConfig {
    fn default() -> Self {
        defaults::compiled()
    }
}

impl WifiConfig {
    /// Clamp values to valid ranges and repair unusable ones.
    pub fn validate(&mut self) {
        if self.ap.ssid.is_empty() {
            warn!("AP SSID is empty, substituting default");
            self.ap.ssid = defaults::ap_ssid();
        }
        if self.ap.channel == 0 || self.ap.channel > 14 {
            warn!("AP channel {} out of range, using 1", self.ap.channel);
            self.ap.channel = 1;
        }
        if self.ap.max_connections > MAX_AP_CLIENTS {
            self.ap.max_connections = MAX_AP_CLIENTS;
        }
    }

    /// Build the driver configuration for this config's mode.
    ///
    /// The AP client limit is pinned here, at apply time, regardless of what
    /// the stored configuration says.
    #[must_use]
    pub fn radio_configuration(&self) -> Configuration {
        let mut ap = self.ap.clone();
        ap.max_connections = MAX_AP_CLIENTS;
        match self.mode {
            WifiMode::Sta => Configuration::Client(self.sta.clone()),
            WifiMode::Ap => Configuration::AccessPoint(ap),
            WifiMode::ApSta => Configuration::Mixed(self.sta.clone(), ap),
        }
    }

    /// Overwrite mode and interface sections with what the radio reports.
    /// IP addressing fields are untouched; the radio does not know them.
    pub fn absorb_radio(&mut self, conf: &Configuration) {
        match conf {
            Configuration::None => {}
            Configuration::Client(sta) => {
                self.mode = WifiMode::Sta;
                self.sta = sta.clone();
            }
            Configuration::AccessPoint(ap) => {
                self.mode = WifiMode::Ap;
                self.ap = ap.clone();
            }
            Configuration::Mixed(sta, ap) => {
                self.mode = WifiMode::ApSta;
                self.sta = sta.clone();
                self.ap = ap.clone();
            }
        }
    }

    /// Whether applying `self` over `other` would actually change the radio:
    /// a mode change, or a change in the sections the mode keeps active.
    #[must_use]
    pub fn differs_from(&self, other: &WifiConfig) -> bool {
        if self.mode != other.mode {
            return true;
        }
        if self.mode.is_ap_bearing() && (self.ap != other.ap || self.ap_ip != other.ap_ip) {
            return true;
        }
        if self.mode.is_sta_bearing()
            && (self.sta != other.sta
                || self.sta_static != other.sta_static
                || self.sta_ip != other.sta_ip
                || self.sta_dns != other.sta_dns
                || self.sta_connect != other.sta_connect)
        {
            return true;
        }
        false
    }
}
