//! Compiled-in default configuration.
//!
//! The knob strings can be overridden at build time through environment
//! variables; anything unparseable falls back to a documented hard-coded
//! value with a logged warning, so a bad build setting degrades instead of
//! bricking the device.

use std::net::Ipv4Addr;

use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration};
use log::warn;

use crate::config::{IpInfo, WifiConfig, WifiMode, MAX_AP_CLIENTS, MAX_DNS_SERVERS};

const AP_SSID: &str = match option_env!("WMNGR_AP_SSID") {
    Some(v) => v,
    None => "ESP WiFi Manager",
};
const AP_PASS: &str = match option_env!("WMNGR_AP_PASS") {
    Some(v) => v,
    None => "",
};
const AP_IP: &str = match option_env!("WMNGR_AP_IP") {
    Some(v) => v,
    None => "192.168.4.1",
};
const AP_NETMASK: &str = match option_env!("WMNGR_AP_NETMASK") {
    Some(v) => v,
    None => "255.255.255.0",
};
const AP_GATEWAY: &str = match option_env!("WMNGR_AP_GW") {
    Some(v) => v,
    None => "192.168.4.1",
};

/// Fallbacks used when a knob string does not parse.
const FALLBACK_SSID: &str = "ESP WiFi Manager";
const FALLBACK_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const FALLBACK_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
const FALLBACK_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

fn parse_addr(label: &str, value: &str, fallback: Ipv4Addr) -> Ipv4Addr {
    value.parse().unwrap_or_else(|_| {
        warn!("default {label} '{value}' does not parse, using {fallback}");
        fallback
    })
}

/// Default AP SSID, substituting the hard-coded name on length violation.
pub(crate) fn ap_ssid() -> heapless::String<32> {
    AP_SSID.try_into().unwrap_or_else(|_| {
        warn!("default AP SSID '{AP_SSID}' is too long, using '{FALLBACK_SSID}'");
        FALLBACK_SSID.try_into().unwrap()
    })
}

fn ap_ip_info() -> IpInfo {
    IpInfo {
        ip: parse_addr("AP address", AP_IP, FALLBACK_IP),
        netmask: parse_addr("AP netmask", AP_NETMASK, FALLBACK_NETMASK),
        gateway: parse_addr("AP gateway", AP_GATEWAY, FALLBACK_GATEWAY),
    }
}

/// Materialise the compiled default configuration.
///
/// Mode defaults to APSTA so a fresh device is reachable both through its
/// own network and through any pre-provisioned one.
#[must_use]
pub fn compiled() -> WifiConfig {
    let password: heapless::String<64> = AP_PASS.try_into().unwrap_or_else(|_| {
        warn!("default AP passphrase is too long, AP will be open");
        heapless::String::new()
    });
    let auth_method = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    WifiConfig {
        is_default: true,
        mode: WifiMode::ApSta,
        ap: AccessPointConfiguration {
            ssid: ap_ssid(),
            password,
            auth_method,
            channel: 1,
            max_connections: MAX_AP_CLIENTS,
            ..Default::default()
        },
        ap_ip: ap_ip_info(),
        sta: ClientConfiguration::default(),
        sta_static: false,
        sta_ip: IpInfo::default(),
        sta_dns: [None; MAX_DNS_SERVERS],
        sta_connect: false,
    }
}
