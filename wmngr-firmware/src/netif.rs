//! IP-stack adapter: DHCP client control and static addressing on the
//! station interface, plus addressing for the hosted AP network.
//!
//! `EspWifi` owns the netif objects, so this adapter works through the raw
//! `esp_netif` handles. The svc wrapper exposes no DHCP/DNS control at
//! runtime; the sys calls below are the same ones the wrapper makes at
//! construction time.

use std::net::Ipv4Addr;

use esp_idf_svc::handle::RawHandle;
use esp_idf_svc::wifi::EspWifi;
use esp_idf_sys::{
    esp, esp_ip4_addr_t, esp_netif_dhcpc_start, esp_netif_dhcpc_stop, esp_netif_dhcps_start,
    esp_netif_dhcps_stop, esp_netif_dns_info_t, esp_netif_dns_type_t_ESP_NETIF_DNS_BACKUP,
    esp_netif_dns_type_t_ESP_NETIF_DNS_FALLBACK, esp_netif_dns_type_t_ESP_NETIF_DNS_MAIN,
    esp_netif_ip_info_t, esp_netif_obj, esp_netif_set_dns_info, esp_netif_set_ip_info, EspError,
    ESP_ERR_ESP_NETIF_DHCP_ALREADY_STARTED, ESP_ERR_ESP_NETIF_DHCP_ALREADY_STOPPED,
    ESP_IPADDR_TYPE_V4,
};
use log::warn;
use wmngr_core::config::{IpInfo, MAX_DNS_SERVERS};
use wmngr_core::error::{Error, Result};
use wmngr_core::platform::IpAdapter;

pub struct EspIpAdapter {
    sta: *mut esp_netif_obj,
    ap: *mut esp_netif_obj,
}

// The esp_netif handles are process-wide singletons; the IP stack
// serializes access internally.
unsafe impl Send for EspIpAdapter {}

/// lwip keeps IPv4 addresses in network byte order.
fn ip4(addr: Ipv4Addr) -> esp_ip4_addr_t {
    esp_ip4_addr_t {
        addr: u32::from_ne_bytes(addr.octets()),
    }
}

fn ip_info(info: &IpInfo) -> esp_netif_ip_info_t {
    esp_netif_ip_info_t {
        ip: ip4(info.ip),
        netmask: ip4(info.netmask),
        gw: ip4(info.gateway),
    }
}

fn netif_err(op: &str, e: EspError) -> Error {
    warn!("netif {op} failed: {e}");
    Error::Io
}

impl EspIpAdapter {
    #[must_use]
    pub fn from_wifi(wifi: &EspWifi<'static>) -> Self {
        Self {
            sta: wifi.sta_netif().handle(),
            ap: wifi.ap_netif().handle(),
        }
    }
}

impl IpAdapter for EspIpAdapter {
    fn configure_ap(&mut self, ip: &IpInfo) -> Result<()> {
        let info = ip_info(ip);
        // The DHCP server refuses address changes while running.
        match esp!(unsafe { esp_netif_dhcps_stop(self.ap) }) {
            Ok(()) => {}
            Err(e) if e.code() == ESP_ERR_ESP_NETIF_DHCP_ALREADY_STOPPED as i32 => {}
            Err(e) => return Err(netif_err("dhcps stop", e)),
        }
        esp!(unsafe { esp_netif_set_ip_info(self.ap, &info) })
            .map_err(|e| netif_err("ap set_ip_info", e))?;
        match esp!(unsafe { esp_netif_dhcps_start(self.ap) }) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ESP_ERR_ESP_NETIF_DHCP_ALREADY_STARTED as i32 => Ok(()),
            Err(e) => Err(netif_err("dhcps start", e)),
        }
    }

    fn configure_sta_static(
        &mut self,
        ip: &IpInfo,
        dns: &[Option<Ipv4Addr>; MAX_DNS_SERVERS],
    ) -> Result<()> {
        let info = ip_info(ip);
        esp!(unsafe { esp_netif_set_ip_info(self.sta, &info) })
            .map_err(|e| netif_err("sta set_ip_info", e))?;

        let slots = [
            esp_netif_dns_type_t_ESP_NETIF_DNS_MAIN,
            esp_netif_dns_type_t_ESP_NETIF_DNS_BACKUP,
            esp_netif_dns_type_t_ESP_NETIF_DNS_FALLBACK,
        ];
        for (slot, server) in slots.iter().zip(dns.iter()) {
            let Some(server) = server else { continue };
            let mut dns_info = esp_netif_dns_info_t::default();
            dns_info.ip.u_addr.ip4 = ip4(*server);
            dns_info.ip.type_ = ESP_IPADDR_TYPE_V4 as u8;
            esp!(unsafe { esp_netif_set_dns_info(self.sta, *slot, &mut dns_info) })
                .map_err(|e| netif_err("set_dns_info", e))?;
        }
        Ok(())
    }

    fn dhcpc_start(&mut self) -> Result<()> {
        match esp!(unsafe { esp_netif_dhcpc_start(self.sta) }) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ESP_ERR_ESP_NETIF_DHCP_ALREADY_STARTED as i32 => Ok(()),
            Err(e) => Err(netif_err("dhcpc start", e)),
        }
    }

    fn dhcpc_stop(&mut self) -> Result<()> {
        match esp!(unsafe { esp_netif_dhcpc_stop(self.sta) }) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == ESP_ERR_ESP_NETIF_DHCP_ALREADY_STOPPED as i32 => Ok(()),
            Err(e) => Err(netif_err("dhcpc stop", e)),
        }
    }
}
