//! Bridge from the ESP system event loop into the manager's flag set.
//!
//! The callbacks run on the event loop task; they only latch flags through
//! [`WifiManager::notify_event`], which never blocks and never takes the
//! config lock, so they are safe in this context.

use anyhow::Result;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::wifi::WifiEvent;
use wmngr_core::{RadioEvent, WifiManager};

/// Keeps the subscriptions alive; dropping this detaches the manager from
/// the event loop.
pub struct EventBridge {
    _wifi: EspSubscription<'static, System>,
    _ip: EspSubscription<'static, System>,
}

pub fn subscribe(sysloop: &EspSystemEventLoop, manager: &WifiManager) -> Result<EventBridge> {
    let wifi_manager = manager.clone();
    let wifi = sysloop.subscribe::<WifiEvent, _>(move |event| {
        if let Some(mapped) = map_wifi_event(&event) {
            wifi_manager.notify_event(mapped);
        }
    })?;

    let ip_manager = manager.clone();
    let ip = sysloop.subscribe::<IpEvent, _>(move |event| {
        if let Some(mapped) = map_ip_event(&event) {
            ip_manager.notify_event(mapped);
        }
    })?;

    Ok(EventBridge {
        _wifi: wifi,
        _ip: ip,
    })
}

fn map_wifi_event(event: &WifiEvent) -> Option<RadioEvent> {
    match event {
        WifiEvent::StaStarted => Some(RadioEvent::StaStarted),
        WifiEvent::StaStopped => Some(RadioEvent::StaStopped),
        WifiEvent::StaConnected(_) => Some(RadioEvent::StaConnected),
        WifiEvent::StaDisconnected(_) => Some(RadioEvent::StaDisconnected),
        WifiEvent::ApStarted => Some(RadioEvent::ApStarted),
        WifiEvent::ApStopped => Some(RadioEvent::ApStopped),
        WifiEvent::ScanDone(_) => Some(RadioEvent::ScanDone { success: true }),
        WifiEvent::StaWpsSuccess(_) => Some(RadioEvent::WpsSuccess),
        WifiEvent::StaWpsFailed => Some(RadioEvent::WpsFailed),
        WifiEvent::StaWpsTimeout => Some(RadioEvent::WpsTimeout),
        WifiEvent::StaWpsPin(_) => Some(RadioEvent::WpsPin),
        WifiEvent::StaWpsPbcOverlap => Some(RadioEvent::WpsPbcOverlap),
        _ => None,
    }
}

fn map_ip_event(event: &IpEvent) -> Option<RadioEvent> {
    match event {
        IpEvent::DhcpIpAssigned(_) => Some(RadioEvent::StaGotIp),
        IpEvent::DhcpIpDeassigned(_) => Some(RadioEvent::StaLostIp),
        _ => None,
    }
}
