use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::prelude::*;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{EspWifi, WifiDriver};
use log::{debug, info};
use once_cell::sync::OnceCell;
use wmngr_core::platform::StdClock;
use wmngr_core::{Dispatch, WifiManager};

#[cfg(feature = "timer-dispatch")]
mod dispatch;
mod events;
mod netif;
mod radio;
mod storage;

/// Process-wide manager handle; the radio is a single physical resource.
static MANAGER: OnceCell<WifiManager> = OnceCell::new();

/// Accessor for control surfaces (HTTP handlers and the like).
#[allow(dead_code)]
pub fn manager() -> Option<&'static WifiManager> {
    MANAGER.get()
}

fn main() -> Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting wmngr firmware...");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Persistence belongs to the manager; the driver keeps its copy of the
    // credentials in RAM only (no NVS partition handed to it).
    let wifi_driver = WifiDriver::new(peripherals.modem, sysloop.clone(), None)?;
    let wifi = EspWifi::wrap(wifi_driver)?;

    let ip = netif::EspIpAdapter::from_wifi(&wifi);
    let storage = storage::NvsStore::new(nvs)?;
    let radio = radio::EspRadio::new(wifi);

    let manager = WifiManager::init(
        Box::new(radio),
        Box::new(storage),
        Box::new(ip),
        Box::new(StdClock::new()),
        Dispatch::External,
    )?;

    // Wire the event fan-in before the first step can touch the radio.
    let _events = events::subscribe(&sysloop, &manager)?;

    start_dispatch(&manager)?;

    let _ = MANAGER.set(manager.clone());
    info!("wifi manager running");

    loop {
        FreeRtos::delay_ms(5000);
        info!(
            "state: {:?}, sta connected: {}",
            manager.get_state(),
            manager.is_connected()
        );
        if let Ok(Some(scan)) = manager.get_scan() {
            debug!("scan cache: {} records (tstamp {})", scan.len(), scan.tstamp);
        }
    }
}

/// Spawn the manager worker with a FreeRTOS task name, stack size, and
/// priority. Rust's `std::thread::Builder::name()` would set the pthread
/// name only after creation; `ThreadSpawnConfiguration` applies it at
/// FreeRTOS task creation time.
#[cfg(not(feature = "timer-dispatch"))]
fn start_dispatch(manager: &WifiManager) -> Result<()> {
    use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
    use std::sync::Arc;
    use wmngr_core::dispatch::TaskScheduler;

    let prev = ThreadSpawnConfiguration::get();
    ThreadSpawnConfiguration {
        name: Some(c"wmngr".to_bytes_with_nul()),
        stack_size: task_stack(),
        priority: task_priority(),
        ..Default::default()
    }
    .set()?;

    let worker = manager.clone();
    let scheduler = TaskScheduler::spawn("wmngr", None, move || worker.step())?;

    if let Some(prev) = prev {
        prev.set()?;
    }

    manager.set_scheduler(Arc::new(scheduler))?;
    Ok(())
}

/// Drive the manager from a one-shot esp timer instead of a dedicated task.
#[cfg(feature = "timer-dispatch")]
fn start_dispatch(manager: &WifiManager) -> Result<()> {
    use std::sync::Arc;

    let scheduler = dispatch::TimerScheduler::new(manager.clone())?;
    manager.set_scheduler(Arc::new(scheduler))?;
    Ok(())
}

#[cfg(not(feature = "timer-dispatch"))]
fn task_stack() -> usize {
    option_env!("WMNGR_TASK_STACK")
        .and_then(|v| v.parse().ok())
        .unwrap_or(8 * 1024)
}

#[cfg(not(feature = "timer-dispatch"))]
fn task_priority() -> u8 {
    option_env!("WMNGR_TASK_PRIO")
        .and_then(|v| v.parse().ok())
        .unwrap_or(5)
}
