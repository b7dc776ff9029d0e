//! Timer-driven dispatch: a one-shot esp timer whose callback runs one
//! state-machine step. The alternative worker-task driver lives in the core
//! crate; both implement the same scheduler interface.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};
use log::warn;
use wmngr_core::platform::WakeScheduler;
use wmngr_core::WifiManager;

pub struct TimerScheduler {
    timer: Mutex<EspTimer<'static>>,
}

impl TimerScheduler {
    pub fn new(manager: WifiManager) -> Result<Self> {
        let service = EspTaskTimerService::new()?;
        let timer = service.timer(move || manager.step())?;
        Ok(Self {
            timer: Mutex::new(timer),
        })
    }
}

impl WakeScheduler for TimerScheduler {
    fn wake_soon(&self, delay: Duration) {
        let mut timer = self.timer.lock().unwrap();
        if let Err(e) = timer.after(delay) {
            warn!("arming manager timer failed: {e}");
        }
    }
}
