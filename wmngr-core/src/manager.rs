//! The configuration state machine and the public API around it.
//!
//! Callers see a stateless request/response surface: `set_cfg`, `connect`,
//! `start_wps`, `start_scan`. Each request flips the manager into a
//! transitional state and arms a wake-up; a single-stepper then drives the
//! multi-step radio transition, consuming the event flags the radio/IP
//! callback latches. A failed or timed-out apply routes through `fallback`,
//! which restores the last known-good configuration so a wrong passphrase
//! never strands the device.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use atomic_enum::atomic_enum;
use embedded_svc::wifi::ClientConfiguration;
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;

use crate::config::{WifiConfig, WifiMode};
use crate::dispatch::TaskScheduler;
use crate::error::{Error, Result};
use crate::flags::{EventFlags, Flag};
use crate::persist;
use crate::platform::{ticks_after, Clock, ConfigStore, IpAdapter, Radio, Tick, WakeScheduler};
use crate::scan::{ScanSnapshot, MAX_SCAN_RECORDS};

/// Re-arm delay when the machine should act again soon.
pub const CFG_DELAY: Duration = Duration::from_millis(100);
/// Re-arm delay while polling a slow transition.
pub const CFG_TICKS: Duration = Duration::from_secs(1);
/// Deadline for a transitional state before falling back, in ticks.
pub const CFG_TIMEOUT: Tick = 60_000;
/// Bound on how long a public call waits for the config lock.
const LOCK_WAIT: Duration = Duration::from_millis(100);

/// Manager state. `Failed`, `Connected`, and `Idle` are the stable states
/// that accept new requests; everything else is transitional and rejects
/// them as busy.
#[atomic_enum]
#[derive(PartialEq, Eq, PartialOrd, Ord)]
pub enum WmState {
    Failed,
    Connected,
    Idle,
    Update,
    WpsStart,
    WpsActive,
    Connecting,
    Disconnecting,
    Fallback,
}

impl WmState {
    #[must_use]
    pub fn is_stable(self) -> bool {
        matches!(self, Self::Failed | Self::Connected | Self::Idle)
    }

    #[must_use]
    pub fn is_transitional(self) -> bool {
        !self.is_stable()
    }
}

/// Asynchronous radio/IP conditions, as delivered by the platform's event
/// bridge. The mapping onto [`Flag`]s lives in
/// [`WifiManager::notify_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    StaStarted,
    StaStopped,
    StaConnected,
    StaDisconnected,
    StaGotIp,
    StaLostIp,
    ApStarted,
    ApStopped,
    ScanDone { success: bool },
    WpsSuccess,
    WpsFailed,
    WpsTimeout,
    WpsPin,
    WpsPbcOverlap,
}

/// How the state machine gets its execution context.
pub enum Dispatch {
    /// Spawn a dedicated worker (the recommended variant).
    Task { stack_size: Option<usize> },
    /// The embedder supplies a scheduler later via
    /// [`WifiManager::set_scheduler`] — used for timer-driven dispatch and
    /// by the tests, which call [`WifiManager::step`] directly.
    External,
}

/// Everything the state machine owns exclusively, behind the config lock.
struct Core {
    radio: Box<dyn Radio>,
    ip: Box<dyn IpAdapter>,
    /// Last known-good configuration; target of fall-back.
    saved: WifiConfig,
    /// What the radio was most recently told.
    current: WifiConfig,
    /// What the machine is trying to install.
    new: WifiConfig,
    /// Tick at which the running transition began.
    cfg_timestamp: Tick,
    scan_ref: Option<Arc<ScanSnapshot>>,
}

struct Inner {
    state: AtomicWmState,
    flags: EventFlags,
    clock: Box<dyn Clock>,
    wake: OnceCell<Arc<dyn WakeScheduler>>,
    core: Mutex<Core>,
    /// Separate lock so `nvs_valid` never contends with the state machine.
    /// Lock order is always config lock first, store lock second.
    store: Mutex<Box<dyn ConfigStore>>,
}

/// Cheaply cloneable handle to the singleton manager.
#[derive(Clone)]
pub struct WifiManager {
    inner: Arc<Inner>,
}

impl WifiManager {
    /// Bring the manager up.
    ///
    /// Seeds the fall-back slot from compiled defaults, loads the persisted
    /// configuration (falling back to defaults if absent or invalid), and
    /// schedules the first `update` transition so the radio ends up running
    /// something the moment the dispatcher fires. The radio driver must be
    /// constructed with its own credential storage pinned to volatile — the
    /// key-value store belongs to the manager, not the driver.
    pub fn init(
        radio: Box<dyn Radio>,
        mut store: Box<dyn ConfigStore>,
        ip: Box<dyn IpAdapter>,
        clock: Box<dyn Clock>,
        dispatch: Dispatch,
    ) -> Result<Self> {
        let defaults = WifiConfig::default();
        let new = match persist::load(store.as_mut()) {
            Ok(cfg) => {
                info!("loaded persisted configuration");
                cfg
            }
            Err(Error::NotFound) => {
                info!("no persisted configuration, using compiled defaults");
                defaults.clone()
            }
            Err(e) => {
                warn!("loading persisted configuration failed ({e}), using defaults");
                defaults.clone()
            }
        };

        let manager = Self {
            inner: Arc::new(Inner {
                state: AtomicWmState::new(WmState::Update),
                flags: EventFlags::new(),
                clock,
                wake: OnceCell::new(),
                core: Mutex::new(Core {
                    radio,
                    ip,
                    saved: defaults.clone(),
                    current: defaults,
                    new,
                    cfg_timestamp: 0,
                    scan_ref: None,
                }),
                store: Mutex::new(store),
            }),
        };

        if let Dispatch::Task { stack_size } = dispatch {
            let worker = manager.clone();
            let scheduler = TaskScheduler::spawn("wmngr", stack_size, move || worker.step())?;
            manager.set_scheduler(Arc::new(scheduler))?;
        }

        Ok(manager)
    }

    /// Attach the wake-up driver. May be called exactly once; `init` does it
    /// internally for [`Dispatch::Task`].
    pub fn set_scheduler(&self, scheduler: Arc<dyn WakeScheduler>) -> Result<()> {
        self.inner
            .wake
            .set(scheduler)
            .map_err(|_| Error::InvalidState)?;
        self.wake_soon(CFG_DELAY);
        Ok(())
    }

    fn wake_soon(&self, delay: Duration) {
        if let Some(scheduler) = self.inner.wake.get() {
            scheduler.wake_soon(delay);
        }
    }

    /// Bounded-wait acquisition of the config lock.
    fn lock_core(&self) -> Result<MutexGuard<'_, Core>> {
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match self.inner.core.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(TryLockError::Poisoned(e)) => panic!("config lock poisoned: {e}"),
            }
        }
    }

    fn require_stable(&self) -> Result<()> {
        if self.inner.state.load(Ordering::Acquire).is_stable() {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Install a new target configuration.
    ///
    /// Returning `Ok` means the request was accepted, not that it applied;
    /// observe the outcome through [`WifiManager::get_state`] reaching
    /// `Connected`/`Idle` (success) or `Failed` (the device is back on the
    /// previous configuration).
    pub fn set_cfg(&self, cfg: &WifiConfig) -> Result<()> {
        let mut core = self.lock_core()?;
        self.require_stable()?;

        self.capture_saved(&mut core);

        let mut new = cfg.clone();
        new.is_default = false;
        new.validate();
        let changed = new.differs_from(&core.saved);
        core.new = new;

        if changed {
            self.inner.state.store(WmState::Update, Ordering::Release);
            drop(core);
            self.wake_soon(CFG_DELAY);
        } else {
            debug!("requested configuration matches the running one");
        }
        Ok(())
    }

    /// Copy of the configuration currently applied to the radio.
    pub fn get_cfg(&self) -> Result<WifiConfig> {
        Ok(self.lock_core()?.current.clone())
    }

    /// Begin a push-button WPS exchange.
    pub fn start_wps(&self) -> Result<()> {
        let mut core = self.lock_core()?;
        self.require_stable()?;
        core.saved = core.current.clone();
        self.inner.state.store(WmState::WpsStart, Ordering::Release);
        drop(core);
        self.wake_soon(CFG_DELAY);
        Ok(())
    }

    /// Request a scan. Accepted in any state; serviced once the machine is
    /// back in a stable state.
    pub fn start_scan(&self) -> Result<()> {
        let core = self.lock_core()?;
        self.inner.flags.set(Flag::ScanStart);
        self.inner.flags.set(Flag::Trigger);
        drop(core);
        self.wake_soon(CFG_DELAY);
        Ok(())
    }

    /// Borrow the most recent scan snapshot, if any. Dropping the returned
    /// handle releases the borrow; the snapshot outlives its replacement for
    /// as long as any reader still holds it.
    pub fn get_scan(&self) -> Result<Option<Arc<ScanSnapshot>>> {
        Ok(self.lock_core()?.scan_ref.clone())
    }

    /// Re-apply the current configuration with the join attempt enabled.
    pub fn connect(&self) -> Result<()> {
        self.set_connect(true)
    }

    /// Re-apply the current configuration with the join attempt disabled,
    /// tearing down any existing association.
    pub fn disconnect(&self) -> Result<()> {
        self.set_connect(false)
    }

    fn set_connect(&self, connect: bool) -> Result<()> {
        let mut core = self.lock_core()?;
        self.require_stable()?;
        if core.current.mode == WifiMode::Ap {
            return Err(Error::InvalidState);
        }

        self.capture_saved(&mut core);
        let mut new = core.current.clone();
        new.sta_connect = connect;
        core.new = new;

        self.inner.state.store(WmState::Update, Ordering::Release);
        drop(core);
        self.wake_soon(CFG_DELAY);
        Ok(())
    }

    /// Current state; readable without the config lock.
    #[must_use]
    pub fn get_state(&self) -> WmState {
        self.inner.state.load(Ordering::Acquire)
    }

    /// Whether the station interface is associated; readable without the
    /// config lock.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.flags.contains(Flag::StaConnected)
    }

    /// Whether the store currently holds a loadable configuration.
    #[must_use]
    pub fn nvs_valid(&self) -> bool {
        let mut store = self.inner.store.lock().unwrap();
        persist::load(&mut **store).is_ok()
    }

    /// Feed one asynchronous radio/IP event into the flag set.
    ///
    /// Safe to call from any context: this never blocks and never takes the
    /// config lock, so it cannot deadlock against a state-machine step that
    /// is mid-flight.
    pub fn notify_event(&self, event: RadioEvent) {
        let flags = &self.inner.flags;
        let changed = match event {
            RadioEvent::StaStarted => flags.set(Flag::StaStart),
            RadioEvent::StaStopped => flags.clear(Flag::StaStart),
            RadioEvent::StaConnected => flags.set(Flag::StaConnected),
            RadioEvent::StaDisconnected => flags.clear(Flag::StaConnected),
            RadioEvent::StaGotIp => flags.set(Flag::StaGotIp),
            RadioEvent::StaLostIp => flags.clear(Flag::StaGotIp),
            RadioEvent::ApStarted => flags.set(Flag::ApStart),
            RadioEvent::ApStopped => flags.clear(Flag::ApStart),
            RadioEvent::ScanDone { success } => {
                let done = success && flags.set(Flag::ScanDone);
                // A completed scan consumes any still-pending request.
                flags.clear(Flag::ScanStart) || done
            }
            RadioEvent::WpsSuccess => flags.set(Flag::WpsSuccess),
            RadioEvent::WpsFailed
            | RadioEvent::WpsTimeout
            | RadioEvent::WpsPin
            | RadioEvent::WpsPbcOverlap => flags.set(Flag::WpsFailed),
        };
        if changed {
            self.wake_soon(CFG_DELAY);
        }
    }

    /// Run one state-machine step.
    ///
    /// At most one transition per invocation. Non-reentrant by construction:
    /// on lock contention the step re-arms itself and returns immediately.
    pub fn step(&self) {
        let mut core = match self.inner.core.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.wake_soon(CFG_DELAY);
                return;
            }
        };

        self.inner.flags.clear(Flag::Trigger);
        let state = self.inner.state.load(Ordering::Acquire);
        let events = self.inner.flags.snapshot();
        let now = self.inner.clock.now();

        let (next, mut delay) = match state {
            WmState::Update => self.do_update(&mut core, now),
            WmState::Connecting => self.do_connecting(&mut core, now, events.contains(Flag::StaConnected)),
            WmState::WpsStart => self.do_wps_start(&mut core, now),
            WmState::WpsActive => self.do_wps_active(&mut core, now, events),
            WmState::Fallback => self.do_fallback(&mut core),
            WmState::Connected => {
                if events.contains(Flag::StaConnected) {
                    (WmState::Connected, Duration::ZERO)
                } else {
                    info!("station link lost, re-applying configuration");
                    (WmState::Update, CFG_DELAY)
                }
            }
            WmState::Idle | WmState::Failed => (state, Duration::ZERO),
            // Reserved; nothing enters this state yet.
            WmState::Disconnecting => (WmState::Disconnecting, Duration::ZERO),
        };

        if next != state {
            debug!("state {state:?} -> {next:?}");
            self.inner.state.store(next, Ordering::Release);
        }

        if next.is_stable() {
            if self.inner.flags.contains(Flag::ScanStart) {
                self.scan_begin(&mut core);
            } else if self.inner.flags.contains(Flag::ScanDone) {
                self.scan_collect(&mut core, now);
            }
            let pending = self.inner.flags.snapshot();
            if (pending.contains(Flag::ScanStart) || pending.contains(Flag::ScanDone))
                && delay.is_zero()
            {
                delay = CFG_DELAY;
            }
        }

        drop(core);
        if !delay.is_zero() {
            self.wake_soon(delay);
        }
    }

    /// Snapshot what the radio runs right now into the fall-back slot. A
    /// station config we never managed to connect with must not become the
    /// fall-back target, so it is cleared unless the link is up.
    fn capture_saved(&self, core: &mut Core) {
        core.saved = core.current.clone();
        match core.radio.get_configuration() {
            Ok(conf) => core.saved.absorb_radio(&conf),
            Err(e) => debug!("could not read radio configuration: {e}"),
        }
        if !self.inner.flags.contains(Flag::StaConnected) {
            core.saved.sta = ClientConfiguration::default();
        }
    }

    fn do_update(&self, core: &mut Core, now: Tick) -> (WmState, Duration) {
        // The radio refuses a reconfigure while a scan is in flight.
        if self.inner.flags.contains(Flag::ScanRunning) {
            if let Err(e) = core.radio.scan_stop() {
                debug!("stopping scan before reconfigure failed: {e}");
            }
            self.inner.flags.clear(Flag::ScanRunning);
            self.inner.flags.clear(Flag::ScanDone);
        }
        if let Err(e) = core.radio.disconnect() {
            debug!("pre-apply disconnect failed: {e}");
        }

        match Self::apply_config(core) {
            Ok(()) => {
                core.current = core.new.clone();
                if core.new.mode == WifiMode::Ap || !core.new.sta_connect {
                    self.persist_new(core);
                    (WmState::Idle, Duration::ZERO)
                } else {
                    core.cfg_timestamp = now;
                    (WmState::Connecting, CFG_TICKS)
                }
            }
            Err(e) => {
                warn!("applying configuration failed: {e}");
                (WmState::Fallback, CFG_DELAY)
            }
        }
    }

    fn do_connecting(&self, core: &mut Core, now: Tick, connected: bool) -> (WmState, Duration) {
        if connected {
            self.persist_new(core);
            info!("station connected");
            (WmState::Connected, Duration::ZERO)
        } else if ticks_after(now, core.cfg_timestamp.wrapping_add(CFG_TIMEOUT)) {
            warn!("connect attempt timed out, reverting to saved configuration");
            (WmState::Fallback, CFG_DELAY)
        } else {
            (WmState::Connecting, CFG_TICKS)
        }
    }

    fn do_wps_start(&self, core: &mut Core, now: Tick) -> (WmState, Duration) {
        // WPS needs a live station interface alongside whatever AP we run,
        // and clean station credentials for the exchange to fill in.
        let radio_conf = match core.radio.get_configuration() {
            Ok(conf) => conf,
            Err(e) => {
                warn!("reading radio configuration for WPS failed: {e}");
                return (WmState::Fallback, CFG_DELAY);
            }
        };
        let mut new = core.current.clone();
        new.absorb_radio(&radio_conf);
        new.mode = WifiMode::ApSta;
        new.sta = ClientConfiguration::default();
        new.is_default = false;
        core.new = new;

        self.inner.flags.clear(Flag::WpsSuccess);
        self.inner.flags.clear(Flag::WpsFailed);

        let started = core
            .radio
            .set_configuration(&core.new.radio_configuration())
            .and_then(|()| core.radio.start())
            .and_then(|()| core.radio.wps_start());
        match started {
            Ok(()) => {
                core.current = core.new.clone();
                core.cfg_timestamp = now;
                info!("WPS exchange started");
                (WmState::WpsActive, CFG_TICKS)
            }
            Err(e) => {
                warn!("starting WPS failed: {e}");
                (WmState::Fallback, CFG_DELAY)
            }
        }
    }

    fn do_wps_active(
        &self,
        core: &mut Core,
        now: Tick,
        events: enumset::EnumSet<Flag>,
    ) -> (WmState, Duration) {
        if events.contains(Flag::WpsSuccess) {
            if let Err(e) = core.radio.wps_stop() {
                debug!("disabling WPS failed: {e}");
            }
            // Best-effort read of the credentials the exchange installed in
            // the driver; a failure here leaves the cleared station section
            // and the connect attempt will time out into fallback.
            match core.radio.sta_credentials() {
                Ok(creds) => core.new.sta = creds,
                Err(e) => debug!("reading WPS credentials failed: {e}"),
            }
            core.new.mode = WifiMode::ApSta;
            core.new.sta_connect = true;
            info!("WPS succeeded for SSID '{}'", core.new.sta.ssid);
            (WmState::Update, CFG_DELAY)
        } else if events.contains(Flag::WpsFailed)
            || ticks_after(now, core.cfg_timestamp.wrapping_add(CFG_TIMEOUT))
        {
            warn!("WPS failed or timed out");
            if let Err(e) = core.radio.wps_stop() {
                debug!("disabling WPS failed: {e}");
            }
            (WmState::Fallback, CFG_DELAY)
        } else {
            (WmState::WpsActive, CFG_TICKS)
        }
    }

    /// Restore the last known-good configuration. Errors here are logged
    /// and swallowed; there is nothing further to fall back to.
    fn do_fallback(&self, core: &mut Core) -> (WmState, Duration) {
        if let Err(e) = core.radio.disconnect() {
            debug!("fallback disconnect failed: {e}");
        }
        core.new = core.saved.clone();
        core.current = core.saved.clone();
        if let Err(e) = Self::apply_config(core) {
            error!("restoring saved configuration failed: {e}");
        }
        (WmState::Failed, Duration::ZERO)
    }

    /// Push `core.new` to the radio and the IP stack.
    fn apply_config(core: &mut Core) -> Result<()> {
        let cfg = core.new.clone();
        if cfg.mode.is_ap_bearing() {
            core.ip.configure_ap(&cfg.ap_ip)?;
        }
        if cfg.mode.is_sta_bearing() {
            if cfg.sta_static {
                core.ip.dhcpc_stop()?;
                core.ip.configure_sta_static(&cfg.sta_ip, &cfg.sta_dns)?;
            } else {
                core.ip.dhcpc_start()?;
            }
        }
        core.radio.set_configuration(&cfg.radio_configuration())?;
        core.radio.start()?;
        if cfg.mode.is_sta_bearing() && cfg.sta_connect {
            core.radio.connect()?;
        }
        Ok(())
    }

    fn persist_new(&self, core: &Core) {
        let mut store = self.inner.store.lock().unwrap();
        if let Err(e) = persist::save(&mut **store, &core.new) {
            // The namespace has been erased; next boot runs defaults.
            error!("persisting configuration failed: {e}");
        }
    }

    fn scan_begin(&self, core: &mut Core) {
        if !core.current.mode.is_sta_bearing() {
            warn!("scan requested but the running mode has no station interface");
            self.inner.flags.clear(Flag::ScanStart);
            return;
        }
        // A scan already in flight or awaiting collection keeps the request
        // pending; the completion event clears it.
        if self.inner.flags.contains(Flag::ScanRunning)
            || self.inner.flags.contains(Flag::ScanDone)
        {
            return;
        }
        match core.radio.scan_start() {
            Ok(()) => {
                debug!("scan started");
                self.inner.flags.set(Flag::ScanRunning);
                self.inner.flags.clear(Flag::ScanStart);
            }
            Err(e) => {
                warn!("starting scan failed: {e}");
                self.inner.flags.clear(Flag::ScanStart);
            }
        }
    }

    fn scan_collect(&self, core: &mut Core, now: Tick) {
        let count = match core.radio.scan_result_count() {
            Ok(count) => count,
            Err(e) => {
                warn!("reading scan result count failed: {e}");
                0
            }
        };
        if count > 0 {
            match core.radio.scan_results(count.min(MAX_SCAN_RECORDS)) {
                Ok(records) => {
                    debug!("collected {} scan records", records.len());
                    // Swapping the slot releases the previous snapshot's
                    // reference; readers holding clones keep it alive.
                    core.scan_ref = Some(Arc::new(ScanSnapshot::new(now, records)));
                }
                Err(e) => warn!("collecting scan results failed: {e}"),
            }
        }
        self.inner.flags.clear(Flag::ScanRunning);
        self.inner.flags.clear(Flag::ScanDone);
    }
}
