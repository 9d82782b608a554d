//! One-shot, strictly ordered system bring-up.
//!
//! Runs single-threaded, before any task exists.  Each completed step is
//! recorded in the [`BootTrace`]; the ordering constraints are the point:
//!
//! 1. config store (NVS)
//! 2. settings registry + the supervisor's own listeners
//! 3. network/transport prerequisites
//! 4. persisted device address — **must precede** link init
//! 5. link protocol, bound to that address
//! 6. persisted settings applied to the link
//! 7. peer service, bound to the link
//! 8. control input, bound to the radio handle (driver deliberately
//!    uninitialized — it runs inside the control task, see
//!    [`crate::drivers::radio`]) and the companion path
//! 9. UI last, so it can only ever observe a fully-initialized system
//!
//! Any failure up to here is fatal: boot aborts and the chip restarts.
//! The single degraded path is an absent display (step 9).

use log::{info, warn};

use crate::companion::{CompanionLink, CompanionTransport};
use crate::config::{device_id, ConfigStore};
use crate::context::{AppContext, InputMailbox, Subsystem, SystemStatus, TaskOwned};
use crate::diagnostics::CrashLog;
use crate::drivers::radio::{Radio, RadioBus, RadioPins};
use crate::drivers::screen::DisplayPort;
use crate::error::{DegradedStart, InitError};
use crate::link::{FrameRing, LinkProtocol};
use crate::peer::PeerService;
use crate::rc::{ControlInput, InputSampler};
use crate::settings::{KeyMatcher, SettingChange, SettingKey, SettingListener, SettingsRegistry};
use crate::shutdown::{PlatformPort, PowerOffListener, ShutdownCoordinator};
use crate::ui::UiSystem;

// ---------------------------------------------------------------------------
// Boot report
// ---------------------------------------------------------------------------

/// Completed bring-up stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    ConfigStore,
    SettingsReady,
    NetifReady,
    AddressLoaded,
    LinkReady,
    LinkSettingsApplied,
    PeerReady,
    ControlReady,
    CompanionReady,
    UiReady,
}

pub type BootTrace = heapless::Vec<BootStage, 12>;

pub struct BootReport {
    pub trace: BootTrace,
    pub degraded: heapless::Vec<DegradedStart, 4>,
    pub device_id: heapless::String<16>,
}

pub struct BootOutcome {
    pub ctx: &'static AppContext,
    pub shutdown: &'static ShutdownCoordinator,
    pub report: BootReport,
}

// ---------------------------------------------------------------------------
// Board ports
// ---------------------------------------------------------------------------

/// The hardware boundary handed to the bootstrapper.  Production wires
/// real drivers in `main`; tests and host runs pass simulations.
pub struct BoardPorts {
    pub radio_bus: Box<dyn RadioBus>,
    pub display: Box<dyn DisplayPort>,
    pub companion: Box<dyn CompanionTransport>,
    pub sampler: Box<dyn InputSampler>,
}

#[cfg(not(target_os = "espidf"))]
impl BoardPorts {
    /// All-simulation board for host runs.
    pub fn sim() -> Self {
        use crate::companion::SimCompanionTransport;
        use crate::drivers::radio::SimRadioBus;
        use crate::drivers::screen::SimScreen;
        use crate::rc::SimSticks;

        Self {
            radio_bus: Box::new(SimRadioBus::new()),
            display: Box::new(SimScreen::fitted()),
            companion: Box::new(SimCompanionTransport::new()),
            sampler: Box::new(SimSticks),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings listener: link-related keys
// ---------------------------------------------------------------------------

/// Mirrors link-configuring settings into [`SystemStatus`] atomics; the
/// control task applies them to the radio.  Runs on whatever task
/// changed the setting, so it only writes atomics.
struct LinkSettingsListener {
    status: &'static SystemStatus,
}

impl SettingListener for LinkSettingsListener {
    fn on_setting_changed(&self, change: &SettingChange) {
        if change.key == SettingKey::RfPowerDbm {
            self.status.set_rf_power_dbm(change.value.as_u8());
        }
    }
}

// ---------------------------------------------------------------------------
// Bring-up
// ---------------------------------------------------------------------------

pub fn bring_up(
    board: BoardPorts,
    platform: Box<dyn PlatformPort>,
) -> Result<BootOutcome, InitError> {
    let mut trace = BootTrace::new();
    let mut degraded = heapless::Vec::new();

    // ── 1. Config store ───────────────────────────────────────
    let mut store = ConfigStore::open().map_err(InitError::ConfigStore)?;
    let _ = trace.push(BootStage::ConfigStore);

    let mut crash_log = CrashLog::new();
    crash_log.init(&store);
    let crashes = crash_log.read_all(&store);
    if !crashes.is_empty() {
        warn!("boot: {} crash entries in NVS", crashes.len());
    }

    // ── 2. Settings + supervisor listeners ────────────────────
    let status: &'static SystemStatus = Box::leak(Box::new(SystemStatus::new()));
    let shutdown: &'static ShutdownCoordinator =
        Box::leak(Box::new(ShutdownCoordinator::new(platform)));

    let snapshot = store.load_settings();
    let mut settings = SettingsRegistry::from_snapshot(&snapshot);
    settings
        .register_listener(
            KeyMatcher::Exact(SettingKey::PowerOff),
            Box::leak(Box::new(PowerOffListener::new(shutdown))),
        )
        .map_err(|_| InitError::Settings("listener table full"))?;
    settings
        .register_listener(
            KeyMatcher::Exact(SettingKey::RfPowerDbm),
            Box::leak(Box::new(LinkSettingsListener { status })),
        )
        .map_err(|_| InitError::Settings("listener table full"))?;
    let _ = trace.push(BootStage::SettingsReady);

    // ── 3. Network/transport prerequisites ────────────────────
    netif_init()?;
    let _ = trace.push(BootStage::NetifReady);

    // ── 4. Device address — gates link init ──────────────────
    let addr = store
        .device_address()
        .map_err(|_| InitError::AddressUnavailable)?;
    let id = device_id(&addr);
    info!("boot: device {id} ({addr})");
    let _ = trace.push(BootStage::AddressLoaded);

    // ── 5. Link protocol ──────────────────────────────────────
    let mut link = LinkProtocol::new();
    link.init(addr).map_err(InitError::Link)?;
    let _ = trace.push(BootStage::LinkReady);

    // ── 6. Persisted settings that configure the link ─────────
    link.set_rf_power(snapshot.rf_power_dbm);
    status.set_rf_power_dbm(snapshot.rf_power_dbm);
    status.mark_ready(Subsystem::Link);
    let _ = trace.push(BootStage::LinkSettingsApplied);

    // ── 7. Peer service ───────────────────────────────────────
    let mut peer = PeerService::new();
    peer.init(&link).map_err(InitError::Link)?;
    status.mark_ready(Subsystem::Peer);
    let _ = trace.push(BootStage::PeerReady);

    // ── 8. Control input + radio handle + companion path ──────
    let radio = Radio::new(RadioPins::board_default(), board.radio_bus);
    let mut rc = ControlInput::new(board.sampler);
    rc.init(&radio)?;
    status.mark_ready(Subsystem::ControlInput);
    let _ = trace.push(BootStage::ControlReady);

    let mut companion = CompanionLink::new(board.companion);
    companion.init(&id)?;
    status.mark_ready(Subsystem::Companion);
    let _ = trace.push(BootStage::CompanionReady);

    // ── 9. UI, strictly last ──────────────────────────────────
    let (ui, ui_degraded) = UiSystem::init(board.display, snapshot.screen_brightness);
    if let Some(d) = ui_degraded {
        warn!("boot: degraded start — {d}");
        let _ = degraded.push(d);
    }
    status.mark_ready(Subsystem::Ui);
    let _ = trace.push(BootStage::UiReady);

    // ── Assemble, leak, arm ───────────────────────────────────
    let ctx: &'static AppContext = Box::leak(Box::new(AppContext {
        settings,
        status,
        companion_input: InputMailbox::new(),
        link_tx: FrameRing::new(),
        config: TaskOwned::new(store),
        radio: TaskOwned::new(radio),
        rc: TaskOwned::new(rc),
        link: TaskOwned::new(link),
        peer: TaskOwned::new(peer),
        companion: TaskOwned::new(companion),
        ui: TaskOwned::new(ui),
    }));
    shutdown.arm(ctx);

    info!("boot: complete ({} stages)", trace.len());
    Ok(BootOutcome {
        ctx,
        shutdown,
        report: BootReport {
            trace,
            degraded,
            device_id: id,
        },
    })
}

#[cfg(target_os = "espidf")]
fn netif_init() -> Result<(), InitError> {
    // SAFETY: esp_netif_init is called once, single-threaded, at boot.
    let rc = unsafe { esp_idf_svc::sys::esp_netif_init() };
    if rc != esp_idf_svc::sys::ESP_OK {
        return Err(InitError::Netif(rc));
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn netif_init() -> Result<(), InitError> {
    Ok(())
}
