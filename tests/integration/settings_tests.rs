//! Settings dispatch across the booted system: listener order, the
//! rf-power chain (listener → status atomic → radio), and persistence
//! by the link task.

use crate::mock_hw::{board, new_log, platform};
use skylink::boot::bring_up;
use skylink::config::SettingsSnapshot;
use skylink::settings::{
    KeyMatcher, SettingChange, SettingKey, SettingListener, SettingValue, SettingsRegistry,
};
use skylink::tasks::{control_setup, control_step, link_setup, link_step};
use std::sync::Mutex;

struct OrderProbe {
    tag: u8,
    seen: &'static Mutex<Vec<u8>>,
}

impl SettingListener for OrderProbe {
    fn on_setting_changed(&self, _change: &SettingChange) {
        self.seen.lock().unwrap().push(self.tag);
    }
}

#[test]
fn three_listeners_fire_once_each_in_registration_order() {
    let seen: &'static Mutex<Vec<u8>> = Box::leak(Box::new(Mutex::new(Vec::new())));
    let mut registry = SettingsRegistry::from_snapshot(&SettingsSnapshot::default());

    for tag in [10, 20, 30] {
        registry
            .register_listener(
                KeyMatcher::Exact(SettingKey::ScreenBrightness),
                Box::leak(Box::new(OrderProbe { tag, seen })),
            )
            .unwrap();
    }

    registry.set(SettingKey::ScreenBrightness, SettingValue::U8(7));
    assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
}

#[test]
fn rf_power_setting_reaches_the_radio_via_status() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let ctx = outcome.ctx;

    // Changed from an arbitrary caller task (this test thread).
    ctx.settings.set(SettingKey::RfPowerDbm, SettingValue::U8(8));
    assert_eq!(ctx.status.rf_power_dbm(), 8);

    // The control task applies the pending value on its next iteration.
    let applied = std::thread::spawn(move || {
        let mut state = control_setup(ctx);
        control_step(ctx, &mut state);
        ctx.radio.with(|radio| radio.tx_power_dbm())
    })
    .join()
    .unwrap();
    assert_eq!(applied, 8);
}

#[test]
fn link_task_persists_dirty_settings() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let ctx = outcome.ctx;

    ctx.settings
        .set(SettingKey::PairingEnabled, SettingValue::Bool(true));

    std::thread::spawn(move || {
        let mut state = link_setup(ctx);
        link_step(ctx, &mut state);
        // The dirty flag was consumed and the snapshot written back: a
        // reload from the store sees the new value.
        let reloaded = ctx.config.with(|store| store.load_settings());
        assert!(reloaded.pairing_enabled);
    })
    .join()
    .unwrap();

    assert!(!ctx.settings.take_dirty(), "dirty flag consumed by link task");
}

#[test]
fn listener_runs_on_the_calling_task() {
    let seen: &'static Mutex<Vec<String>> = Box::leak(Box::new(Mutex::new(Vec::new())));

    struct CallerProbe {
        seen: &'static Mutex<Vec<String>>,
    }
    impl SettingListener for CallerProbe {
        fn on_setting_changed(&self, _change: &SettingChange) {
            let name = std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string();
            self.seen.lock().unwrap().push(name);
        }
    }

    let mut registry = SettingsRegistry::from_snapshot(&SettingsSnapshot::default());
    registry
        .register_listener(
            KeyMatcher::Exact(SettingKey::BeeperEnabled),
            Box::leak(Box::new(CallerProbe { seen })),
        )
        .unwrap();
    let registry: &'static SettingsRegistry = Box::leak(Box::new(registry));

    std::thread::Builder::new()
        .name("caller-a".into())
        .spawn(move || registry.set(SettingKey::BeeperEnabled, SettingValue::Bool(false)))
        .unwrap()
        .join()
        .unwrap();
    std::thread::Builder::new()
        .name("caller-b".into())
        .spawn(move || registry.set(SettingKey::BeeperEnabled, SettingValue::Bool(true)))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["caller-a", "caller-b"]);
}
