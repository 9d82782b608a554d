//! Shutdown latch idempotence and the fixed teardown order.

use crate::mock_hw::{board, log_entries, new_log, platform};
use skylink::boot::bring_up;
use skylink::settings::{SettingKey, SettingValue};
use skylink::shutdown::ShutdownState;
use skylink::tasks::{control_setup, control_step};

#[test]
fn teardown_order_is_radio_then_ui_then_platform() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();

    // Bring the radio driver up first so there is something to power down.
    let ctx = outcome.ctx;
    std::thread::spawn(move || {
        let mut state = control_setup(ctx);
        control_step(ctx, &mut state);
    })
    .join()
    .unwrap();

    assert!(outcome.shutdown.fire());

    let entries = log_entries(&log);
    let teardown: Vec<&String> = entries
        .iter()
        .filter(|e| matches!(e.as_str(), "radio-off" | "ui-off" | "platform-off"))
        .collect();
    assert_eq!(teardown, ["radio-off", "ui-off", "platform-off"]);
}

#[test]
fn second_trigger_is_a_no_op() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();

    assert!(outcome.shutdown.fire());
    assert!(!outcome.shutdown.fire());

    let count = log_entries(&log)
        .iter()
        .filter(|e| *e == "platform-off")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn concurrent_triggers_from_two_tasks_fire_once() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let shutdown = outcome.shutdown;

    let threads: Vec<_> = (0..2)
        .map(|_| std::thread::spawn(move || shutdown.fire()))
        .collect();
    let wins: Vec<bool> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(wins.iter().filter(|w| **w).count(), 1);
    assert_eq!(shutdown.state(), ShutdownState::Fired);
    let count = log_entries(&log)
        .iter()
        .filter(|e| *e == "platform-off")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn power_off_setting_triggers_the_coordinator() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();

    outcome
        .ctx
        .settings
        .set(SettingKey::PowerOff, SettingValue::Bool(true));

    assert_eq!(outcome.shutdown.state(), ShutdownState::Fired);
    assert!(log_entries(&log).iter().any(|e| e == "platform-off"));

    // Writing the same value again dispatches nothing and the latch
    // holds: still exactly one platform power-off.
    outcome
        .ctx
        .settings
        .set(SettingKey::PowerOff, SettingValue::Bool(true));
    let count = log_entries(&log)
        .iter()
        .filter(|e| *e == "platform-off")
        .count();
    assert_eq!(count, 1);
}
