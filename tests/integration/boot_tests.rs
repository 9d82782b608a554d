//! Bootstrap ordering and degraded-start behavior.

use crate::mock_hw::{board, board_without_display, log_entries, new_log, platform};
use skylink::boot::{bring_up, BootStage};
use skylink::error::DegradedStart;
use skylink::tasks::{control_setup, control_step, ui_setup, ui_step};

fn position(trace: &[BootStage], stage: BootStage) -> usize {
    trace.iter().position(|s| *s == stage).unwrap()
}

#[test]
fn config_store_precedes_address_precedes_link() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let trace = &outcome.report.trace;

    assert!(position(trace, BootStage::ConfigStore) < position(trace, BootStage::AddressLoaded));
    assert!(position(trace, BootStage::AddressLoaded) < position(trace, BootStage::LinkReady));
    assert!(position(trace, BootStage::LinkReady) < position(trace, BootStage::PeerReady));
    assert_eq!(*trace.last().unwrap(), BootStage::UiReady);
}

#[test]
fn radio_probe_happens_in_control_task_not_bootstrap() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();

    assert!(
        !log_entries(&log).iter().any(|e| e == "radio-probe"),
        "bootstrap must not touch the radio driver"
    );

    let ctx = outcome.ctx;
    std::thread::spawn(move || {
        let mut state = control_setup(ctx);
        control_step(ctx, &mut state);
    })
    .join()
    .unwrap();

    assert!(
        log_entries(&log).iter().any(|e| e == "radio-probe"),
        "control task setup initializes the radio driver"
    );
}

#[test]
fn degraded_boot_without_display_still_starts_ui() {
    let log = new_log();
    let outcome = bring_up(board_without_display(&log), platform(&log)).unwrap();

    assert_eq!(
        outcome.report.degraded.as_slice(),
        &[DegradedStart::DisplayAbsent]
    );

    // The UI task still starts and runs; no splash, no render calls.
    let ctx = outcome.ctx;
    std::thread::spawn(move || {
        let mut state = ui_setup(ctx);
        for _ in 0..3 {
            ui_step(ctx, &mut state);
        }
    })
    .join()
    .unwrap();

    let entries = log_entries(&log);
    assert!(!entries.iter().any(|e| e == "ui-splash"));
    assert!(!entries.iter().any(|e| e == "ui-render"));
}

#[test]
fn fitted_display_gets_exactly_one_splash() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();

    let ctx = outcome.ctx;
    std::thread::spawn(move || {
        let mut state = ui_setup(ctx);
        ui_step(ctx, &mut state);
    })
    .join()
    .unwrap();

    let splashes = log_entries(&log).iter().filter(|e| *e == "ui-splash").count();
    assert_eq!(splashes, 1);
}

#[test]
fn boot_reports_device_identity() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    assert!(outcome.report.device_id.starts_with("SL-"));
}
