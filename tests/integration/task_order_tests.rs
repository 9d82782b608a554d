//! Task creation order and the UI-last guarantee.

use crate::mock_hw::{board, new_log, platform};
use skylink::boot::bring_up;
use skylink::context::TaskId;
use skylink::tasks::{self, companion_setup, companion_step, link_setup, link_step, ui_setup, ui_step};

#[test]
fn ui_task_is_spawned_strictly_last() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();

    let task_set = tasks::start_tasks(outcome.ctx);
    assert_eq!(
        task_set.spawn_order.as_slice(),
        &[
            TaskId::ControlInput,
            TaskId::CompanionLink,
            TaskId::LinkProtocol,
            TaskId::Ui,
        ]
    );
    assert_eq!(*task_set.spawn_order.last().unwrap(), TaskId::Ui);
}

#[test]
fn ui_first_update_observes_initialized_system() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let ctx = outcome.ctx;

    assert!(ctx.status.core_ready());

    // Would panic (debug assert) if any subsystem were missing.
    std::thread::spawn(move || {
        let mut state = ui_setup(ctx);
        ui_step(ctx, &mut state);
    })
    .join()
    .unwrap();
}

#[test]
fn peer_service_starts_on_first_link_iteration() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let ctx = outcome.ctx;

    std::thread::spawn(move || {
        let mut state = link_setup(ctx);
        assert!(!ctx.peer.with(|peer| peer.is_started()));
        link_step(ctx, &mut state);
        assert!(ctx.peer.with(|peer| peer.is_started()));
    })
    .join()
    .unwrap();
}

#[test]
fn companion_task_runs_without_sleeping_in_the_supervisor() {
    let log = new_log();
    let outcome = bring_up(board(&log), platform(&log)).unwrap();
    let ctx = outcome.ctx;

    // The scripted transport times out instantly, so N steps return
    // promptly — cadence belongs to the transport, not the task loop.
    std::thread::spawn(move || {
        let mut state = companion_setup(ctx);
        for _ in 0..10 {
            companion_step(ctx, &mut state);
        }
    })
    .join()
    .unwrap();

    assert!(!ctx.status.companion_active());
}
