//! End-to-end supervisor scenarios: boot → task iterations → power-off.
//!
//! Drives the real task setup/step functions on dedicated threads (each
//! task identity is per-thread) against the simulation board.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use skylink::boot::{bring_up, BoardPorts};
use skylink::settings::{SettingKey, SettingValue};
use skylink::shutdown::{PlatformPort, ShutdownState};
use skylink::tasks::{
    companion_setup, companion_step, control_setup, control_step, link_setup, link_step, ui_setup,
    ui_step,
};

struct CountingPlatform {
    power_offs: Arc<AtomicU32>,
}

impl PlatformPort for CountingPlatform {
    fn power_off(&self) {
        self.power_offs.fetch_add(1, Ordering::SeqCst);
    }

    fn restart(&self) -> ! {
        unreachable!("no fatal faults in these scenarios");
    }
}

fn boot_sim() -> (skylink::boot::BootOutcome, Arc<AtomicU32>) {
    let power_offs = Arc::new(AtomicU32::new(0));
    let outcome = bring_up(
        BoardPorts::sim(),
        Box::new(CountingPlatform {
            power_offs: Arc::clone(&power_offs),
        }),
    )
    .unwrap();
    (outcome, power_offs)
}

#[test]
fn full_system_runs_through_all_four_tasks() {
    let (outcome, _) = boot_sim();
    let ctx = outcome.ctx;

    // Control task: radio driver init + 20 tight iterations.
    std::thread::spawn(move || {
        let mut state = control_setup(ctx);
        for _ in 0..20 {
            control_step(ctx, &mut state);
        }
        assert!(ctx.radio.with(|radio| radio.is_driver_ready()));
    })
    .join()
    .unwrap();
    assert!(ctx.status.rc_frames() >= 20);

    // Link task: starts the peer service, emits link state.
    std::thread::spawn(move || {
        let mut state = link_setup(ctx);
        for _ in 0..3 {
            link_step(ctx, &mut state);
        }
        assert!(ctx.peer.with(|peer| peer.is_started()));
    })
    .join()
    .unwrap();
    assert!(ctx.status.link_up());

    // Companion task: transport times out, stays inactive.
    std::thread::spawn(move || {
        let mut state = companion_setup(ctx);
        companion_step(ctx, &mut state);
    })
    .join()
    .unwrap();
    assert!(!ctx.status.companion_active());

    // UI task, last: splash + a few frames.
    std::thread::spawn(move || {
        let mut state = ui_setup(ctx);
        for _ in 0..5 {
            ui_step(ctx, &mut state);
        }
        assert!(ctx.ui.with(|ui| ui.screen_available()));
    })
    .join()
    .unwrap();
}

#[test]
fn power_off_from_an_arbitrary_task_halts_the_system_once() {
    let (outcome, power_offs) = boot_sim();
    let ctx = outcome.ctx;

    // Run the control task briefly so the radio is live before shutdown.
    std::thread::spawn(move || {
        let mut state = control_setup(ctx);
        control_step(ctx, &mut state);
    })
    .join()
    .unwrap();

    // Power-off arrives via the settings path from this (arbitrary)
    // thread, exactly like a companion command would deliver it.
    ctx.settings.set(SettingKey::PowerOff, SettingValue::Bool(true));

    assert_eq!(outcome.shutdown.state(), ShutdownState::Fired);
    assert_eq!(power_offs.load(Ordering::SeqCst), 1);

    // A second request from another task is a no-op.
    std::thread::spawn(move || outcome.shutdown.fire())
        .join()
        .unwrap();
    assert_eq!(power_offs.load(Ordering::SeqCst), 1);
}

#[test]
fn companion_frames_flow_into_the_control_loop() {
    use skylink::companion::{encode_frame, CompanionTransport};
    use skylink::context::InputFrame;
    use skylink::drivers::radio::SimRadioBus;
    use skylink::drivers::screen::SimScreen;
    use skylink::rc::SimSticks;

    struct OneShotTransport {
        frame: Option<Vec<u8>>,
    }

    impl CompanionTransport for OneShotTransport {
        fn recv(&mut self, buf: &mut [u8]) -> Option<usize> {
            let frame = self.frame.take()?;
            buf[..frame.len()].copy_from_slice(&frame);
            Some(frame.len())
        }
    }

    let wanted = InputFrame {
        channels: [111, 222, 333, 444],
    };
    let board = BoardPorts {
        radio_bus: Box::new(SimRadioBus::new()),
        display: Box::new(SimScreen::fitted()),
        companion: Box::new(OneShotTransport {
            frame: Some(encode_frame(&wanted).to_vec()),
        }),
        sampler: Box::new(SimSticks),
    };
    let power_offs = Arc::new(AtomicU32::new(0));
    let outcome = bring_up(
        board,
        Box::new(CountingPlatform {
            power_offs: Arc::clone(&power_offs),
        }),
    )
    .unwrap();
    let ctx = outcome.ctx;

    // Companion task receives and publishes the frame…
    std::thread::spawn(move || {
        let mut state = companion_setup(ctx);
        companion_step(ctx, &mut state);
    })
    .join()
    .unwrap();
    assert!(ctx.status.companion_active());

    // …and the control loop's next iteration flies with it.
    let channels = std::thread::spawn(move || {
        let mut state = control_setup(ctx);
        control_step(ctx, &mut state);
        ctx.rc.with(|rc| rc.channels())
    })
    .join()
    .unwrap();
    assert_eq!(channels, wanted.channels);
}
