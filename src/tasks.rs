//! The four long-lived tasks and their core/priority assignments.
//!
//! | Task            | Core | Priority | Cadence                          |
//! |-----------------|------|----------|----------------------------------|
//! | `sky-rc`        | APP  | 18       | tight loop, never sleeps         |
//! | `sky-link`      | PRO  | 12       | 10 ms sleep per iteration        |
//! | `sky-companion` | PRO  | 12       | governed by the blocking transport |
//! | `sky-ui`        | PRO  | 8        | tight while animating, else 10 ms |
//!
//! The control task never sleeps because it is the watchdog-critical,
//! lowest-latency path; everything else may.  The UI task is spawned
//! strictly last so it can never observe a half-initialized system.
//!
//! Each task is `setup` + `step`: the entry function loops over `step`
//! forever on the device, while the host test harness drives `step`
//! directly, one iteration at a time.

use log::{error, warn};

use crate::context::{AppContext, TaskId};
use crate::drivers::task_pin::{spawn_pinned, Core};
use crate::shutdown::{EspPlatform, PlatformPort};
use crate::time::MonotonicClock;
use crate::watchdog::{RegisterFeedRenewal, WatchdogLease};

/// Idle sleep for the tasks that are allowed to sleep.
pub const TASK_IDLE_SLEEP_MS: u64 = 10;

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    /// Null-terminated task name (FreeRTOS takes a raw C string).
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

pub const CONTROL_TASK: TaskSpec = TaskSpec {
    name: "sky-rc\0",
    core: Core::App,
    priority: 18,
    stack_kb: 8,
};

pub const LINK_TASK: TaskSpec = TaskSpec {
    name: "sky-link\0",
    core: Core::Pro,
    priority: 12,
    stack_kb: 8,
};

pub const COMPANION_TASK: TaskSpec = TaskSpec {
    name: "sky-companion\0",
    core: Core::Pro,
    priority: 12,
    stack_kb: 6,
};

pub const UI_TASK: TaskSpec = TaskSpec {
    name: "sky-ui\0",
    core: Core::Pro,
    priority: 8,
    stack_kb: 8,
};

// ---------------------------------------------------------------------------
// Control-input task (watchdog-critical)
// ---------------------------------------------------------------------------

pub struct ControlTaskState {
    clock: MonotonicClock,
    lease: WatchdogLease<RegisterFeedRenewal>,
}

/// Bind handles, initialize the radio driver **in this task's context**
/// so its interrupt is serviced on this core, and acquire the watchdog
/// lease.  Failures here mean the control loop cannot exist — fatal.
pub fn control_setup(ctx: &'static AppContext) -> ControlTaskState {
    TaskId::ControlInput.enter();
    ctx.radio.bind(TaskId::ControlInput);
    ctx.rc.bind(TaskId::ControlInput);

    if let Err(e) = ctx.radio.with(|radio| radio.driver_init()) {
        error!("rc task: radio driver init failed ({e}) — restarting");
        EspPlatform.restart();
    }

    let lease = match WatchdogLease::acquire(RegisterFeedRenewal::new()) {
        Ok(lease) => lease,
        Err(e) => {
            error!("rc task: watchdog lease rejected ({e}) — restarting");
            EspPlatform.restart();
        }
    };

    ControlTaskState {
        clock: MonotonicClock::new(),
        lease,
    }
}

/// One control-loop iteration: update, then renew the lease.  No sleep.
pub fn control_step(ctx: &'static AppContext, state: &mut ControlTaskState) {
    let now = state.clock.now_ms();
    ctx.rc.with(|rc| {
        ctx.radio.with(|radio| {
            rc.update(now, radio, &ctx.companion_input, &ctx.link_tx, ctx.status);
        });
    });
    state.lease.renew();
}

fn control_task_main(ctx: &'static AppContext) -> ! {
    let mut state = control_setup(ctx);
    loop {
        control_step(ctx, &mut state);
    }
}

// ---------------------------------------------------------------------------
// Link-protocol task
// ---------------------------------------------------------------------------

pub struct LinkTaskState {
    clock: MonotonicClock,
    peer_started: bool,
}

pub fn link_setup(ctx: &'static AppContext) -> LinkTaskState {
    TaskId::LinkProtocol.enter();
    ctx.link.bind(TaskId::LinkProtocol);
    ctx.peer.bind(TaskId::LinkProtocol);
    ctx.config.bind(TaskId::LinkProtocol);
    LinkTaskState {
        clock: MonotonicClock::new(),
        peer_started: false,
    }
}

/// One link iteration: start the peer service on the first pass, update
/// link + peer, persist settings when dirty.
pub fn link_step(ctx: &'static AppContext, state: &mut LinkTaskState) {
    let now = state.clock.now_ms();

    if !state.peer_started {
        state.peer_started = true;
        ctx.peer.with(|peer| peer.start());
    }

    let pairing = ctx.settings.pairing_enabled();
    ctx.link.with(|link| {
        link.update(now, &ctx.link_tx, ctx.status);
        ctx.peer.with(|peer| {
            peer.update(now, link, &ctx.link_tx, ctx.status, pairing);
        });
    });

    if ctx.settings.take_dirty() {
        let snapshot = ctx.settings.snapshot();
        ctx.config.with(|store| {
            if let Err(e) = store.save_settings(&snapshot) {
                warn!("link task: settings persist failed ({e})");
            }
        });
    }
}

fn link_task_main(ctx: &'static AppContext) -> ! {
    let mut state = link_setup(ctx);
    loop {
        link_step(ctx, &mut state);
        std::thread::sleep(std::time::Duration::from_millis(TASK_IDLE_SLEEP_MS));
    }
}

// ---------------------------------------------------------------------------
// Companion-link task
// ---------------------------------------------------------------------------

pub struct CompanionTaskState {
    clock: MonotonicClock,
}

pub fn companion_setup(ctx: &'static AppContext) -> CompanionTaskState {
    TaskId::CompanionLink.enter();
    ctx.companion.bind(TaskId::CompanionLink);
    CompanionTaskState {
        clock: MonotonicClock::new(),
    }
}

/// One companion iteration.  No sleep here — the transport's blocking
/// receive sets the cadence.
pub fn companion_step(ctx: &'static AppContext, state: &mut CompanionTaskState) {
    let now = state.clock.now_ms();
    ctx.companion.with(|companion| {
        companion.update(now, &ctx.companion_input, ctx.status);
    });
}

fn companion_task_main(ctx: &'static AppContext) -> ! {
    let mut state = companion_setup(ctx);
    loop {
        companion_step(ctx, &mut state);
    }
}

// ---------------------------------------------------------------------------
// UI task
// ---------------------------------------------------------------------------

pub struct UiTaskState {
    clock: MonotonicClock,
}

pub fn ui_setup(ctx: &'static AppContext) -> UiTaskState {
    TaskId::Ui.enter();
    ctx.ui.bind(TaskId::Ui);

    let state = UiTaskState {
        clock: MonotonicClock::new(),
    };
    let now = state.clock.now_ms();
    ctx.ui.with(|ui| {
        if ui.screen_available() {
            ui.splash(now);
        }
    });
    state
}

/// One UI iteration; returns whether an animation wants the tight loop.
pub fn ui_step(ctx: &'static AppContext, state: &mut UiTaskState) -> bool {
    let now = state.clock.now_ms();
    ctx.ui.with(|ui| {
        ui.update(now, &ctx.settings, ctx.status);
        ui.is_animating(now)
    })
}

fn ui_task_main(ctx: &'static AppContext) -> ! {
    let mut state = ui_setup(ctx);
    loop {
        let animating = ui_step(ctx, &mut state);
        if !animating {
            std::thread::sleep(std::time::Duration::from_millis(TASK_IDLE_SLEEP_MS));
        }
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

pub struct TaskSet {
    pub spawn_order: heapless::Vec<TaskId, 4>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

impl TaskSet {
    /// Park the caller for the life of the process.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Create the four tasks with their fixed affinities.  The UI task is
/// spawned strictly last, after every other task exists.
pub fn start_tasks(ctx: &'static AppContext) -> TaskSet {
    let mut spawn_order = heapless::Vec::new();
    let mut handles = Vec::with_capacity(4);

    let specs_and_mains: [(TaskSpec, fn(&'static AppContext) -> !, TaskId); 4] = [
        (CONTROL_TASK, control_task_main, TaskId::ControlInput),
        (COMPANION_TASK, companion_task_main, TaskId::CompanionLink),
        (LINK_TASK, link_task_main, TaskId::LinkProtocol),
        // UI last: it renders every other subsystem's state.
        (UI_TASK, ui_task_main, TaskId::Ui),
    ];

    for (spec, main, id) in specs_and_mains {
        let _ = spawn_order.push(id);
        handles.push(spawn_pinned(
            spec.core,
            spec.priority,
            spec.stack_kb,
            spec.name,
            move || main(ctx),
        ));
    }

    TaskSet {
        spawn_order,
        handles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_task_has_top_priority_on_its_own_core() {
        assert_eq!(CONTROL_TASK.core, Core::App);
        for spec in [LINK_TASK, COMPANION_TASK, UI_TASK] {
            assert_eq!(spec.core, Core::Pro);
            assert!(spec.priority < CONTROL_TASK.priority);
        }
    }

    #[test]
    fn ui_priority_is_lowest() {
        assert!(UI_TASK.priority < LINK_TASK.priority);
        assert!(UI_TASK.priority < COMPANION_TASK.priority);
    }
}
