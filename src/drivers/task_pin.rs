//! Core-pinned task spawning for the ESP32-S3 dual-core.
//!
//! Wraps `esp_pthread_set_cfg()` so `std::thread::spawn` creates a
//! FreeRTOS task pinned to a fixed CPU core with an explicit priority and
//! stack budget.  Affinity is for the task's entire lifetime — there is
//! no migration and no dynamic task creation after boot.
//!
//! The config→spawn pair is thread-local state inside ESP-IDF's pthread
//! layer, so it must not be interleaved with other thread creation from
//! the same thread; the supervisor only ever spawns from the bootstrap
//! context, which is single-threaded.
//!
//! On non-ESP targets the core and priority are ignored and a plain
//! thread is spawned, keeping the task bodies host-testable.

/// CPU core identifiers for the ESP32-S3 Xtensa LX7 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU) — link protocol, companion link, UI.
    Pro = 0,
    /// Core 1 (APP_CPU) — the control-input loop, alone, so the radio
    /// IRQ it registers is serviced with no cross-core latency.
    App = 1,
}

/// Spawn a thread pinned to `core` with the given priority and stack.
///
/// `name` must be null-terminated (e.g. `"sky-rc\0"`); FreeRTOS takes it
/// as a raw C string.
#[cfg(target_os = "espidf")]
pub fn spawn_pinned(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    unsafe {
        let mut cfg = esp_idf_svc::sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as i32;
        cfg.prio = priority as i32;
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr() as *const _;
        let ret = esp_idf_svc::sys::esp_pthread_set_cfg(&cfg);
        assert!(
            ret == esp_idf_svc::sys::ESP_OK,
            "esp_pthread_set_cfg failed: {ret}"
        );
    }

    let display_name = name.trim_end_matches('\0');
    log::info!(
        "spawn '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
        .expect("spawn_pinned: thread creation failed")
}

/// Host fallback — no affinity, no priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_pinned(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    let display_name = name.trim_end_matches('\0');
    log::info!("spawn '{}' (host, no pinning)", display_name);

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .expect("spawn_pinned(host): thread creation failed")
}
