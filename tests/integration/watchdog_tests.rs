//! Watchdog deadline semantics on the host simulation.

use skylink::watchdog::{DeadlineRenewal, SimWatchdog, WatchdogLease};
use std::time::{Duration, Instant};

#[test]
fn expiry_lands_between_deadline_and_deadline_plus_epsilon() {
    let deadline = Duration::from_millis(40);
    let epsilon = Duration::from_millis(60);

    let sim = SimWatchdog::new(deadline);
    let monitor = sim.clone();
    // Clock starts before the lease registers, so `tripped_after` can
    // never under-read the true withheld time.
    let withheld_from = Instant::now();
    let _lease = WatchdogLease::acquire(sim).unwrap();

    // Poll until the fault signal appears.
    let tripped_after = loop {
        if monitor.expired() {
            break withheld_from.elapsed();
        }
        assert!(
            withheld_from.elapsed() < deadline + epsilon,
            "watchdog never tripped"
        );
        std::thread::sleep(Duration::from_millis(1));
    };

    assert!(
        tripped_after >= deadline,
        "tripped early: {tripped_after:?} < {deadline:?}"
    );
    assert!(tripped_after <= deadline + epsilon);
}

#[test]
fn steady_renewal_never_trips() {
    let sim = SimWatchdog::new(Duration::from_millis(30));
    let monitor = sim.clone();
    let mut lease = WatchdogLease::acquire(sim).unwrap();

    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(120) {
        lease.renew();
        assert!(!monitor.expired());
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn renewal_through_the_strategy_trait_rearms() {
    let sim = SimWatchdog::new(Duration::from_millis(25));
    let monitor = sim.clone();
    let mut strategy: Box<dyn DeadlineRenewal> = Box::new(sim);
    strategy.register().unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert!(monitor.expired());

    strategy.renew();
    assert!(!monitor.expired());
    assert!(monitor.since_renew() < Duration::from_millis(25));
}
