//! The global `thread_*` kernel facade, driven once end to end.
//!
//! The facade wraps the kernel's single scheduler instance, so everything
//! here lives in one test function; concurrent tests would otherwise race
//! on initialization.

use std::ptr::null_mut;
use std::sync::Arc;

use kestrel_os::hal::Platform;
use kestrel_os::logger;
use kestrel_os::sched::{self, SchedMode, TID_ERROR};
use kestrel_os::sim::SimPlatform;

extern "C" fn noop(_aux: *mut u8) {}

#[test]
fn kernel_facade_end_to_end() {
    logger::init(log::LevelFilter::Debug);
    let platform = Arc::new(SimPlatform::new(100));

    sched::thread_init(platform.clone(), SchedMode::RoundRobin);
    sched::thread_start();
    assert_eq!(sched::thread_tid(), 1);
    assert_eq!(sched::thread_name(), "main");
    assert_eq!(sched::thread_get_priority(), 31);

    // The TCB accessor agrees with the scalar readouts.
    let current = sched::thread_current();
    assert_eq!(unsafe { current.as_ref() }.tid, 1);
    assert_eq!(unsafe { current.as_ref() }.name(), "main");

    // A higher-priority creation takes the CPU before create returns.
    let worker = sched::thread_create("worker", 40, noop, null_mut());
    assert_ne!(worker, TID_ERROR);
    assert_eq!(sched::thread_tid(), worker);
    assert_eq!(sched::thread_name(), "worker");
    assert_eq!(sched::thread_get_priority(), 40);

    // Lowering below the ready maximum hands the CPU back.
    sched::thread_set_priority(20);
    assert_eq!(sched::thread_tid(), 1);

    // Main parks on the wait set; the demoted worker gets its turn, exits,
    // and leaves the CPU to the idle fallback.
    platform.intr_disable();
    sched::thread_wait(3);
    assert_eq!(sched::thread_tid(), worker);
    sched::thread_exit();
    assert_eq!(sched::thread_name(), "idle");

    // The timer drains the wait set; the IRQ-return yield resumes main.
    for t in 1..=3 {
        platform.begin_irq();
        sched::thread_tick(t);
        platform.end_irq();
        platform.take_yield_request();
    }
    sched::thread_yield();
    assert_eq!(sched::thread_tid(), 1);

    // Round-robin mode: nice/load interfaces stay inert.
    sched::thread_set_nice(10);
    assert_eq!(sched::thread_get_nice(), 0);
    assert_eq!(sched::thread_get_load_avg(), 0);
    assert_eq!(sched::thread_get_recent_cpu(), 0);

    // Roster traversal sees exactly the surviving initial thread.
    platform.intr_disable();
    let mut names = Vec::new();
    sched::thread_foreach(|t| names.push(String::from(t.name())));
    assert_eq!(names, ["main"]);

    sched::thread_print_stats();
    let mut out = [0u8; 4096];
    let n = logger::snapshot(&mut out);
    let text = std::str::from_utf8(&out[..n]).unwrap();
    assert!(text.contains("idle ticks"));
    assert!(text.contains("thread scheduler online"));
}
