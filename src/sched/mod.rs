//! Thread scheduling subsystem.
//!
//! Kestrel threads are kernel threads: each one owns a 4 KiB page holding
//! its control block and stack. The scheduler runs in one of two modes,
//! fixed at boot: priority round-robin with aging, or a 4.4BSD multi-level
//! feedback queue (`-o mlfqs` on the kernel command line).
//!
//! ## Module Organization
//!
//! - `types`: constants, statuses, the boot-time mode switch
//! - `tcb`: the page-embedded thread control block and dispatch frames
//! - `ready`: the dual-mode ready set
//! - `wait`: sleepers with tick countdowns
//! - `tid`: monotonic thread id allocation
//! - `manager`: lifecycle operations and the scheduler core
//! - `tick`: the timer-interrupt engine
//! - `priority`: priority/nice assignment and the MLFQ formula
//! - `stats`: tick accounting, debugging dumps, integrity checks
//!
//! [`ThreadManager`] is the subsystem's state and behavior; the free
//! functions below wrap the single global instance a kernel owns, in the
//! traditional `thread_*` naming. Tests drive `ThreadManager` instances
//! directly over the host simulation instead.

pub mod manager;
pub mod stats;
pub mod tcb;
pub mod types;

mod priority;
mod ready;
mod tick;
mod tid;
mod wait;

pub use manager::ThreadManager;
pub use stats::{SchedStats, StatusCounts};
pub use tcb::{Thread, ThreadFunc};
pub use types::{
    QueueTag, SchedMode, ThreadStatus, Tid, NQ, PAGE_SIZE, PRI_DEFAULT, PRI_MAX, PRI_MIN,
    THREAD_MAGIC, TID_ERROR, TIME_SLICE,
};

use alloc::string::String;
use alloc::sync::Arc;
use core::ptr::NonNull;

use spin::Mutex;

use crate::hal::{IntrLevel, Platform};

/// The kernel's one scheduler instance. On a single CPU the interrupt
/// discipline inside each operation already serializes the scheduler state;
/// the mutex guards the slot itself, the same way the teacher kernel guards
/// its process table.
static KERNEL: Mutex<Option<ThreadManager>> = Mutex::new(None);

fn with_kernel<R>(f: impl FnOnce(&mut ThreadManager) -> R) -> R {
    let mut slot = KERNEL.lock();
    f(slot.as_mut().expect("thread subsystem not initialized"))
}

/// Bootstraps the threading system by transforming the running context into
/// the initial thread. Call with interrupts off, after the page allocator
/// is usable and before any `thread_create`.
pub fn thread_init(platform: Arc<dyn Platform>, mode: SchedMode) {
    let mut slot = KERNEL.lock();
    assert!(slot.is_none(), "thread subsystem initialized twice");
    *slot = Some(ThreadManager::new(platform, mode));
}

/// Spawns the idle thread and starts preemptive scheduling.
pub fn thread_start() {
    with_kernel(|kernel| kernel.start())
}

/// Creates a named kernel thread; returns its tid or `TID_ERROR`.
pub fn thread_create(name: &str, priority: i32, function: ThreadFunc, aux: *mut u8) -> Tid {
    with_kernel(|kernel| kernel.create(name, priority, function, aux))
}

/// The running thread's control block, sanity-checked.
pub fn thread_current() -> NonNull<Thread> {
    with_kernel(|kernel| NonNull::from(kernel.current()))
}

/// The running thread's tid.
pub fn thread_tid() -> Tid {
    with_kernel(|kernel| kernel.current_tid())
}

/// The running thread's name.
pub fn thread_name() -> String {
    with_kernel(|kernel| String::from(kernel.current().name()))
}

/// Blocks the running thread; interrupts must already be off.
pub fn thread_block() {
    with_kernel(|kernel| kernel.block())
}

/// Makes a blocked thread runnable again.
pub fn thread_unblock(tid: Tid) {
    with_kernel(|kernel| {
        let t = kernel.find(tid).expect("unblocking an unknown tid");
        kernel.unblock(t);
    })
}

/// Yields the CPU to the scheduler's next pick.
pub fn thread_yield() {
    with_kernel(|kernel| kernel.yield_now())
}

/// Sleeps the running thread for `ticks` timer ticks; interrupts must be
/// off.
pub fn thread_wait(ticks: i64) {
    with_kernel(|kernel| kernel.wait(ticks))
}

/// Exits the running thread. On real hardware this never returns.
pub fn thread_exit() {
    with_kernel(|kernel| kernel.exit())
}

pub fn thread_set_priority(priority: i32) {
    with_kernel(|kernel| kernel.set_priority(priority))
}

pub fn thread_get_priority() -> i32 {
    with_kernel(|kernel| kernel.priority())
}

pub fn thread_set_nice(nice: i32) {
    with_kernel(|kernel| kernel.set_nice(nice))
}

pub fn thread_get_nice() -> i32 {
    with_kernel(|kernel| kernel.nice())
}

/// 100 times the system load average.
pub fn thread_get_load_avg() -> i32 {
    with_kernel(|kernel| kernel.load_avg_x100())
}

/// 100 times the running thread's recent_cpu.
pub fn thread_get_recent_cpu() -> i32 {
    with_kernel(|kernel| kernel.recent_cpu_x100())
}

/// Visits every roster thread; interrupts must be off.
pub fn thread_foreach(f: impl FnMut(&mut Thread)) {
    with_kernel(|kernel| kernel.for_each(f))
}

/// Timer interrupt hook; invoked only by the timer IRQ.
pub fn thread_tick(ticks: i64) {
    with_kernel(|kernel| kernel.tick(ticks))
}

/// Prints tick statistics to the kernel log.
pub fn thread_print_stats() {
    with_kernel(|kernel| kernel.print_stats())
}

/// Basis of every kernel thread: the dispatch frames built at creation
/// return into here on the thread's first run.
pub extern "C" fn kernel_thread(function: ThreadFunc, aux: *mut u8) {
    // The scheduler hands new threads the CPU with interrupts off.
    with_kernel(|kernel| kernel.platform().intr_restore(IntrLevel::On));
    function(aux);
    thread_exit();
}

/// Body of the idle thread: give the CPU away, then halt until the next
/// interrupt gives the scheduler something to do.
pub(crate) extern "C" fn idle_main(_aux: *mut u8) {
    loop {
        let platform = with_kernel(|kernel| kernel.platform().clone());
        platform.intr_disable();
        with_kernel(|kernel| kernel.block());
        // Re-enabling interrupts and halting must be one atomic step, or a
        // wakeup arriving in between is lost for a full tick.
        platform.enable_and_halt();
    }
}
