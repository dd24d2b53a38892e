//! Scheduler statistics and introspection.
//!
//! Tick accounting, per-status counts, a thread-table dump for debugging,
//! and a structural integrity check used by the test suite (and usable from
//! a debugger hook) to verify the scheduler's invariants hold after any
//! observable transition.

use super::manager::ThreadManager;
use super::types::{QueueTag, ThreadStatus, PRI_MAX, PRI_MIN};

/// Where timer ticks were spent.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchedStats {
    pub idle_ticks: u64,
    pub kernel_ticks: u64,
    pub user_ticks: u64,
}

impl SchedStats {
    pub const fn new() -> SchedStats {
        SchedStats {
            idle_ticks: 0,
            kernel_ticks: 0,
            user_ticks: 0,
        }
    }
}

/// Roster population by lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub nascent: usize,
    pub ready: usize,
    pub running: usize,
    pub blocked: usize,
}

impl ThreadManager {
    pub fn stats(&self) -> SchedStats {
        self.stats
    }

    /// Prints the tick statistics to the kernel log.
    pub fn print_stats(&self) {
        crate::kinfo!(
            "threads: {} idle ticks, {} kernel ticks, {} user ticks",
            self.stats.idle_ticks,
            self.stats.kernel_ticks,
            self.stats.user_ticks
        );
    }

    /// Counts roster threads by status. The idle thread is not enrolled
    /// and not counted.
    pub fn count_by_status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for &t in &self.all {
            match unsafe { t.as_ref().status } {
                ThreadStatus::Nascent => counts.nascent += 1,
                ThreadStatus::Ready => counts.ready += 1,
                ThreadStatus::Running => counts.running += 1,
                ThreadStatus::Blocked => counts.blocked += 1,
                ThreadStatus::Dying => unreachable!("dying thread on the roster"),
            }
        }
        counts
    }

    /// Dumps the thread table to the kernel log.
    pub fn list_threads(&self) {
        crate::kinfo!(
            "{:<5} {:<16} {:<8} {:<4} {:<5} {:<6}",
            "TID",
            "NAME",
            "STATUS",
            "PRI",
            "NICE",
            "SLEEP"
        );
        for &t in &self.all {
            let thread = unsafe { t.as_ref() };
            crate::kinfo!(
                "{:<5} {:<16} {:<8?} {:<4} {:<5} {:<6}",
                thread.tid,
                thread.name(),
                thread.status,
                thread.priority,
                thread.nice,
                thread.sleep_ticks
            );
        }
    }

    /// Asserts the scheduler's structural invariants: live magic, exactly
    /// one running thread, list membership agreeing with status and the
    /// membership token, priorities inside the band, and MLFQ threads filed
    /// under their own priority. Panics on any violation.
    pub fn verify_integrity(&self) {
        let mut running = 0;
        for &t in &self.all {
            let thread = unsafe { t.as_ref() };
            thread.check();
            assert!(
                (PRI_MIN..=PRI_MAX).contains(&thread.priority),
                "thread {} priority {} out of band",
                thread.tid,
                thread.priority
            );

            let on_ready = self.ready.contains(t);
            let on_wait = self.sleepers.contains(t);
            match thread.status {
                ThreadStatus::Running => {
                    running += 1;
                    assert_eq!(t, self.current, "running thread is not current");
                    assert!(!on_ready && !on_wait);
                    assert_eq!(thread.queue, QueueTag::None);
                }
                ThreadStatus::Ready => {
                    assert_eq!(thread.queue, QueueTag::Ready);
                    assert!(on_ready && !on_wait, "ready thread off the ready set");
                }
                ThreadStatus::Blocked => match thread.queue {
                    QueueTag::Waiting => {
                        assert!(on_wait && !on_ready, "sleeper off the wait set")
                    }
                    QueueTag::None => assert!(!on_ready && !on_wait),
                    QueueTag::Ready => panic!("blocked thread tagged ready"),
                },
                ThreadStatus::Nascent => {
                    assert_eq!(thread.queue, QueueTag::None);
                    assert!(!on_ready && !on_wait);
                }
                ThreadStatus::Dying => panic!("dying thread on the roster"),
            }
        }

        // Exactly one thread runs: the current one (which is off the
        // roster exactly when it is the idle thread).
        assert_eq!(unsafe { self.current.as_ref().status }, ThreadStatus::Running);
        if Some(self.current) == self.idle {
            assert_eq!(running, 0);
        } else {
            assert_eq!(running, 1);
        }

        // The idle thread is enrolled nowhere.
        if let Some(idle) = self.idle {
            assert!(!self.all.contains(&idle));
            assert!(!self.ready.contains(idle));
            assert!(!self.sleepers.contains(idle));
        }

        // Every enqueued pointer is a roster thread in the matching state,
        // and the lists hold nothing beyond those threads.
        for t in self.ready.iter() {
            assert!(self.all.contains(&t));
            assert_eq!(unsafe { t.as_ref().status }, ThreadStatus::Ready);
        }
        for t in self.sleepers.iter() {
            assert!(self.all.contains(&t));
            assert_eq!(unsafe { t.as_ref().status }, ThreadStatus::Blocked);
        }
        let ready_threads = self
            .all
            .iter()
            .filter(|&&t| unsafe { t.as_ref().status } == ThreadStatus::Ready)
            .count();
        assert_eq!(self.ready.len(), ready_threads);
        let sleeping_threads = self
            .all
            .iter()
            .filter(|&&t| {
                let thread = unsafe { t.as_ref() };
                thread.status == ThreadStatus::Blocked && thread.queue == QueueTag::Waiting
            })
            .count();
        assert_eq!(self.sleepers.len(), sleeping_threads);

        self.ready.verify();
    }
}
