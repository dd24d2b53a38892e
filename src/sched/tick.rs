//! Timer-tick engine.
//!
//! Runs in external interrupt context with interrupts disabled by the IRQ
//! entry, so everything here is bounded work: statistics, the MLFQ
//! bookkeeping cadence, round-robin aging, at most one sleeper wakeup, and
//! the preemption decision. Blocking and page allocation are off limits.

use crate::hal::Platform;

use super::manager::ThreadManager;
use super::priority::recalculated_priority;
use super::types::{QueueTag, SchedMode, ThreadStatus, PRI_MAX, TIME_SLICE};

impl ThreadManager {
    /// Timer interrupt hook. `ticks` is the timer's global tick count,
    /// which drives the once-per-four-ticks and once-per-second MLFQ
    /// cadences.
    pub fn tick(&mut self, ticks: i64) {
        debug_assert!(self.platform.in_interrupt());
        debug_assert_eq!(self.platform.intr_level(), crate::hal::IntrLevel::Off);

        let cur = self.current;

        // Statistics.
        if Some(cur) == self.idle {
            self.stats.idle_ticks += 1;
        } else if unsafe { cur.as_ref().user_space }.is_some() {
            self.stats.user_ticks += 1;
        } else {
            self.stats.kernel_ticks += 1;
        }

        let mut preempt = match self.mode {
            SchedMode::Mlfq => self.mlfq_account(ticks),
            SchedMode::RoundRobin => {
                self.age_ready_threads();
                false
            }
        };

        // Wake at most one expired sleeper this tick.
        if let Some(sleeper) = self.sleepers.tick() {
            unsafe {
                let thread = &mut *sleeper.as_ptr();
                thread.status = ThreadStatus::Ready;
                thread.queue = QueueTag::Ready;
            }
            self.ready.insert(sleeper);
            let woken = unsafe { sleeper.as_ref().priority };
            if woken > unsafe { cur.as_ref().priority } {
                preempt = true;
            }
        }

        // Enforce preemption on IRQ return.
        self.thread_ticks += 1;
        if self.thread_ticks >= TIME_SLICE || preempt {
            self.platform.yield_on_return();
        }
    }

    /// 4.4BSD bookkeeping: the running thread accumulates recent_cpu every
    /// tick; every fourth tick all priorities are recomputed (and READY
    /// threads relocated); once a second the load average and every
    /// thread's recent_cpu decay. Returns whether a relocation produced a
    /// thread that outranks the current one.
    fn mlfq_account(&mut self, ticks: i64) -> bool {
        let cur = self.current;
        if Some(cur) != self.idle {
            unsafe {
                let thread = &mut *cur.as_ptr();
                thread.recent_cpu = thread.recent_cpu.add_int(1);
            }
        }

        if ticks % 4 != 0 {
            return false;
        }
        let once_per_second = ticks % self.platform.timer_freq() == 0;

        if once_per_second {
            let runnable = self
                .all
                .iter()
                .filter(|&&t| {
                    matches!(
                        unsafe { t.as_ref().status },
                        ThreadStatus::Ready | ThreadStatus::Running
                    )
                })
                .count() as i32;
            let fp = crate::fixed::Fixed::from_int;
            self.load_avg = fp(59).div(fp(60)).mul(self.load_avg)
                + fp(1).div(fp(60)).mul(fp(runnable));
        }

        let mut preempt = false;
        for i in 0..self.all.len() {
            let t = self.all[i];
            let thread = unsafe { &mut *t.as_ptr() };
            if thread.status == ThreadStatus::Nascent {
                continue;
            }

            if once_per_second {
                let twice_load = self.load_avg.mul_int(2);
                thread.recent_cpu = twice_load
                    .div(twice_load.add_int(1))
                    .mul(thread.recent_cpu)
                    .add_int(thread.nice);
            }

            let old_priority = thread.priority;
            thread.priority = recalculated_priority(thread.recent_cpu, thread.nice);

            if thread.status == ThreadStatus::Ready && old_priority != thread.priority {
                self.ready.requeue(t, old_priority);
                if thread.priority > unsafe { self.current.as_ref().priority } {
                    preempt = true;
                }
            }
        }
        preempt
    }

    /// Round-robin starvation relief: every `TIME_SLICE * 4` ticks, every
    /// thread sitting on the ready list moves one step up, saturating at
    /// `PRI_MAX`.
    fn age_ready_threads(&mut self) {
        self.total_ticks += 1;
        if self.total_ticks % (TIME_SLICE as i64 * 4) != 0 {
            return;
        }
        for t in self.ready.iter() {
            let thread = unsafe { &mut *t.as_ptr() };
            if thread.priority < PRI_MAX {
                thread.priority += 1;
            }
        }
    }
}
