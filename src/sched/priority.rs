//! Priority assignment and the MLFQ readouts.
//!
//! The MLFQ priority formula is `PRI_MAX - recent_cpu/4 - 2*nice`, computed
//! in 17.14 fixed point, rounded to nearest on the final conversion, and
//! clamped into the valid band. Setting a priority (directly in round-robin
//! mode, or through nice in MLFQ mode) ends with a supersession check: the
//! caller volunteers the CPU as soon as a strictly higher-priority peer sits
//! on the ready set.

use crate::fixed::Fixed;
use crate::hal::Platform;

use super::manager::ThreadManager;
use super::types::{SchedMode, PRI_MAX, PRI_MIN};

/// Derives a thread's MLFQ priority from its CPU-use estimate and niceness.
pub(crate) fn recalculated_priority(recent_cpu: Fixed, nice: i32) -> i32 {
    let raw = Fixed::from_int(PRI_MAX) - recent_cpu.div_int(4) - Fixed::from_int(nice).mul_int(2);
    raw.round_to_int().clamp(PRI_MIN, PRI_MAX)
}

impl ThreadManager {
    /// Sets the current thread's priority. A no-op under MLFQ, where
    /// priorities are computed, not assigned. While the thread holds
    /// donated priority, a non-raising change only updates the base so the
    /// donation is not lost.
    pub fn set_priority(&mut self, new_priority: i32) {
        if self.mode == SchedMode::Mlfq {
            return;
        }
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&new_priority),
            "priority {} out of range",
            new_priority
        );

        let cur = unsafe { &mut *self.current.as_ptr() };
        if cur.donors > 0 && new_priority <= cur.priority {
            cur.base_priority = new_priority;
        } else {
            self.assign_priority(new_priority);
        }
    }

    /// Common path for priority updates, shared by `set_priority` and
    /// `set_nice`, ending in the supersession check.
    fn assign_priority(&mut self, new_priority: i32) {
        let old_level = self.platform.intr_disable();

        let old_priority;
        {
            let cur = unsafe { &mut *self.current.as_ptr() };
            old_priority = cur.priority;
            cur.priority = new_priority;
            if self.mode == SchedMode::RoundRobin {
                cur.base_priority = new_priority;
            }
        }

        match self.mode {
            SchedMode::RoundRobin => {
                if let Some(top) = self.ready.find_highest() {
                    if new_priority < top {
                        self.yield_now();
                    }
                }
            }
            SchedMode::Mlfq => {
                // Lowering ourselves can expose a peer in one of the bands
                // we just fell through.
                if new_priority < old_priority
                    && self.ready.any_between(new_priority, old_priority)
                {
                    self.yield_now();
                }
            }
        }

        self.platform.intr_restore(old_level);
    }

    /// Sets the current thread's niceness (MLFQ only), recomputes its
    /// priority, and applies the supersession check.
    pub fn set_nice(&mut self, nice: i32) {
        if self.mode != SchedMode::Mlfq {
            return;
        }
        let nice = nice.clamp(-20, 20);

        let old_level = self.platform.intr_disable();
        let recomputed = {
            let cur = unsafe { &mut *self.current.as_ptr() };
            cur.nice = nice;
            recalculated_priority(cur.recent_cpu, cur.nice)
        };
        self.assign_priority(recomputed);
        self.platform.intr_restore(old_level);
    }

    /// The current thread's effective priority.
    pub fn priority(&self) -> i32 {
        self.current().priority
    }

    /// The current thread's niceness.
    pub fn nice(&self) -> i32 {
        self.current().nice
    }

    /// 100 times the system load average, rounded to nearest.
    pub fn load_avg_x100(&self) -> i32 {
        let old_level = self.platform.intr_disable();
        let value = self.load_avg.mul_int(100).round_to_int();
        self.platform.intr_restore(old_level);
        value
    }

    /// 100 times the current thread's recent_cpu, rounded to nearest.
    pub fn recent_cpu_x100(&self) -> i32 {
        let old_level = self.platform.intr_disable();
        let value = self.current().recent_cpu.mul_int(100).round_to_int();
        self.platform.intr_restore(old_level);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_thread_computes_to_pri_max() {
        assert_eq!(recalculated_priority(Fixed::ZERO, 0), PRI_MAX);
    }

    #[test]
    fn nice_costs_two_priority_steps() {
        assert_eq!(recalculated_priority(Fixed::ZERO, 1), PRI_MAX - 2);
        assert_eq!(recalculated_priority(Fixed::ZERO, 5), PRI_MAX - 10);
    }

    #[test]
    fn recent_cpu_costs_a_quarter_step_each() {
        assert_eq!(recalculated_priority(Fixed::from_int(4), 0), PRI_MAX - 1);
        assert_eq!(recalculated_priority(Fixed::from_int(40), 0), PRI_MAX - 10);
    }

    #[test]
    fn result_is_clamped_to_the_band() {
        assert_eq!(recalculated_priority(Fixed::from_int(10_000), 20), PRI_MIN);
        assert_eq!(recalculated_priority(Fixed::ZERO, -20), PRI_MAX);
    }

    #[test]
    fn final_conversion_rounds_to_nearest() {
        // recent_cpu = 2 -> 2/4 = 0.5 below PRI_MAX, which rounds up to
        // PRI_MAX itself.
        assert_eq!(recalculated_priority(Fixed::from_int(2), 0), PRI_MAX);
        // recent_cpu = 3 -> 0.75 below, rounds to PRI_MAX - 1.
        assert_eq!(recalculated_priority(Fixed::from_int(3), 0), PRI_MAX - 1);
    }
}
