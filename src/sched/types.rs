//! Scheduler type definitions and constants.

/// Lowest thread priority.
pub const PRI_MIN: i32 = 0;
/// Default priority for new threads.
pub const PRI_DEFAULT: i32 = 31;
/// Highest thread priority.
pub const PRI_MAX: i32 = 63;
/// Number of MLFQ priority queues.
pub const NQ: usize = (PRI_MAX + 1) as usize;

/// Timer ticks each thread gets before preemption.
pub const TIME_SLICE: u32 = 4;

/// Size of a kernel stack page; the TCB lives at its base.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel stored in every live TCB. A thread that overruns its stack
/// tramples this first.
pub const THREAD_MAGIC: u32 = 0x2e83_91f7;

/// Maximum thread name length, including truncation.
pub const THREAD_NAME_LEN: usize = 16;

/// Thread identifier.
pub type Tid = i32;

/// Returned by `create` when no page is available.
pub const TID_ERROR: Tid = -1;

/// Lifecycle state of a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Between TCB initialization and the first unblock.
    Nascent,
    /// On the ready set, waiting for the CPU.
    Ready,
    /// Executing. At most one thread at a time.
    Running,
    /// Off the CPU until an explicit unblock (or timer expiry for timed
    /// waits).
    Blocked,
    /// Exited; the successor frees the TCB page in the switch tail.
    Dying,
}

/// Which list a thread's membership token currently sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueTag {
    /// On no list (running, dying, nascent, or a non-timed block).
    None,
    /// On the ready set.
    Ready,
    /// On the wait set with a tick countdown.
    Waiting,
}

/// Scheduling policy, fixed at boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedMode {
    /// Priority round-robin with aging.
    RoundRobin,
    /// 4.4BSD-style multi-level feedback queue.
    Mlfq,
}

impl SchedMode {
    /// Parses the kernel command line; `-o mlfqs` selects the MLFQ
    /// scheduler, anything else the round-robin default.
    pub fn from_cmdline(cmdline: &str) -> SchedMode {
        let mut args = cmdline.split_whitespace();
        while let Some(arg) = args.next() {
            if arg == "-o" && args.next() == Some("mlfqs") {
                return SchedMode::Mlfq;
            }
        }
        SchedMode::RoundRobin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmdline_selects_mlfqs() {
        assert_eq!(SchedMode::from_cmdline(""), SchedMode::RoundRobin);
        assert_eq!(SchedMode::from_cmdline("-q run tests"), SchedMode::RoundRobin);
        assert_eq!(SchedMode::from_cmdline("-o mlfqs"), SchedMode::Mlfq);
        assert_eq!(
            SchedMode::from_cmdline("-q -o mlfqs run alarm-single"),
            SchedMode::Mlfq
        );
        // `mlfqs` must follow `-o`.
        assert_eq!(SchedMode::from_cmdline("mlfqs"), SchedMode::RoundRobin);
    }
}
