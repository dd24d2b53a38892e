//! The ready set: runnable threads not currently executing.
//!
//! One pluggable structure with two variants chosen at boot. Round-robin
//! keeps a single insertion-ordered queue and scans it for the maximum
//! priority on every pop (earliest-inserted wins ties); MLFQ keeps one FIFO
//! per priority and pops the head of the highest non-empty queue. Both
//! expose the same capability surface, so no caller branches on the mode.

use alloc::collections::VecDeque;
use core::ptr::NonNull;

use super::tcb::Thread;
use super::types::{SchedMode, NQ, PRI_MAX, PRI_MIN};

pub(crate) enum ReadySet {
    RoundRobin {
        queue: VecDeque<NonNull<Thread>>,
    },
    Mlfq {
        queues: [VecDeque<NonNull<Thread>>; NQ],
    },
}

impl ReadySet {
    pub fn new(mode: SchedMode) -> ReadySet {
        match mode {
            SchedMode::RoundRobin => ReadySet::RoundRobin {
                queue: VecDeque::new(),
            },
            SchedMode::Mlfq => ReadySet::Mlfq {
                queues: core::array::from_fn(|_| VecDeque::new()),
            },
        }
    }

    fn priority_of(t: NonNull<Thread>) -> i32 {
        let priority = unsafe { t.as_ref() }.priority;
        assert!((PRI_MIN..=PRI_MAX).contains(&priority));
        priority
    }

    /// Enqueues `t` behind its priority peers.
    pub fn insert(&mut self, t: NonNull<Thread>) {
        match self {
            ReadySet::RoundRobin { queue } => queue.push_back(t),
            ReadySet::Mlfq { queues } => queues[Self::priority_of(t) as usize].push_back(t),
        }
    }

    /// Detaches `t`. Panics if it is not enqueued (a membership-token
    /// violation).
    pub fn remove(&mut self, t: NonNull<Thread>) {
        let found = match self {
            ReadySet::RoundRobin { queue } => {
                let i = queue.iter().position(|&q| q == t);
                i.and_then(|i| queue.remove(i))
            }
            ReadySet::Mlfq { queues } => {
                let queue = &mut queues[Self::priority_of(t) as usize];
                let i = queue.iter().position(|&q| q == t);
                i.and_then(|i| queue.remove(i))
            }
        };
        assert!(found.is_some(), "thread not on the ready set");
    }

    /// Detaches and returns the highest-priority thread, FIFO among equals.
    pub fn pop_highest(&mut self) -> Option<NonNull<Thread>> {
        match self {
            ReadySet::RoundRobin { queue } => {
                let mut best: Option<(usize, i32)> = None;
                for (i, &t) in queue.iter().enumerate() {
                    let priority = Self::priority_of(t);
                    // Strict comparison keeps the earliest-inserted of a tie.
                    if best.map_or(true, |(_, b)| priority > b) {
                        best = Some((i, priority));
                    }
                }
                best.and_then(|(i, _)| queue.remove(i))
            }
            ReadySet::Mlfq { queues } => queues
                .iter_mut()
                .rev()
                .find(|q| !q.is_empty())
                .and_then(|q| q.pop_front()),
        }
    }

    /// Highest priority currently enqueued.
    pub fn find_highest(&self) -> Option<i32> {
        match self {
            ReadySet::RoundRobin { queue } => queue.iter().map(|&t| Self::priority_of(t)).max(),
            ReadySet::Mlfq { queues } => queues
                .iter()
                .enumerate()
                .rev()
                .find(|(_, q)| !q.is_empty())
                .map(|(i, _)| i as i32),
        }
    }

    /// Moves `t` from the FIFO for `old_priority` to the FIFO for its
    /// current priority. No-op in round-robin mode, where selection scans.
    pub fn requeue(&mut self, t: NonNull<Thread>, old_priority: i32) {
        if let ReadySet::Mlfq { queues } = self {
            let old = &mut queues[old_priority as usize];
            let i = old
                .iter()
                .position(|&q| q == t)
                .expect("thread not on its old priority queue");
            old.remove(i);
            queues[Self::priority_of(t) as usize].push_back(t);
        }
    }

    /// True if any FIFO in `(above, up_to]` holds a thread. MLFQ only; used
    /// by the supersession check when the current thread lowers itself.
    pub fn any_between(&self, above: i32, up_to: i32) -> bool {
        match self {
            ReadySet::RoundRobin { .. } => false,
            ReadySet::Mlfq { queues } => ((above + 1)..=up_to)
                .any(|priority| !queues[priority as usize].is_empty()),
        }
    }

    pub fn contains(&self, t: NonNull<Thread>) -> bool {
        self.iter().any(|q| q == t)
    }

    pub fn len(&self) -> usize {
        match self {
            ReadySet::RoundRobin { queue } => queue.len(),
            ReadySet::Mlfq { queues } => queues.iter().map(|q| q.len()).sum(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = NonNull<Thread>> + '_ {
        let (single, banded) = match self {
            ReadySet::RoundRobin { queue } => (Some(queue), None),
            ReadySet::Mlfq { queues } => (None, Some(queues)),
        };
        single
            .into_iter()
            .flatten()
            .chain(banded.into_iter().flat_map(|qs| qs.iter().flatten()))
            .copied()
    }

    /// Panics unless every MLFQ entry sits in the FIFO of its own current
    /// priority.
    pub fn verify(&self) {
        if let ReadySet::Mlfq { queues } = self {
            for (priority, queue) in queues.iter().enumerate() {
                for &t in queue {
                    assert_eq!(
                        Self::priority_of(t),
                        priority as i32,
                        "thread misfiled in the MLFQ"
                    );
                }
            }
        }
    }
}
