//! Thread lifecycle and the scheduler core.
//!
//! `ThreadManager` owns every scheduling structure: the ready set, the wait
//! set, the roster of live threads, the current/idle/initial thread
//! pointers, the load average, and the tick statistics. All mutation happens
//! with interrupts disabled through the platform; on a single CPU that is
//! the entire locking story.
//!
//! TCBs are raw pages, so the manager works in `NonNull<Thread>` and keeps
//! the unsafety in small, checked accessors. Every pointer it hands out was
//! produced by `Thread::init` on a page the manager owns.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ptr;
use core::ptr::NonNull;

use crate::hal::{IntrLevel, Platform};

use super::priority::recalculated_priority;
use super::ready::ReadySet;
use super::stats::SchedStats;
use super::tcb::{Thread, ThreadFunc};
use super::tid::TidAllocator;
use super::types::{QueueTag, SchedMode, ThreadStatus, Tid, PRI_DEFAULT, PRI_MIN, TID_ERROR};
use super::wait::WaitList;

pub struct ThreadManager {
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) mode: SchedMode,
    pub(crate) ready: ReadySet,
    pub(crate) sleepers: WaitList,
    /// Every live thread except idle, from TCB init until exit.
    pub(crate) all: Vec<NonNull<Thread>>,
    pub(crate) current: NonNull<Thread>,
    pub(crate) idle: Option<NonNull<Thread>>,
    pub(crate) initial: NonNull<Thread>,
    tids: TidAllocator,
    pub(crate) load_avg: crate::fixed::Fixed,
    pub(crate) stats: SchedStats,
    /// Ticks since the running thread was handed the CPU.
    pub(crate) thread_ticks: u32,
    /// Global tick count driving round-robin aging.
    pub(crate) total_ticks: i64,
}

// Raw TCB pointers are only ever touched under the interrupt discipline;
// there is no second CPU to race with.
unsafe impl Send for ThreadManager {}

impl ThreadManager {
    /// Transforms the running context into the initial thread, named
    /// `"main"`. Interrupts must be off and the page allocator usable.
    pub fn new(platform: Arc<dyn Platform>, mode: SchedMode) -> ThreadManager {
        assert_eq!(platform.intr_level(), IntrLevel::Off);

        let page = platform
            .alloc_page()
            .expect("no page for the initial thread");
        let initial = unsafe { Thread::init(page, "main", PRI_DEFAULT, ptr::null_mut()) };
        unsafe {
            let main = &mut *initial.as_ptr();
            main.parent = initial.as_ptr();
            main.status = ThreadStatus::Running;
            if mode == SchedMode::Mlfq {
                // nice and recent_cpu start at zero; the derived priority
                // replaces the round-robin default.
                main.priority = recalculated_priority(main.recent_cpu, main.nice);
                main.base_priority = main.priority;
            }
        }

        let tids = TidAllocator::new();
        unsafe { (*initial.as_ptr()).tid = tids.allocate() };

        let mut all = Vec::new();
        all.push(initial);

        crate::kinfo!("thread scheduler online ({:?} mode)", mode);

        ThreadManager {
            platform,
            mode,
            ready: ReadySet::new(mode),
            sleepers: WaitList::new(),
            all,
            current: initial,
            idle: None,
            initial,
            tids,
            load_avg: crate::fixed::Fixed::ZERO,
            stats: SchedStats::new(),
            thread_ticks: 0,
            total_ticks: 0,
        }
    }

    /// Spawns the idle thread and starts preemptive scheduling by enabling
    /// interrupts. Idle never sits on the ready set or the roster; it is
    /// handed the CPU only as the empty-ready fallback.
    pub fn start(&mut self) {
        assert!(self.idle.is_none(), "thread scheduling already started");

        let (_, idle) = self
            .spawn("idle", PRI_MIN, super::idle_main, ptr::null_mut())
            .expect("no page for the idle thread");

        self.ready.remove(idle);
        self.all.retain(|&t| t != idle);
        unsafe {
            (*idle.as_ptr()).status = ThreadStatus::Blocked;
            (*idle.as_ptr()).queue = QueueTag::None;
        }
        self.idle = Some(idle);

        self.platform.intr_restore(IntrLevel::On);
    }

    /// Creates a kernel thread running `function(aux)` and hands back its
    /// tid, or `TID_ERROR` when no page is available. The new thread may be
    /// scheduled (and may even exit) before this returns.
    pub fn create(&mut self, name: &str, priority: i32, function: ThreadFunc, aux: *mut u8) -> Tid {
        match self.spawn(name, priority, function, aux) {
            Some((tid, _)) => tid,
            None => TID_ERROR,
        }
    }

    fn spawn(
        &mut self,
        name: &str,
        priority: i32,
        function: ThreadFunc,
        aux: *mut u8,
    ) -> Option<(Tid, NonNull<Thread>)> {
        let Some(page) = self.platform.alloc_page() else {
            crate::kwarn!("thread '{}' not created: out of pages", name);
            return None;
        };

        let t = self.init_thread(page, name, priority);
        let tid = self.tids.allocate();
        unsafe {
            let thread = &mut *t.as_ptr();
            thread.tid = tid;
            thread.build_initial_frames(
                function,
                aux,
                super::kernel_thread as usize,
                self.platform.switch_entry(),
            );
            // The saved stack top sits inside the page, so it must recover
            // its own TCB.
            debug_assert!(ptr::eq(Thread::from_stack_ptr(thread.stack), t.as_ptr()));
        }

        crate::kdebug!("created thread {} '{}' priority {}", tid, name, unsafe {
            t.as_ref().priority
        });

        // The tid is pinned down before unblocking: a higher-priority
        // creation runs immediately and may exit (and be reaped) before
        // control comes back here.
        self.unblock(t);
        Some((tid, t))
    }

    /// Basic TCB initialization plus roster enrollment. In MLFQ mode a new
    /// thread inherits its creator's nice and recent_cpu and derives its
    /// priority from them; the idle thread keeps its argument priority.
    fn init_thread(&mut self, page: NonNull<u8>, name: &str, priority: i32) -> NonNull<Thread> {
        let t = unsafe { Thread::init(page, name, priority, self.current.as_ptr()) };

        if self.mode == SchedMode::Mlfq {
            let creator = unsafe { self.current.as_ref() };
            let thread = unsafe { &mut *t.as_ptr() };
            if thread.name() != "main" {
                thread.nice = creator.nice;
                thread.recent_cpu = creator.recent_cpu;
            }
            if thread.name() != "idle" {
                thread.priority = recalculated_priority(thread.recent_cpu, thread.nice);
                thread.base_priority = thread.priority;
            }
        }

        let old_level = self.platform.intr_disable();
        self.all.push(t);
        self.platform.intr_restore(old_level);
        t
    }

    /// Puts the current thread to sleep until somebody unblocks it. Must be
    /// called with interrupts off; the synchronization primitives layered
    /// above are usually the better interface.
    pub fn block(&mut self) {
        assert!(!self.platform.in_interrupt());
        assert_eq!(self.platform.intr_level(), IntrLevel::Off);

        unsafe { (*self.current.as_ptr()).status = ThreadStatus::Blocked };
        self.schedule();
    }

    /// Moves a blocked (or nascent) thread onto the ready set. When the
    /// woken thread outranks the caller outside interrupt context, the
    /// caller gives up the CPU at once; in IRQ context the tick handler's
    /// yield-on-return path covers preemption instead.
    pub fn unblock(&mut self, t: NonNull<Thread>) {
        let old_level = self.platform.intr_disable();

        {
            let thread = unsafe { &mut *t.as_ptr() };
            thread.check();
            assert!(
                matches!(thread.status, ThreadStatus::Blocked | ThreadStatus::Nascent),
                "unblocking a thread that is {:?}",
                thread.status
            );
            thread.status = ThreadStatus::Ready;
            thread.queue = QueueTag::Ready;
        }
        self.ready.insert(t);

        let woken = unsafe { t.as_ref().priority };
        let own = unsafe { self.current.as_ref().priority };
        if woken > own && !self.platform.in_interrupt() {
            let cur = self.current;
            unsafe {
                (*cur.as_ptr()).status = ThreadStatus::Ready;
                (*cur.as_ptr()).queue = QueueTag::Ready;
            }
            self.ready.insert(cur);
            self.schedule();
        }

        self.platform.intr_restore(old_level);
    }

    /// Yields the CPU; the caller stays runnable and may be picked again
    /// immediately.
    pub fn yield_now(&mut self) {
        assert!(!self.platform.in_interrupt());

        let old_level = self.platform.intr_disable();
        let cur = self.current;
        if Some(cur) != self.idle {
            unsafe { (*cur.as_ptr()).queue = QueueTag::Ready };
            self.ready.insert(cur);
        }
        unsafe { (*cur.as_ptr()).status = ThreadStatus::Ready };
        self.schedule();
        self.platform.intr_restore(old_level);
    }

    /// Sleeps the current thread for `ticks` future timer ticks. Interrupts
    /// must be off. A zero budget expires on the next tick.
    pub fn wait(&mut self, ticks: i64) {
        assert!(!self.platform.in_interrupt());
        assert_eq!(self.platform.intr_level(), IntrLevel::Off);

        let cur = self.current;
        unsafe {
            let thread = &mut *cur.as_ptr();
            thread.status = ThreadStatus::Blocked;
            thread.sleep_ticks = ticks;
            thread.queue = QueueTag::Waiting;
        }
        self.sleepers.push(cur);
        self.schedule();
    }

    /// Deschedules and destroys the current thread. The successor frees the
    /// TCB page in the switch tail, so the exiting thread must not touch its
    /// own TCB past this point. On a real platform the context switch never
    /// returns here; the host simulation does return, leaving the caller
    /// driving the kernel as the successor.
    pub fn exit(&mut self) {
        assert!(!self.platform.in_interrupt());
        self.platform.intr_disable();

        let cur = self.current;
        crate::kdebug!("thread {} '{}' exiting", unsafe { cur.as_ref().tid }, unsafe {
            cur.as_ref().name()
        });
        self.all.retain(|&t| t != cur);
        unsafe { (*cur.as_ptr()).status = ThreadStatus::Dying };
        self.schedule();
    }

    /// Invokes `f` on every roster thread. Interrupts must be off.
    pub fn for_each(&mut self, mut f: impl FnMut(&mut Thread)) {
        assert_eq!(self.platform.intr_level(), IntrLevel::Off);
        for &t in &self.all {
            f(unsafe { &mut *t.as_ptr() });
        }
    }

    /// Finds another thread to run and switches to it. At entry interrupts
    /// are off and the running thread has already left the `Running` state.
    pub(crate) fn schedule(&mut self) {
        assert_eq!(self.platform.intr_level(), IntrLevel::Off);
        let cur = self.current;
        debug_assert!(unsafe { cur.as_ref().status } != ThreadStatus::Running);

        let next = self.next_thread_to_run();
        unsafe { next.as_ref().check() };

        let mut prev = ptr::null_mut();
        if next != cur {
            self.current = next;
            prev = unsafe { self.platform.switch_threads(cur.as_ptr(), next.as_ptr()) };
        }
        self.schedule_tail(prev);
    }

    /// The mode-dependent policy: highest-priority ready thread, or idle
    /// when nothing is ready.
    fn next_thread_to_run(&mut self) -> NonNull<Thread> {
        match self.ready.pop_highest() {
            Some(t) => {
                unsafe { (*t.as_ptr()).queue = QueueTag::None };
                t
            }
            None => self.idle.expect("ready set empty before the idle thread exists"),
        }
    }

    /// Completes a switch: marks the new thread running, opens its time
    /// slice, activates its address space, and reaps the predecessor if it
    /// was dying.
    pub(crate) fn schedule_tail(&mut self, prev: *mut Thread) {
        assert_eq!(self.platform.intr_level(), IntrLevel::Off);
        let cur = self.current;

        unsafe { (*cur.as_ptr()).status = ThreadStatus::Running };
        self.thread_ticks = 0;
        self.platform.activate_address_space(unsafe { cur.as_ref() });

        if self.mode == SchedMode::RoundRobin {
            let thread = unsafe { &mut *cur.as_ptr() };
            if thread.donors == 0 {
                thread.priority = thread.base_priority;
            }
        }

        // Destroying the predecessor must happen here, on the successor's
        // stack, so exit never pulls the rug out from under itself. The
        // initial thread's page is not ours to free.
        if !prev.is_null() {
            let dying = unsafe { &*prev };
            if dying.status == ThreadStatus::Dying && prev != self.initial.as_ptr() {
                assert!(prev != cur.as_ptr());
                crate::kdebug!("reaping thread {}", dying.tid);
                unsafe { self.platform.free_page(NonNull::new_unchecked(prev.cast())) };
            }
        }
    }

    /// The running thread, with the stack-overflow and status sanity checks.
    pub fn current(&self) -> &Thread {
        let t = unsafe { self.current.as_ref() };
        t.check();
        assert_eq!(t.status, ThreadStatus::Running);
        t
    }

    pub fn current_tid(&self) -> Tid {
        self.current().tid
    }

    pub fn mode(&self) -> SchedMode {
        self.mode
    }

    pub(crate) fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Looks a thread up by tid on the roster (or as the idle thread).
    pub fn find(&self, tid: Tid) -> Option<NonNull<Thread>> {
        self.all
            .iter()
            .copied()
            .chain(self.idle)
            .find(|&t| unsafe { t.as_ref().tid } == tid)
    }

    pub fn status_of(&self, tid: Tid) -> Option<ThreadStatus> {
        self.find(tid).map(|t| unsafe { t.as_ref().status })
    }

    pub fn priority_of(&self, tid: Tid) -> Option<i32> {
        self.find(tid).map(|t| unsafe { t.as_ref().priority })
    }

    pub fn in_ready_set(&self, tid: Tid) -> bool {
        self.find(tid).is_some_and(|t| self.ready.contains(t))
    }

    pub fn in_wait_set(&self, tid: Tid) -> bool {
        self.find(tid).is_some_and(|t| self.sleepers.contains(t))
    }
}

impl Drop for ThreadManager {
    /// Returns every page the scheduler still owns. Only the host
    /// simulation ever tears a manager down; a real kernel never does.
    fn drop(&mut self) {
        let mut pages: Vec<NonNull<Thread>> = self.all.clone();
        if let Some(idle) = self.idle {
            pages.push(idle);
        }
        if !pages.contains(&self.initial) {
            pages.push(self.initial);
        }
        if !pages.contains(&self.current) {
            pages.push(self.current);
        }
        for page in pages {
            unsafe { self.platform.free_page(page.cast()) };
        }
    }
}
