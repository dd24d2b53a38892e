//! Host-side platform simulation.
//!
//! Simulates the scheduler's hardware collaborators without actual hardware:
//! pages come from the host heap, the interrupt level is a flag, and the
//! context switch records the handoff and returns immediately (so a test
//! drives the kernel "as" whichever thread the scheduler believes is
//! running). The IRQ-entry helpers mirror real interrupt delivery, which
//! disables interrupts in hardware before the handler runs.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::vec::Vec;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::hal::{IntrLevel, Platform};
use crate::sched::tcb::Thread;
use crate::sched::types::{Tid, PAGE_SIZE};

pub struct SimPlatform {
    intr_on: AtomicBool,
    in_irq: AtomicBool,
    saved_irq_level: AtomicBool,
    yield_requested: AtomicBool,
    freq: i64,
    /// Pages left before `alloc_page` starts failing; `usize::MAX` means
    /// unlimited.
    pages_left: AtomicUsize,
    pages_outstanding: AtomicUsize,
    switches: Mutex<Vec<(Tid, Tid)>>,
}

impl SimPlatform {
    /// A fresh platform with interrupts off, as hardware boots.
    pub fn new(timer_freq: i64) -> Self {
        SimPlatform {
            intr_on: AtomicBool::new(false),
            in_irq: AtomicBool::new(false),
            saved_irq_level: AtomicBool::new(false),
            yield_requested: AtomicBool::new(false),
            freq: timer_freq,
            pages_left: AtomicUsize::new(usize::MAX),
            pages_outstanding: AtomicUsize::new(0),
            switches: Mutex::new(Vec::new()),
        }
    }

    /// Limits the page allocator to `pages` further allocations.
    pub fn set_page_limit(&self, pages: usize) {
        self.pages_left.store(pages, Ordering::Relaxed);
    }

    /// Pages currently handed out and not yet freed.
    pub fn pages_outstanding(&self) -> usize {
        self.pages_outstanding.load(Ordering::Relaxed)
    }

    /// Enters simulated interrupt context: hardware IRQ delivery disables
    /// interrupts before the handler runs.
    pub fn begin_irq(&self) {
        assert!(!self.in_irq.load(Ordering::Relaxed), "nested IRQ");
        let was_on = self.intr_on.swap(false, Ordering::Relaxed);
        self.saved_irq_level.store(was_on, Ordering::Relaxed);
        self.in_irq.store(true, Ordering::Relaxed);
    }

    /// Leaves simulated interrupt context, restoring the pre-IRQ level.
    pub fn end_irq(&self) {
        assert!(self.in_irq.load(Ordering::Relaxed), "not in IRQ");
        self.in_irq.store(false, Ordering::Relaxed);
        let was_on = self.saved_irq_level.load(Ordering::Relaxed);
        self.intr_on.store(was_on, Ordering::Relaxed);
    }

    /// Takes and clears the yield-on-return latch.
    pub fn take_yield_request(&self) -> bool {
        self.yield_requested.swap(false, Ordering::Relaxed)
    }

    /// Every context switch performed so far, as `(prev, next)` tids.
    pub fn switches(&self) -> Vec<(Tid, Tid)> {
        self.switches.lock().clone()
    }
}

impl Platform for SimPlatform {
    fn intr_disable(&self) -> IntrLevel {
        if self.intr_on.swap(false, Ordering::Relaxed) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn intr_restore(&self, level: IntrLevel) {
        self.intr_on.store(level == IntrLevel::On, Ordering::Relaxed);
    }

    fn intr_level(&self) -> IntrLevel {
        if self.intr_on.load(Ordering::Relaxed) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn in_interrupt(&self) -> bool {
        self.in_irq.load(Ordering::Relaxed)
    }

    fn yield_on_return(&self) {
        self.yield_requested.store(true, Ordering::Relaxed);
    }

    fn timer_freq(&self) -> i64 {
        self.freq
    }

    fn alloc_page(&self) -> Option<NonNull<u8>> {
        self.pages_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
                if left == usize::MAX {
                    Some(left)
                } else {
                    left.checked_sub(1)
                }
            })
            .ok()?;
        let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
        let page = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        self.pages_outstanding.fetch_add(1, Ordering::Relaxed);
        Some(page)
    }

    unsafe fn free_page(&self, page: NonNull<u8>) {
        let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
        dealloc(page.as_ptr(), layout);
        self.pages_outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    unsafe fn switch_threads(&self, prev: *mut Thread, next: *mut Thread) -> *mut Thread {
        let record = ((*prev).tid, (*next).tid);
        self.switches.lock().push(record);
        prev
    }

    fn switch_entry(&self) -> usize {
        // No real stub on the host; new threads are never actually
        // dispatched through their bootstrap frames here.
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_zeroed_aligned_and_limited() {
        let platform = SimPlatform::new(100);
        let page = platform.alloc_page().unwrap();
        assert_eq!(page.as_ptr() as usize % PAGE_SIZE, 0);
        let bytes = unsafe { core::slice::from_raw_parts(page.as_ptr(), PAGE_SIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { platform.free_page(page) };
        assert_eq!(platform.pages_outstanding(), 0);

        platform.set_page_limit(1);
        let only = platform.alloc_page().unwrap();
        assert!(platform.alloc_page().is_none());
        unsafe { platform.free_page(only) };
    }

    #[test]
    fn irq_entry_masks_interrupts() {
        let platform = SimPlatform::new(100);
        platform.intr_restore(IntrLevel::On);
        platform.begin_irq();
        assert!(platform.in_interrupt());
        assert_eq!(platform.intr_level(), IntrLevel::Off);
        platform.end_irq();
        assert!(!platform.in_interrupt());
        assert_eq!(platform.intr_level(), IntrLevel::On);
    }

    #[test]
    fn yield_latch_is_take_once() {
        let platform = SimPlatform::new(100);
        platform.yield_on_return();
        assert!(platform.take_yield_request());
        assert!(!platform.take_yield_request());
    }
}
