//! Platform collaborators.
//!
//! The scheduler is policy; everything hardware-shaped is mechanism owned by
//! the surrounding kernel. This trait is the single seam between the two:
//! interrupt control, the page allocator, the context switch primitive, the
//! timer frequency, and (when user processes are compiled in) address-space
//! activation. A port implements it once; the host test suite uses
//! [`crate::sim::SimPlatform`].

use core::ptr::NonNull;

use crate::sched::tcb::Thread;

/// Interrupt state of the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrLevel {
    /// Maskable interrupts disabled.
    Off,
    /// Maskable interrupts enabled.
    On,
}

pub trait Platform: Send + Sync {
    /// Disables maskable interrupts and returns the previous level.
    fn intr_disable(&self) -> IntrLevel;

    /// Restores a previously saved interrupt level.
    fn intr_restore(&self, level: IntrLevel);

    /// Current interrupt level.
    fn intr_level(&self) -> IntrLevel;

    /// True while the CPU is servicing an external interrupt.
    fn in_interrupt(&self) -> bool;

    /// Asks the interrupt layer to yield the CPU when the current external
    /// interrupt returns. Only meaningful from interrupt context.
    fn yield_on_return(&self);

    /// Timer interrupt frequency in Hz.
    fn timer_freq(&self) -> i64;

    /// Hands out one zeroed, page-aligned page, or `None` when the
    /// allocator is exhausted.
    fn alloc_page(&self) -> Option<NonNull<u8>>;

    /// Returns a page obtained from [`Platform::alloc_page`].
    ///
    /// # Safety
    /// The caller guarantees no live references into the page remain.
    unsafe fn free_page(&self, page: NonNull<u8>);

    /// Saves the callee-saved state of `prev`, loads `next`, and continues
    /// running as `next`. Returns the thread that was switched away from
    /// once control eventually comes back to `prev`.
    ///
    /// # Safety
    /// Both pointers must be live TCBs with correctly formed stacks; `prev`
    /// must be the thread executing the call.
    unsafe fn switch_threads(&self, prev: *mut Thread, next: *mut Thread) -> *mut Thread;

    /// Address of the entry stub a brand-new thread first returns through
    /// before reaching the kernel-thread bootstrap.
    fn switch_entry(&self) -> usize;

    /// Installs the address space of `next`. The default is a no-op for
    /// builds without user-process support.
    fn activate_address_space(&self, _next: &Thread) {}

    /// Atomically re-enables interrupts and stops the CPU until the next
    /// interrupt arrives. Used only by the idle thread.
    fn enable_and_halt(&self) {
        self.intr_restore(IntrLevel::On);
    }
}
