//! Kernel log sink.
//!
//! The `k*!` macros in the crate root forward into the standard `log`
//! facade; this module provides the kernel-side consumer: a fixed-size ring
//! buffer that works before any allocator exists and keeps the most recent
//! output when it wraps. A port drains the ring to its console or serial
//! device; the test suite reads it back through [`snapshot`].

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Ring capacity. Big enough to hold a boot transcript, small enough to
/// live in the kernel image.
const RING_SIZE: usize = 16 * 1024;

struct Ring {
    buf: [u8; RING_SIZE],
    head: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Ring {
            buf: [0; RING_SIZE],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        let tail = (self.head + self.len) % RING_SIZE;
        self.buf[tail] = byte;
        if self.len < RING_SIZE {
            self.len += 1;
        } else {
            // Full: overwrite the oldest byte.
            self.head = (self.head + 1) % RING_SIZE;
        }
    }

    fn copy_to(&self, out: &mut [u8]) -> usize {
        let n = self.len.min(out.len());
        // Copy the newest `n` bytes in order.
        let skip = self.len - n;
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = self.buf[(self.head + skip + i) % RING_SIZE];
        }
        n
    }
}

impl Write for Ring {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for &b in s.as_bytes() {
            self.push(b);
        }
        Ok(())
    }
}

/// The kernel logger: one static ring behind a spin mutex.
pub struct KernelLog {
    ring: Mutex<Ring>,
}

static LOGGER: KernelLog = KernelLog {
    ring: Mutex::new(Ring::new()),
};

impl Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut ring = self.ring.lock();
        let _ = writeln!(ring, "[{:<5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Installs the ring logger at the given level. Safe to call more than
/// once; later calls only adjust the level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Copies the most recent log bytes into `out` and returns the count.
pub fn snapshot(out: &mut [u8]) -> usize {
    LOGGER.ring.lock().copy_to(out)
}
