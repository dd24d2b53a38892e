//! Thread identifier allocation.

use spin::Mutex;

use super::types::Tid;

/// Monotonic tid source. Rolls over from `i32::MAX` to 2, reserving 1 for
/// the initial thread and zero/negative values as sentinels. Uniqueness
/// against still-live threads is not re-checked after a wrap.
pub(crate) struct TidAllocator {
    next: Mutex<Tid>,
}

impl TidAllocator {
    pub const fn new() -> TidAllocator {
        TidAllocator {
            next: Mutex::new(1),
        }
    }

    #[cfg(test)]
    fn starting_at(next: Tid) -> TidAllocator {
        TidAllocator {
            next: Mutex::new(next),
        }
    }

    pub fn allocate(&self) -> Tid {
        let mut next = self.next.lock();
        let tid = *next;
        if *next == Tid::MAX {
            crate::kwarn!("tid space wrapped; ids restart at 2");
            *next = 2;
        } else {
            *next += 1;
        }
        tid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tids_increase_strictly_then_wrap_to_two() {
        let tids = TidAllocator::starting_at(Tid::MAX - 2);
        let a = tids.allocate();
        let b = tids.allocate();
        let c = tids.allocate();
        assert!(a < b && b < c);
        assert_eq!(c, Tid::MAX);
        assert_eq!(tids.allocate(), 2);
        assert_eq!(tids.allocate(), 3);
    }

    #[test]
    fn first_tid_is_one() {
        let tids = TidAllocator::new();
        assert_eq!(tids.allocate(), 1);
        assert_eq!(tids.allocate(), 2);
    }
}
