//! The process-wide, per-size-class "lost-and-found": cross-thread free
//! reclamation. A thread that frees a chunk it does not own deposits it
//! here instead of mutating another thread's slabs directly; the owning
//! thread reclaims it opportunistically on its own next free.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use once_cell::sync::OnceCell;

use crate::common::{ByteRange, NUM_SIZE_CLASSES};

/// A single-byte spin lock: `1` is available, `0` is held. Acquire uses
/// acquire ordering, release uses release ordering, so that writes made
/// under the lock are visible to the next holder.
struct SpinLock {
    flag: AtomicU8,
}

impl SpinLock {
    const fn new() -> Self {
        Self {
            flag: AtomicU8::new(1),
        }
    }

    /// Spin until the lock is acquired.
    fn acquire(&self) {
        while self
            .flag
            .compare_exchange_weak(1, 0, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    /// Attempt to acquire without blocking.
    fn try_acquire(&self) -> bool {
        self.flag
            .compare_exchange(1, 0, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) {
        self.flag.store(1, Ordering::Release);
    }
}

struct List {
    lock: SpinLock,
    items: UnsafeCell<Vec<ByteRange>>,
}

impl List {
    fn new() -> Self {
        Self {
            lock: SpinLock::new(),
            items: UnsafeCell::new(Vec::new()),
        }
    }
}

// Safety: `items` is only ever touched while `lock` is held, which
// establishes the happens-before edges that make the shared access safe.
unsafe impl Sync for List {}

pub struct LostAndFound {
    lists: [List; NUM_SIZE_CLASSES],
    live_allocators: AtomicUsize,
}

static GLOBAL: OnceCell<LostAndFound> = OnceCell::new();

impl LostAndFound {
    fn new() -> Self {
        Self {
            lists: std::array::from_fn(|_| List::new()),
            live_allocators: AtomicUsize::new(0),
        }
    }

    /// Attach to the process-wide structure, initializing it on first
    /// call. Bumps the live-allocator reference count.
    pub fn register() -> &'static LostAndFound {
        let laf = GLOBAL.get_or_init(LostAndFound::new);
        laf.live_allocators.fetch_add(1, Ordering::AcqRel);
        laf
    }

    /// Detach a thread allocator. When the count drops to zero every
    /// list must be empty; a non-empty list at this point means some
    /// thread tore down while another thread still held chunks destined
    /// for it, which is an internal invariant violation.
    pub fn unregister(&self) {
        let previous = self.live_allocators.fetch_sub(1, Ordering::AcqRel);
        if previous != 1 {
            return;
        }
        for (class, list) in self.lists.iter().enumerate() {
            list.lock.acquire();
            // Safety: lock held.
            let items = unsafe { &*list.items.get() };
            assert!(
                items.is_empty(),
                "lost-and-found list for size class {class} non-empty at global teardown"
            );
            list.lock.release();
        }
    }

    /// Deposit a chunk freed on a thread that does not own it.
    pub fn deposit(&self, class: usize, range: ByteRange) {
        let list = &self.lists[class];
        list.lock.acquire();
        // Safety: lock held.
        unsafe { (*list.items.get()).push(range) };
        list.lock.release();
    }

    /// Opportunistic, non-blocking drain: if the lock is free, give every
    /// listed chunk in `class` to `claim`; chunks it accepts (returns
    /// `true` for) are removed from the list. No-op if the lock is held.
    pub fn try_drain(&self, class: usize, claim: impl FnMut(ByteRange) -> bool) {
        let list = &self.lists[class];
        if !list.lock.try_acquire() {
            return;
        }
        self.drain_locked(list, claim);
    }

    /// Blocking drain: spins to acquire the lock, then drains as
    /// [`LostAndFound::try_drain`] would. Used on bucket teardown so no
    /// listed chunk still references soon-to-be-freed slab memory.
    pub fn blocking_drain(&self, class: usize, claim: impl FnMut(ByteRange) -> bool) {
        let list = &self.lists[class];
        list.lock.acquire();
        self.drain_locked(list, claim);
    }

    fn drain_locked(&self, list: &List, mut claim: impl FnMut(ByteRange) -> bool) {
        // Safety: lock held by the caller.
        let items = unsafe { &mut *list.items.get() };
        items.retain(|&range| !claim(range));
        list.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NonNull;

    fn dummy_range(addr: usize) -> ByteRange {
        ByteRange::new(NonNull::new(addr as *mut u8).unwrap(), 64)
    }

    #[test]
    fn deposit_and_drain_round_trip() {
        let laf = LostAndFound::register();
        laf.deposit(0, dummy_range(0x1000));
        laf.deposit(0, dummy_range(0x2000));

        let mut claimed = Vec::new();
        laf.blocking_drain(0, |range| {
            claimed.push(range.ptr.as_ptr() as usize);
            true
        });

        assert_eq!(claimed, vec![0x1000, 0x2000]);
        laf.unregister();
    }

    #[test]
    fn unclaimed_chunks_remain_listed() {
        let laf = LostAndFound::register();
        laf.deposit(1, dummy_range(0x3000));

        laf.try_drain(1, |_| false);
        let mut found = false;
        laf.blocking_drain(1, |range| {
            found = range.ptr.as_ptr() as usize == 0x3000;
            found
        });
        assert!(found);
        laf.unregister();
    }
}
