//! Integration tests exercising cross-thread reclamation, resize
//! behavior across size-class boundaries, and zeroing guarantees. One
//! allocator instance per OS thread; each test runs on its own
//! `std::thread::spawn` so that thread-allocator lifecycles (and the
//! lost-and-found refcount) never bleed between tests run in parallel by
//! the test harness.

use rdb_slab_alloc::SlabAllocator;

fn on_thread<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::spawn(f).join().expect("test thread panicked");
}

/// Filling a bucket to many slabs and draining it back to empty leaves
/// no attached slabs behind.
#[test]
fn bucket_fill_and_drain() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let mut ranges = Vec::new();
        for _ in 0..50 {
            ranges.push(allocator.alloc(2000).unwrap());
        }
        for r in ranges {
            allocator.free(r);
        }
        let occupancy = allocator.occupancy();
        assert_eq!(occupancy.attached_slabs[5], 0, "2048 bucket should be empty after drain");
        allocator.deinit();
    });
}

/// A resize that shrinks a large allocation down across the size-class
/// boundary reports the boundary sentinel length.
#[test]
fn large_to_small_resize_reports_boundary_sentinel() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let big = allocator.alloc(10_000).unwrap();
        let resized = allocator.resize(big, 1000).unwrap();
        assert_eq!(resized.len, rdb_slab_alloc::LARGEST_ALLOC + 1);
        allocator.free(resized);
        allocator.deinit();
    });
}

/// A resize crossing from a small size class to a large allocation
/// copies existing content and leaves neighboring chunks intact.
#[test]
fn small_to_large_resize_copies_content() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let mut first = allocator.alloc(1000).unwrap();
        unsafe { first.as_mut_slice().fill(0x01) };

        let mut fence = allocator.alloc(1000).unwrap();
        unsafe { fence.as_mut_slice().fill(0x02) };

        let resized = allocator.resize(first, 10_000).unwrap();
        unsafe {
            assert!(resized.as_slice()[..1000].iter().all(|&b| b == 0x01));
            assert!(fence.as_slice().iter().all(|&b| b == 0x02));
        }

        allocator.free(resized);
        allocator.free(fence);
        allocator.deinit();
    });
}

/// A chunk freed on a thread that does not own it is reclaimed by the
/// owning thread on its next free.
#[test]
fn cross_thread_free_is_reclaimed() {
    use std::sync::mpsc::channel;

    let (tx_range, rx_range) = channel();
    let (tx_done, rx_done) = channel();

    let owner = std::thread::spawn(move || {
        let allocator = SlabAllocator::init();
        let first = allocator.alloc(1000).unwrap();
        tx_range.send(first).unwrap();

        // Wait for thread B to free it remotely.
        rx_done.recv().unwrap();

        // A subsequent allocation/free in the same bucket drains
        // lost-and-found and reclaims the chunk thread B freed.
        let second = allocator.alloc(1000).unwrap();
        allocator.free(second);
        allocator.free(first);

        let occupancy = allocator.occupancy();
        assert_eq!(occupancy.attached_slabs[4], 0, "1024 bucket should be empty after teardown");
        allocator.deinit();
    });

    let remote = std::thread::spawn(move || {
        let allocator = SlabAllocator::init();
        let range = rx_range.recv().unwrap();
        allocator.free(range);
        allocator.deinit();
    });

    remote.join().unwrap();
    tx_done.send(()).unwrap();
    owner.join().unwrap();
}

/// A resize that stays within the same size class preserves the
/// pointer; one that crosses into a different size class may move it.
#[test]
fn same_slot_resize_preserves_pointer() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let mut one = allocator.alloc(1).unwrap();
        assert_eq!(one.ptr.as_ptr() as usize % 4, 0, "64-byte class satisfies 4-byte alignment");
        unsafe { one.as_mut_slice()[0] = 0x12 };

        let original_ptr = one.ptr;
        let mut two = allocator.resize(one, 2).unwrap();
        assert_eq!(two.ptr, original_ptr, "resize within the same size class preserves the pointer");
        unsafe { two.as_mut_slice()[1] = 0x34 };

        let seventeen = allocator.resize(two, 17).unwrap();
        unsafe {
            assert_eq!(seventeen.as_slice()[0], 0x12);
            assert_eq!(seventeen.as_slice()[1], 0x34);
        }

        allocator.free(seventeen);
        allocator.deinit();
    });
}

/// Shrinking within a single size class never fails and never moves
/// data.
#[test]
fn shrink_within_same_size_class() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let mut range = allocator.alloc(20).unwrap();
        unsafe { range.as_mut_slice().fill(0x11) };

        let seventeen = allocator.resize(range, 17).unwrap();
        unsafe { assert!(seventeen.as_slice().iter().all(|&b| b == 0x11)) };

        let sixteen = allocator.resize(seventeen, 16).unwrap();
        unsafe { assert!(sixteen.as_slice().iter().all(|&b| b == 0x11)) };

        allocator.free(sixteen);
        allocator.deinit();
    });
}

/// Small allocations land inside a managed slab; large allocations
/// never do.
#[test]
fn allocations_land_in_expected_regime() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let small = allocator.alloc(100).unwrap();
        let occupancy = allocator.occupancy();
        assert!(occupancy.attached_slabs[1] >= 1, "128-byte class should have an attached slab");
        allocator.free(small);

        let before = allocator.occupancy().attached_slabs;
        let large = allocator.alloc(LARGEST_ALLOC_PLUS_ONE).unwrap();
        let after = allocator.occupancy().attached_slabs;
        assert_eq!(before, after, "a large allocation must not attach any bucket slab");
        allocator.free(large);
        allocator.deinit();
    });
}

const LARGEST_ALLOC_PLUS_ONE: usize = rdb_slab_alloc::LARGEST_ALLOC + 1;

/// Zero-length requests are the canonical empty range and round-trip
/// through free/resize without side effects.
#[test]
fn zero_length_requests_are_empty() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        let empty = allocator.alloc(0).unwrap();
        assert!(empty.is_empty());
        allocator.free(empty);

        let also_empty = allocator.resize(empty, 0).unwrap();
        assert!(also_empty.is_empty());
        allocator.deinit();
    });
}

/// Every chunk handed out is zeroed, including chunks recycled through
/// the slab pool.
#[test]
fn recycled_chunks_are_zeroed() {
    on_thread(|| {
        let allocator = SlabAllocator::init();
        for _ in 0..200 {
            let mut range = allocator.alloc(128).unwrap();
            unsafe {
                assert!(range.as_slice().iter().all(|&b| b == 0));
                range.as_mut_slice().fill(0xAB);
            }
            allocator.free(range);
        }
        allocator.deinit();
    });
}
