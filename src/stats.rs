//! Allocator-wide statistics: pure observability, aggregate counters
//! only, no per-allocation provenance tracking.

use crate::common::{AtomicU64, NUM_SIZE_CLASSES, Ordering};

#[derive(Debug, Default)]
pub struct AllocatorStats {
    allocations: AtomicU64,
    frees: AtomicU64,
    bytes_in_use: AtomicU64,
    large_allocations: AtomicU64,
}

impl AllocatorStats {
    pub fn record_alloc(&self, len: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_large_alloc(&self, len: usize) {
        self.large_allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_free(&self, len: usize) {
        self.frees.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_sub(len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
            large_allocations: self.large_allocations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub allocations: u64,
    pub frees: u64,
    pub bytes_in_use: u64,
    pub large_allocations: u64,
}

/// Per-size-class attached-slab counts, a diagnostic snapshot of a thread
/// allocator's buckets.
#[derive(Debug, Clone, Copy)]
pub struct BucketOccupancy {
    pub attached_slabs: [usize; NUM_SIZE_CLASSES],
    pub fragmentation: [f64; NUM_SIZE_CLASSES],
}
