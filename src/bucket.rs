//! A bucket: the collection of attached slabs for one size class within
//! one thread's allocator.
//!
//! A `Slab` is pinned and uniquely owned by its `Bucket`, so a stored
//! back-reference from `Bucket` to its parent allocator would alias a
//! structure that also owns the bucket. Instead, bucket operations take
//! the collaborators they need (slab pool, page provider, lost-and-found)
//! as explicit parameters.

use crate::common::{size_class_index, ByteRange, Result, SIZE_CLASSES};
use crate::lost_and_found::LostAndFound;
use crate::page_provider::PageProvider;
use crate::slab::Slab;
use crate::slab_pool::SlabPool;

pub struct Bucket {
    class_index: usize,
    chunk_size: usize,
    slabs: Vec<Slab>,
}

impl Bucket {
    pub fn new(class_index: usize) -> Self {
        Self {
            class_index,
            chunk_size: SIZE_CLASSES[class_index],
            slabs: Vec::new(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn attached_slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Fraction of attached slabs that are not full.
    pub fn fragmentation(&self) -> f64 {
        if self.slabs.is_empty() {
            return 0.0;
        }
        let not_full = self.slabs.iter().filter(|s| !s.is_full()).count();
        not_full as f64 / self.slabs.len() as f64
    }

    /// Satisfy one allocation from this bucket's size class.
    pub fn new_chunk(
        &mut self,
        slab_pool: &mut SlabPool,
        page_provider: &dyn PageProvider,
    ) -> Result<ByteRange> {
        for slab in self.slabs.iter_mut() {
            if let Some(range) = slab.next_free_chunk() {
                return Ok(range);
            }
        }

        let mut slab = slab_pool.take(page_provider)?;
        slab.bind(self.chunk_size);
        let range = slab
            .next_free_chunk()
            .expect("a freshly bound slab always has a free chunk");
        self.slabs.push(slab);
        Ok(range)
    }

    /// Free `range` into this bucket.
    ///
    /// `remote == false` means the call originated on this thread for a
    /// user pointer: the bucket first opportunistically drains the
    /// lost-and-found list for its size class, then scans its own slabs;
    /// an unmatched pointer is deposited in lost-and-found for its owning
    /// thread to reclaim later.
    ///
    /// `remote == true` means this call *is* a lost-and-found drain
    /// attempt: an unmatched pointer is left where it was (the caller
    /// keeps it listed) and `false` is returned.
    pub fn free_chunk(
        &mut self,
        range: ByteRange,
        remote: bool,
        slab_pool: &mut SlabPool,
        page_provider: &dyn PageProvider,
        lost_and_found: &LostAndFound,
    ) -> bool {
        if !remote {
            self.drain_lost_and_found(lost_and_found, slab_pool, page_provider);
        }

        for i in 0..self.slabs.len() {
            if self.slabs[i].free_chunk(range) {
                if self.slabs[i].is_empty() {
                    let slab = self.slabs.swap_remove(i);
                    slab_pool.give(slab, page_provider);
                }
                return true;
            }
        }

        if !remote {
            lost_and_found.deposit(self.class_index, range);
        }
        false
    }

    /// Scan this bucket's own slabs for `range` without consulting or
    /// depositing into lost-and-found. Used when the caller already
    /// knows the chunk is local to this thread but does not know which
    /// bucket it belongs to (the large-to-small resize boundary case).
    pub fn try_claim_local(
        &mut self,
        range: ByteRange,
        slab_pool: &mut SlabPool,
        page_provider: &dyn PageProvider,
    ) -> bool {
        for i in 0..self.slabs.len() {
            if self.slabs[i].free_chunk(range) {
                if self.slabs[i].is_empty() {
                    let slab = self.slabs.swap_remove(i);
                    slab_pool.give(slab, page_provider);
                }
                return true;
            }
        }
        false
    }

    /// Opportunistically reclaim chunks this thread previously lost to
    /// another thread's bucket. Non-blocking: if the list's lock is held,
    /// this is a no-op.
    pub fn drain_lost_and_found(
        &mut self,
        lost_and_found: &LostAndFound,
        slab_pool: &mut SlabPool,
        page_provider: &dyn PageProvider,
    ) {
        let slabs = &mut self.slabs;
        let mut emptied = Vec::new();
        lost_and_found.try_drain(self.class_index, |range| {
            for (i, slab) in slabs.iter_mut().enumerate() {
                if slab.free_chunk(range) {
                    if slab.is_empty() {
                        emptied.push(i);
                    }
                    return true;
                }
            }
            false
        });
        Self::return_emptied(slabs, &mut emptied, slab_pool, page_provider);
    }

    /// Blocking drain used at teardown: every chunk this thread lost for
    /// this size class must be reclaimed (or, since the slab memory is
    /// about to be released, simply dropped from the list) before the
    /// bucket's slabs are freed.
    pub fn teardown_drain(&mut self, lost_and_found: &LostAndFound) {
        let slabs = &mut self.slabs;
        lost_and_found.blocking_drain(self.class_index, |range| {
            slabs.iter_mut().any(|slab| slab.free_chunk(range))
        });
    }

    fn return_emptied(
        slabs: &mut Vec<Slab>,
        emptied: &mut Vec<usize>,
        slab_pool: &mut SlabPool,
        page_provider: &dyn PageProvider,
    ) {
        emptied.sort_unstable_by(|a, b| b.cmp(a));
        emptied.dedup();
        for idx in emptied.drain(..) {
            let slab = slabs.swap_remove(idx);
            slab_pool.give(slab, page_provider);
        }
    }

    /// Release every attached slab to the page provider. Used when a
    /// thread allocator tears down and the slab pool itself is about to
    /// be drained too.
    pub fn release_all(&mut self, page_provider: &dyn PageProvider) {
        for slab in self.slabs.drain(..) {
            unsafe { page_provider.free(slab.data_range()) };
        }
    }
}

/// Resolve `len` to the bucket index that should serve it, or `None` if
/// `len` exceeds [`crate::common::LARGEST_ALLOC`].
pub fn bucket_for(len: usize) -> Option<usize> {
    size_class_index(len)
}
