//! Per-thread cache of empty, unbound slabs, so a slab that empties out
//! in one bucket can be rebound for a different size class without a
//! round trip through the page provider.

use std::collections::VecDeque;

use crate::common::SLAB_POOL_CAP;
use crate::error::Result;
use crate::page_provider::PageProvider;
use crate::slab::Slab;

pub struct SlabPool {
    slabs: VecDeque<Slab>,
    cap: usize,
}

impl SlabPool {
    pub fn new(cap: usize) -> Self {
        Self {
            slabs: VecDeque::new(),
            cap,
        }
    }

    /// Pre-seed the pool with `count` fresh, unbound slabs.
    pub fn seed(&mut self, page_provider: &dyn PageProvider, count: usize) -> Result<()> {
        for _ in 0..count.min(self.cap) {
            self.slabs.push_back(Slab::new_raw(page_provider)?);
        }
        Ok(())
    }

    /// Take a slab from the pool, or create a fresh one via the page
    /// provider if the pool is empty.
    pub fn take(&mut self, page_provider: &dyn PageProvider) -> Result<Slab> {
        match self.slabs.pop_front() {
            Some(slab) => Ok(slab),
            None => Slab::new_raw(page_provider),
        }
    }

    /// Return an empty slab to the pool, handing it back to the page
    /// provider instead if the pool is already at capacity.
    pub fn give(&mut self, slab: Slab, page_provider: &dyn PageProvider) {
        if self.slabs.len() < self.cap {
            self.slabs.push_back(slab);
        } else {
            tracing::debug!("slab pool at capacity, returning slab to page provider");
            // Safety: slab came from this pool's provider and is not
            // referenced elsewhere -- it was just detached from a bucket.
            unsafe { page_provider.free(slab.data_range()) };
        }
    }

    /// Drain every pooled slab back to the page provider. Used on
    /// thread-allocator teardown.
    pub fn drain(&mut self, page_provider: &dyn PageProvider) {
        while let Some(slab) = self.slabs.pop_front() {
            unsafe { page_provider.free(slab.data_range()) };
        }
    }

    pub fn len(&self) -> usize {
        self.slabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slabs.is_empty()
    }
}

impl Default for SlabPool {
    fn default() -> Self {
        Self::new(SLAB_POOL_CAP)
    }
}
