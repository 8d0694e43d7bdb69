//! A slab: a fixed-size, two-page byte region sliced into equally sized
//! chunks, plus a small metadata array tracking which chunks are in use.
//! No header is stored inline with a chunk, so the whole chunk is handed
//! to the caller.

use crate::common::{ByteRange, MAX_CHUNKS, NonNull, SLAB_SIZE};
use crate::page_provider::PageProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabState {
    Empty,
    Partial,
    Full,
}

/// A pinned, fixed-layout slab. Once `bind`-ed to a chunk size its
/// `slab_start`/`slab_end` bounds are valid for the remainder of its
/// attachment; the slab must not be moved while attached to a bucket
/// (enforced here by always storing slabs behind an owning `Vec<Slab>`
/// slot and never handing out a slab by value while bound).
pub struct Slab {
    data_ptr: NonNull<u8>,
    slab_start: usize,
    slab_end: usize,
    chunk_size: usize,
    max_chunks: usize,
    next_chunk: usize,
    chunks_left: usize,
    state: SlabState,
    meta: [u8; MAX_CHUNKS],
}

impl Slab {
    /// Obtain a fresh, unbound slab from the page provider. The slab is
    /// not usable for allocation until [`Slab::bind`] assigns it a size
    /// class.
    pub fn new_raw(page_provider: &dyn PageProvider) -> crate::error::Result<Self> {
        let range = page_provider.alloc(SLAB_SIZE)?;
        Ok(Self {
            data_ptr: range.ptr,
            slab_start: 0,
            slab_end: 0,
            chunk_size: 0,
            max_chunks: 0,
            next_chunk: 0,
            chunks_left: 0,
            state: SlabState::Empty,
            meta: [0; MAX_CHUNKS],
        })
    }

    /// (Re)bind this slab to `chunk_size`, resetting its metadata and
    /// recomputing its cached address bounds. Bounds are recomputed on
    /// every bind because the slab's address never moves but its
    /// chunk_size may, when it is recycled out of the slab pool into a
    /// different bucket.
    pub fn bind(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size;
        self.max_chunks = SLAB_SIZE / chunk_size;
        self.next_chunk = 0;
        self.chunks_left = self.max_chunks;
        self.state = SlabState::Empty;
        self.meta = [0; MAX_CHUNKS];
        self.slab_start = self.data_ptr.as_ptr() as usize;
        self.slab_end = self.slab_start + SLAB_SIZE;
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn state(&self) -> SlabState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == SlabState::Empty
    }

    pub fn is_full(&self) -> bool {
        self.state == SlabState::Full
    }

    /// Address-range containment test: the primary ownership test for a
    /// chunk pointer.
    pub fn owns(&self, addr: usize) -> bool {
        addr >= self.slab_start && addr < self.slab_end
    }

    /// Hand back the raw data range so the owner can return it to the
    /// page provider or the slab pool.
    pub fn data_range(&self) -> ByteRange {
        ByteRange::new(self.data_ptr, SLAB_SIZE)
    }

    /// Carve out the next free chunk, or `None` if the slab is full.
    pub fn next_free_chunk(&mut self) -> Option<ByteRange> {
        if self.state == SlabState::Full {
            return None;
        }

        let mut idx = self.next_chunk;
        let found = loop {
            if self.meta[idx] == 0 {
                break idx;
            }
            idx = (idx + 1) % self.max_chunks;
            // Every reachable index was scanned without finding a free
            // slot; chunks_left's bookkeeping guarantees this can't
            // happen while state != Full.
            debug_assert_ne!(idx, self.next_chunk, "chunks_left desynced from meta");
        };

        self.meta[found] = 1;
        self.next_chunk = found;
        self.chunks_left -= 1;
        self.state = if self.chunks_left == 0 {
            SlabState::Full
        } else {
            SlabState::Partial
        };

        let base = self.slab_start + found * self.chunk_size;
        // Safety: base lies within [slab_start, slab_end) by construction.
        let mut range = ByteRange::new(unsafe { NonNull::new_unchecked(base as *mut u8) }, self.chunk_size);
        // Zero the chunk before handing it out (testable property 4).
        unsafe { range.as_mut_slice().fill(0) };
        Some(range)
    }

    /// Return `range` to this slab if it falls within this slab's `data`
    /// bounds. Returns `false`, performing no mutation, if the pointer is
    /// foreign to this slab.
    pub fn free_chunk(&mut self, range: ByteRange) -> bool {
        let addr = range.ptr.as_ptr() as usize;
        if !self.owns(addr) {
            return false;
        }

        let idx = (addr - self.slab_start) / self.chunk_size;
        self.meta[idx] = 0;
        self.chunks_left += 1;
        self.state = if self.chunks_left == self.max_chunks {
            SlabState::Empty
        } else {
            SlabState::Partial
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_provider::SystemPageProvider;

    #[test]
    fn bind_sets_full_capacity() {
        let provider = SystemPageProvider::new();
        let mut slab = Slab::new_raw(&provider).unwrap();
        slab.bind(64);
        assert_eq!(slab.max_chunks, SLAB_SIZE / 64);
        assert!(slab.is_empty());
    }

    #[test]
    fn alloc_zeroes_and_tracks_state() {
        let provider = SystemPageProvider::new();
        let mut slab = Slab::new_raw(&provider).unwrap();
        slab.bind(2048);
        let max = slab.max_chunks;

        let mut ranges = Vec::new();
        for _ in 0..max {
            let r = slab.next_free_chunk().expect("chunk available");
            unsafe {
                assert!(r.as_slice().iter().all(|&b| b == 0));
            }
            ranges.push(r);
        }
        assert!(slab.is_full());
        assert!(slab.next_free_chunk().is_none());

        for r in ranges {
            assert!(slab.free_chunk(r));
        }
        assert!(slab.is_empty());

        unsafe { provider.free(slab.data_range()) };
    }

    #[test]
    fn free_chunk_rejects_foreign_pointer() {
        let provider = SystemPageProvider::new();
        let mut a = Slab::new_raw(&provider).unwrap();
        a.bind(64);
        let mut b = Slab::new_raw(&provider).unwrap();
        b.bind(64);

        let from_b = b.next_free_chunk().unwrap();
        assert!(!a.free_chunk(from_b));

        unsafe {
            provider.free(a.data_range());
            provider.free(b.data_range());
        }
    }
}
