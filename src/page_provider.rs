//! The page provider contract and a default implementation backed
//! directly by the system allocator.

use std::alloc::{GlobalAlloc, Layout, System};

use crate::common::{ByteRange, NonNull, PAGE_SIZE};
use crate::error::{AllocError, Result};

/// A lower-level allocator that serves aligned multi-page blocks and
/// large (> [`crate::common::LARGEST_ALLOC`]) requests the core forwards
/// to it verbatim.
pub trait PageProvider: Send + Sync {
    /// Return an owned byte range of at least `len` bytes, aligned for
    /// any basic type (in practice, page-aligned).
    fn alloc(&self, len: usize) -> Result<ByteRange>;

    /// Release a range previously returned by `alloc` or `resize`.
    ///
    /// # Safety
    /// `range` must have been obtained from this provider and not already
    /// released.
    unsafe fn free(&self, range: ByteRange);

    /// Expand or shrink `range` in place when possible; otherwise
    /// equivalent to alloc-copy-free.
    ///
    /// # Safety
    /// `range` must have been obtained from this provider and not already
    /// released.
    unsafe fn resize(&self, range: ByteRange, new_len: usize) -> Result<ByteRange>;
}

fn layout_for(len: usize) -> Layout {
    // All provider-level blocks are page-aligned, matching "suitably
    // aligned for any basic type" and the slab layer's assumption that a
    // slab's data region starts on a page boundary.
    Layout::from_size_align(len.max(1), PAGE_SIZE).expect("page-aligned layout")
}

/// The default page provider: `std::alloc::System` directly.
#[derive(Debug, Default)]
pub struct SystemPageProvider;

impl SystemPageProvider {
    pub fn new() -> Self {
        Self
    }
}

impl PageProvider for SystemPageProvider {
    fn alloc(&self, len: usize) -> Result<ByteRange> {
        let layout = layout_for(len);
        // Safety: layout has nonzero size.
        let raw = unsafe { System.alloc(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| AllocError::OutOfMemory(format!("system allocator failed for {len} bytes")))?;
        Ok(ByteRange::new(ptr, len))
    }

    unsafe fn free(&self, range: ByteRange) {
        let layout = layout_for(range.len);
        System.dealloc(range.ptr.as_ptr(), layout);
    }

    unsafe fn resize(&self, range: ByteRange, new_len: usize) -> Result<ByteRange> {
        let old_layout = layout_for(range.len);
        let raw = System.realloc(range.ptr.as_ptr(), old_layout, new_len.max(1));
        let ptr = NonNull::new(raw).ok_or_else(|| {
            AllocError::OutOfMemory(format!("system allocator failed to resize to {new_len} bytes"))
        })?;
        Ok(ByteRange::new(ptr, new_len))
    }
}
