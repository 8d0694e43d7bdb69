//! The per-thread allocator: six buckets, a slab pool, a handle to the
//! page provider, and the public `init`/`init_with`/`deinit`/`alloc`/
//! `free`/`resize` facade backing a thread-local instance.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr;
use std::thread::ThreadId;

use crate::bucket::{bucket_for, Bucket};
use crate::common::{ByteRange, Result, LARGEST_ALLOC, NUM_SIZE_CLASSES};
use crate::config::Config;
use crate::fatal::usage_error;
use crate::lost_and_found::LostAndFound;
use crate::page_provider::{PageProvider, SystemPageProvider};
use crate::slab_pool::SlabPool;
use crate::stats::{AllocatorStats, BucketOccupancy, StatsSnapshot};
use std::sync::Arc;

struct ThreadAllocator {
    buckets: [Bucket; NUM_SIZE_CLASSES],
    slab_pool: SlabPool,
    page_provider: Arc<dyn PageProvider>,
    lost_and_found: &'static LostAndFound,
    stats: AllocatorStats,
}

thread_local! {
    static CURRENT: RefCell<Option<ThreadAllocator>> = const { RefCell::new(None) };
}

impl ThreadAllocator {
    fn new(page_provider: Arc<dyn PageProvider>, config: &Config) -> Result<Self> {
        let lost_and_found = LostAndFound::register();
        let mut slab_pool = SlabPool::new(config.slab_pool_cap);
        if let Err(e) = slab_pool.seed(page_provider.as_ref(), config.initial_slabs) {
            lost_and_found.unregister();
            return Err(e);
        }
        Ok(Self {
            buckets: std::array::from_fn(Bucket::new),
            slab_pool,
            page_provider,
            lost_and_found,
            stats: AllocatorStats::default(),
        })
    }

    fn alloc(&mut self, len: usize) -> Result<ByteRange> {
        if len == 0 {
            return Ok(ByteRange::empty());
        }
        if len > LARGEST_ALLOC {
            let range = self.page_provider.alloc(len)?;
            self.stats.record_large_alloc(len);
            return Ok(range);
        }

        let class = bucket_for(len).expect("len <= LARGEST_ALLOC always has a class");
        let mut range = self.buckets[class].new_chunk(&mut self.slab_pool, self.page_provider.as_ref())?;
        range.len = len;
        self.stats.record_alloc(len);
        Ok(range)
    }

    fn free(&mut self, range: ByteRange) {
        if range.is_empty() {
            return;
        }

        // A range reported with the large-to-small boundary sentinel
        // (see `resize`) carries no reliable size-class information in
        // `len` -- it is flagged out of band instead, since the sentinel
        // length is indistinguishable from an ordinary external
        // allocation one byte over LARGEST_ALLOC. The pointer is known to
        // live in one of this thread's small-class buckets, so every
        // bucket is tried instead of dispatching by length.
        if range.boundary_relocated {
            for bucket in self.buckets.iter_mut() {
                if bucket.try_claim_local(range, &mut self.slab_pool, self.page_provider.as_ref()) {
                    self.stats.record_free(range.relocated_len);
                    return;
                }
            }
            usage_error("freed a boundary-relocation range that no bucket on this thread recognizes");
        }

        if range.len > LARGEST_ALLOC {
            unsafe { self.page_provider.free(range) };
            self.stats.record_free(range.len);
            return;
        }

        let class = bucket_for(range.len).expect("len <= LARGEST_ALLOC always has a class");
        self.buckets[class].free_chunk(
            range,
            false,
            &mut self.slab_pool,
            self.page_provider.as_ref(),
            self.lost_and_found,
        );
        self.stats.record_free(range.len);
    }

    fn resize(&mut self, old: ByteRange, new_len: usize) -> Result<ByteRange> {
        let old_len = old.len;
        match (old_len, new_len) {
            (0, 0) => Ok(ByteRange::empty()),
            (0, n) if n <= LARGEST_ALLOC => self.alloc(n),
            (0, n) => {
                let range = self.page_provider.alloc(n)?;
                self.stats.record_large_alloc(n);
                Ok(range)
            }
            (o, 0) if o <= LARGEST_ALLOC => {
                self.free(old);
                Ok(ByteRange::empty())
            }
            (o, 0) => {
                unsafe { self.page_provider.free(old) };
                self.stats.record_free(o);
                Ok(ByteRange::empty())
            }
            (o, n) if o <= LARGEST_ALLOC && n <= LARGEST_ALLOC => {
                let old_class = bucket_for(o).expect("o <= LARGEST_ALLOC always has a class");
                let new_class = bucket_for(n).expect("n <= LARGEST_ALLOC always has a class");
                if old_class == new_class {
                    // Same bucket: no data movement, the pointer is preserved.
                    Ok(ByteRange::new(old.ptr, n))
                } else {
                    let new_range = self.alloc(n)?;
                    unsafe { copy_min(old, new_range, o.min(n)) };
                    self.free(old);
                    Ok(new_range)
                }
            }
            (o, n) if o <= LARGEST_ALLOC && n > LARGEST_ALLOC => {
                let new_range = self.page_provider.alloc(n)?;
                unsafe { copy_min(old, new_range, o.min(n)) };
                self.free(old);
                self.stats.record_large_alloc(n);
                Ok(new_range)
            }
            (o, n) if o > LARGEST_ALLOC && n > LARGEST_ALLOC => unsafe {
                self.page_provider.resize(old, n)
            },
            (o, n) => {
                // o > LARGEST_ALLOC, n <= LARGEST_ALLOC: relocate into the
                // new bucket eagerly, but report the boundary sentinel
                // length -- see DESIGN.md for why the caller's length is
                // not trustworthy across this particular transition. The
                // real length `n` travels with the range out of band so
                // a later `free` can still dispatch and account for it
                // correctly.
                debug_assert!(o > LARGEST_ALLOC && n <= LARGEST_ALLOC);
                let new_range = self.alloc(n)?;
                unsafe { copy_min(old, new_range, o.min(n)) };
                unsafe { self.page_provider.free(old) };
                self.stats.record_free(o);
                Ok(ByteRange::from_boundary_relocation(new_range.ptr, n))
            }
        }
    }

    fn occupancy(&self) -> BucketOccupancy {
        let mut attached = [0usize; NUM_SIZE_CLASSES];
        let mut fragmentation = [0.0f64; NUM_SIZE_CLASSES];
        for (i, bucket) in self.buckets.iter().enumerate() {
            attached[i] = bucket.attached_slab_count();
            fragmentation[i] = bucket.fragmentation();
        }
        BucketOccupancy {
            attached_slabs: attached,
            fragmentation,
        }
    }

    fn teardown(mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.teardown_drain(self.lost_and_found);
            bucket.release_all(self.page_provider.as_ref());
        }
        self.slab_pool.drain(self.page_provider.as_ref());
        self.lost_and_found.unregister();
    }
}

/// # Safety
/// Caller guarantees `min_len <= dst.len` and `min_len <= src.len`, and
/// that `src`/`dst` do not overlap (true for all call sites: `dst` is
/// always a freshly obtained range distinct from `src`).
unsafe fn copy_min(src: ByteRange, dst: ByteRange, min_len: usize) {
    ptr::copy_nonoverlapping(src.ptr.as_ptr(), dst.ptr.as_ptr(), min_len);
}

/// A handle to this thread's allocator instance, obtained from
/// [`SlabAllocator::init`] or [`SlabAllocator::init_with`]. Not `Send`:
/// the per-thread instance's address must never escape to another
/// thread. Every method additionally asserts, at runtime, that it is
/// still being called from the owning thread against the still-live
/// instance -- a defensive backstop for the invariant the type system
/// already enforces.
pub struct SlabAllocator {
    owner: ThreadId,
    instance_addr: usize,
    _not_send: PhantomData<*const ()>,
}

impl SlabAllocator {
    /// Construct or attach to this thread's instance using the default
    /// system page provider and configuration. Idempotent: a second call
    /// on the same thread returns a handle to the same instance.
    pub fn init() -> Self {
        Self::init_with(Arc::new(SystemPageProvider::new()), Config::default())
    }

    /// As [`SlabAllocator::init`], but with an explicit page provider and
    /// configuration (including how many empty slabs to pre-seed).
    pub fn init_with(page_provider: Arc<dyn PageProvider>, config: Config) -> Self {
        CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let allocator = ThreadAllocator::new(page_provider, &config)
                    .unwrap_or_else(|e| usage_error(&format!("thread allocator init failed: {e}")));
                *slot = Some(allocator);
            }
        });

        let instance_addr =
            CURRENT.with(|cell| cell.borrow().as_ref().unwrap() as *const ThreadAllocator as usize);

        Self {
            owner: std::thread::current().id(),
            instance_addr,
            _not_send: PhantomData,
        }
    }

    /// Release this thread's instance: drains every bucket's
    /// lost-and-found slice, frees pooled slabs, and decrements the
    /// global lost-and-found reference count.
    pub fn deinit(self) {
        self.check();
        let allocator = CURRENT.with(|cell| cell.borrow_mut().take());
        if let Some(allocator) = allocator {
            allocator.teardown();
        }
    }

    pub fn alloc(&self, len: usize) -> Result<ByteRange> {
        self.check();
        CURRENT.with(|cell| cell.borrow_mut().as_mut().unwrap().alloc(len))
    }

    pub fn free(&self, range: ByteRange) {
        self.check();
        CURRENT.with(|cell| cell.borrow_mut().as_mut().unwrap().free(range));
    }

    pub fn resize(&self, old: ByteRange, new_len: usize) -> Result<ByteRange> {
        self.check();
        CURRENT.with(|cell| cell.borrow_mut().as_mut().unwrap().resize(old, new_len))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.check();
        CURRENT.with(|cell| cell.borrow().as_ref().unwrap().stats.snapshot())
    }

    pub fn occupancy(&self) -> BucketOccupancy {
        self.check();
        CURRENT.with(|cell| cell.borrow().as_ref().unwrap().occupancy())
    }

    fn check(&self) {
        if std::thread::current().id() != self.owner {
            usage_error("allocator handle used from a thread other than the one that created it");
        }
        let live = CURRENT.with(|cell| cell.borrow().as_ref().map(|a| a as *const _ as usize));
        if live != Some(self.instance_addr) {
            usage_error("allocator handle is stale: this thread's instance has been torn down and reinitialized");
        }
    }
}
