//! A general-purpose slab allocator for small-object workloads in
//! multi-threaded programs.
//!
//! Each thread owns a private [`SlabAllocator`] instance; cross-thread
//! frees are handed off through a process-wide "lost-and-found" so that
//! an application never synchronizes on the hot allocation/free path
//! within a single thread.
//!
//! ```
//! use rdb_slab_alloc::SlabAllocator;
//!
//! let allocator = SlabAllocator::init();
//! let range = allocator.alloc(100).unwrap();
//! allocator.free(range);
//! allocator.deinit();
//! ```

mod allocator;
mod bucket;
mod common;
mod config;
mod error;
mod fatal;
mod lost_and_found;
mod page_provider;
mod slab;
mod slab_pool;
mod stats;

pub use allocator::SlabAllocator;
pub use common::{ByteRange, LARGEST_ALLOC};
pub use config::Config;
pub use error::{AllocError, Result};
pub use page_provider::{PageProvider, SystemPageProvider};
pub use stats::{BucketOccupancy, StatsSnapshot};
