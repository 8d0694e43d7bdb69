//! Ambient configuration: a small `Default`-able struct parameterizing
//! the two knobs the core exposes at init time -- how many slabs to
//! pre-seed, and how large the per-thread slab pool is allowed to grow.

use crate::common::SLAB_POOL_CAP;

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of empty slabs to pre-seed into the slab pool on `initWith`.
    pub initial_slabs: usize,
    /// Maximum number of empty slabs the slab pool retains before
    /// returning the excess to the page provider.
    pub slab_pool_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_slabs: 0,
            slab_pool_cap: SLAB_POOL_CAP,
        }
    }
}
