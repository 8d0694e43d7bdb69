//! Error taxonomy for the allocator core: one `thiserror` variant per
//! recoverable condition. Usage errors are not represented here because
//! they are not recoverable -- see [`crate::fatal`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AllocError>;

#[derive(Error, Debug)]
pub enum AllocError {
    /// The page provider could not satisfy a request for a fresh slab or
    /// an external-size chunk.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}
