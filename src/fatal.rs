//! Fatal, unrecoverable usage errors. These are not represented as
//! `Result` values because the caller has already lost the ability to
//! recover -- e.g. ownership of a chunk has logically transferred and
//! cannot be taken back.

/// Log `message` and abort the process. Never returns.
pub fn usage_error(message: &str) -> ! {
    tracing::error!(target: "rdb_slab_alloc::fatal", "{message}");
    std::process::abort();
}
