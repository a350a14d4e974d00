//! RAII resource guards for automatic cleanup.
//!
//! Both guards are released explicitly during the cleanup phase; `Drop` is
//! the backstop for a dropped future or an unwinding panic.
//!
//! - [`ArchiveGuard`] - Removal of the local archive
//! - [`SourceLock`] - Exclusive ownership of a source tree's archive path

mod archive_guard;
mod source_lock;

pub use archive_guard::ArchiveGuard;
pub use source_lock::SourceLock;
