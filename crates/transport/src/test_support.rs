use std::sync::{Mutex, MutexGuard};

static PROCESS_MUTEX: Mutex<()> = Mutex::new(());

/// Serializes tests that spawn children. A stub script written by one test
/// can fail to exec with ETXTBSY while another test forks.
pub(crate) fn process_lock() -> MutexGuard<'static, ()> {
    PROCESS_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
}
