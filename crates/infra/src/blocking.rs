//! Blocking filesystem work called from async code.

use tokio::runtime::{Handle, RuntimeFlavor};

/// Run `f`, moving the current worker's other tasks off-thread first when
/// called on a multi-threaded runtime.
///
/// On a current-thread runtime, or outside Tokio, `f` simply runs inline.
pub(crate) fn offload<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
