// SPDX-License-Identifier: MPL-2.0

//! Shared async runtime for the binary.
//!
//! Library types never create a runtime themselves; callers that start from
//! synchronous code go through here.

use once_cell::sync::OnceCell;
use std::future::Future;
use tokio::runtime::Runtime;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Shared multi-threaded Tokio runtime, built on first use.
/// Two worker threads are plenty for I/O-bound sync work.
fn runtime() -> std::io::Result<&'static Runtime> {
    RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("runestones-async")
            .build()
    })
}

/// Execute a future on the shared runtime, blocking until completion.
pub fn block_on<F: Future>(future: F) -> std::io::Result<F::Output> {
    Ok(runtime()?.block_on(future))
}

/// Spawn a future on the shared runtime without blocking.
pub fn spawn<F>(future: F) -> std::io::Result<tokio::task::JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Ok(runtime()?.spawn(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_work_can_be_awaited_from_block_on() {
        let handle = spawn(async { 40 + 2 }).unwrap();
        let value = block_on(async { handle.await.unwrap() }).unwrap();
        assert_eq!(value, 42);
    }
}
