// SPDX-License-Identifier: MPL-2.0

//! Shared async runtime for all network operations.
//!
//! This module provides a single Tokio runtime that all persistence
//! operations share, so synchronous UI code can drive the store without
//! creating a runtime per request.

use once_cell::sync::Lazy;
use std::future::Future;
use tokio::runtime::Runtime;

/// Shared multi-threaded Tokio runtime for all async operations.
/// Using 2 worker threads is sufficient for I/O-bound network operations.
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("softspot-async")
        .build()
        .expect("failed to create async runtime")
});

/// Execute a future on the shared runtime, blocking until completion.
/// Use this from synchronous code that needs to call async functions.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}
