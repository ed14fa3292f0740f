//! Infrastructure shared by the audit pipeline
//!
//! - Retry with backoff (evidence downloads)
//! - Graceful shutdown (signal handling, cycle draining)

mod retry;
mod shutdown;

pub use retry::{Retry, RetryConfig, RetryResult};
pub use shutdown::{shutdown_signal, wait_for_drain, ShutdownCoordinator, ShutdownSignal};
