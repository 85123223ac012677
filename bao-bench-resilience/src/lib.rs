//! Resilience patterns for bao-bench
//!
//! This crate provides retry policies for provisioning calls that race
//! server-side state changes, and the shutdown coordination used to stop an
//! attack and drain in-flight requests.

pub mod backoff;
pub mod retry;
pub mod shutdown;

// Re-export commonly used types
pub use backoff::Backoff;
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use shutdown::{
    InFlightGuard, ShutdownCoordinator, ShutdownError, ShutdownListener, ShutdownSignal,
};
