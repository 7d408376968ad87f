//! Campaign dispatch
//!
//! The scheduler claims due campaigns; the dispatcher fans their pending
//! recipients out to send workers, each throttled by the shared rate
//! limiter and retried with exponential backoff.

pub mod dispatcher;
pub mod rate_limiter;
pub mod scheduler;

pub use dispatcher::{DispatchSummary, Dispatcher, RetryPolicy};
pub use rate_limiter::RateLimiter;
pub use scheduler::DispatchScheduler;
