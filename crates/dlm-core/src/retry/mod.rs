//! Retry and backoff policy.
//!
//! Error classification (curl errors, HTTP status) and the delay between
//! attempts live here so the scheduler and the curl engine share one policy.
//! How many retries a task gets is a per-task option; this module only
//! decides whether another attempt is allowed and how long to wait for it.

mod classify;
mod policy;

pub use classify::{classify_curl_error, classify_http_status};
pub use policy::{RetryDecision, RetryPolicy};
