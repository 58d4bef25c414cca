//! Bounded retry for objects that may not exist yet.
//!
//! ResourceClaims generated from a Pod's claim templates are created
//! asynchronously, so the Pod can reach admission before its claim is visible.
//! [`retry_while_missing`] keeps looking for the object until a retry window
//! closes, never sleeping past the request's own deadline.
//!
//! # Example
//!
//! ```ignore
//! use dracpu_admission::retry::{retry_while_missing, NotFoundRetry};
//!
//! let claim = retry_while_missing(
//!     &NotFoundRetry::default(),
//!     &ctx,
//!     "get_resource_claim",
//!     || async { store.get_claim("default", "claim-4").await.map_err(ClaimError::from) },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::context::{ContextDone, RequestContext};

/// Default delay between lookups of a missing object
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(50);

/// Default total window for looking up a missing object
pub const DEFAULT_RETRY_TOTAL: Duration = Duration::from_millis(500);

/// Retry window for lookups that report "not found"
///
/// Only not-found outcomes are retried; every other failure is returned
/// immediately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotFoundRetry {
    /// Delay between lookups (zero selects [`DEFAULT_RETRY_WAIT`])
    pub wait: Duration,
    /// Total time to keep looking before treating the object as absent
    pub total: Duration,
}

impl Default for NotFoundRetry {
    fn default() -> Self {
        Self {
            wait: DEFAULT_RETRY_WAIT,
            total: DEFAULT_RETRY_TOTAL,
        }
    }
}

impl NotFoundRetry {
    /// Create a retry window with the given wait and total budget
    pub fn new(wait: Duration, total: Duration) -> Self {
        Self { wait, total }
    }

    /// A single lookup with no retries
    pub fn disabled() -> Self {
        Self::new(DEFAULT_RETRY_WAIT, Duration::ZERO)
    }

    fn effective_wait(&self) -> Duration {
        if self.wait.is_zero() {
            DEFAULT_RETRY_WAIT
        } else {
            self.wait
        }
    }

    /// The earlier of `now + total` and the request deadline
    pub fn deadline(&self, ctx: &RequestContext) -> Instant {
        let own = Instant::now() + self.total;
        match ctx.deadline() {
            Some(request_deadline) if request_deadline < own => request_deadline,
            _ => own,
        }
    }
}

/// Run `operation` until it finds the object or the retry window closes.
///
/// `operation` returns `Ok(None)` for "not found". Returns `Ok(None)` when the
/// object never shows up within the window, the first non-not-found error
/// unchanged, or the request's cancellation if it fires mid-lookup or
/// mid-sleep.
pub async fn retry_while_missing<F, Fut, T, E>(
    policy: &NotFoundRetry,
    ctx: &RequestContext,
    operation_name: &str,
    mut operation: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: From<ContextDone>,
{
    let deadline = policy.deadline(ctx);
    let wait = policy.effective_wait();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let found = tokio::select! {
            biased;
            done = ctx.done() => return Err(done.into()),
            result = operation() => result?,
        };
        if found.is_some() {
            return Ok(found);
        }

        let now = Instant::now();
        if now > deadline {
            debug!(
                operation = %operation_name,
                attempt = attempt,
                "Object still missing after retry window"
            );
            return Ok(None);
        }
        let sleep_for = wait.min(deadline.saturating_duration_since(now));
        if sleep_for.is_zero() {
            debug!(
                operation = %operation_name,
                attempt = attempt,
                "Object still missing after retry window"
            );
            return Ok(None);
        }

        debug!(
            operation = %operation_name,
            attempt = attempt,
            delay_ms = sleep_for.as_millis(),
            "Object not found, retrying"
        );

        tokio::select! {
            biased;
            done = ctx.done() => return Err(done.into()),
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}
