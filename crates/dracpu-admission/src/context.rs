//! Request-scoped deadline and cancellation
//!
//! Every admission review runs under a [`RequestContext`]: an optional
//! deadline (the admission timeout) plus a cancellation token shared with the
//! surrounding server. Anything that waits inside claim resolution races
//! against [`RequestContext::done`].

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a request context stopped waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextDone {
    /// The cancellation token fired
    Cancelled,
    /// The deadline passed
    DeadlineExceeded,
}

/// Deadline and cancellation signal for one admission request
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// A context that never expires and is never cancelled
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A context without deadline, cancelled through `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel,
        }
    }

    /// A context expiring `timeout` from now, cancelled through `cancel`
    pub fn with_timeout(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel,
        }
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every context sharing its token
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns why the context is finished, or `None` while it is still live
    pub fn state(&self) -> Option<ContextDone> {
        if self.cancel.is_cancelled() {
            return Some(ContextDone::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextDone::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextDone {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => ContextDone::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextDone::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                ContextDone::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_is_live() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.state(), None);
    }

    #[tokio::test]
    async fn cancel_is_shared_between_clones() {
        let ctx = RequestContext::new(CancellationToken::new());
        let clone = ctx.clone();
        ctx.cancel();
        assert_eq!(clone.state(), Some(ContextDone::Cancelled));
        assert_eq!(clone.done().await, ContextDone::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn done_fires_at_deadline() {
        let start = Instant::now();
        let ctx = RequestContext::with_timeout(Duration::from_millis(200), CancellationToken::new());
        assert_eq!(ctx.state(), None);
        assert_eq!(ctx.done().await, ContextDone::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(ctx.state(), Some(ContextDone::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_later_deadline() {
        let token = CancellationToken::new();
        let ctx = RequestContext::with_timeout(Duration::from_secs(8), token.child_token());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        assert_eq!(ctx.done().await, ContextDone::Cancelled);
    }
}
