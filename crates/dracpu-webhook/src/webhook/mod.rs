//! Validating Admission Webhook for dra.cpu
//!
//! The API server sends Pod create/update reviews to [`VALIDATE_PATH`]; the
//! webhook denies Pods whose CPU requests disagree with the `dra.cpu` claims
//! they reference. A health route reports readiness once the TLS listener is
//! bound.

pub mod pod;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use dracpu_admission::{ClaimCpuCounter, RequestContext};
use tokio_util::sync::CancellationToken;

/// Path the ValidatingWebhookConfiguration points at
pub const VALIDATE_PATH: &str = "/validate";

/// Largest AdmissionReview body accepted (1 MiB)
pub const MAX_REVIEW_BYTES: usize = 1 << 20;

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Resolves claim references to CPU counts
    pub counter: Arc<dyn ClaimCpuCounter>,
    /// Driver name used in violation messages
    pub driver_name: String,
    /// Deadline applied to every review
    pub admission_timeout: Duration,
    /// Parent of every request's cancellation token
    pub requests: CancellationToken,
    ready: AtomicBool,
}

impl WebhookState {
    /// Create a new webhook state; the state starts out not ready
    pub fn new(
        counter: Arc<dyn ClaimCpuCounter>,
        driver_name: impl Into<String>,
        admission_timeout: Duration,
    ) -> Self {
        Self {
            counter,
            driver_name: driver_name.into(),
            admission_timeout,
            requests: CancellationToken::new(),
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the server as able to accept reviews
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether the server accepts reviews
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Context for a single review: the admission timeout plus a child of the
    /// shutdown token
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.admission_timeout, self.requests.child_token())
    }
}

/// Create the webhook router
///
/// - POST [`VALIDATE_PATH`] - Validate Pods against their dra.cpu claims
/// - GET `healthz_path` - 200 once ready, 503 before
pub fn webhook_router(state: Arc<WebhookState>, healthz_path: &str) -> Router {
    Router::new()
        .route(VALIDATE_PATH, post(pod::validate_handler))
        .route(healthz_path, get(healthz_handler))
        .layer(DefaultBodyLimit::max(MAX_REVIEW_BYTES))
        .with_state(state)
}

/// Readiness and liveness probe
pub async fn healthz_handler(State(state): State<Arc<WebhookState>>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dracpu_admission::ClaimError;

    struct ZeroCounter;

    #[async_trait]
    impl ClaimCpuCounter for ZeroCounter {
        async fn claim_cpu_count(
            &self,
            _ctx: &RequestContext,
            _namespace: &str,
            _claim_name: &str,
        ) -> Result<i64, ClaimError> {
            Ok(0)
        }
    }

    fn state() -> Arc<WebhookState> {
        Arc::new(WebhookState::new(
            Arc::new(ZeroCounter),
            "dra.cpu",
            Duration::from_secs(8),
        ))
    }

    #[tokio::test]
    async fn test_healthz_unavailable_until_ready() {
        let state = state();
        let (status, _) = healthz_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let (status, body) = healthz_handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_request_context_follows_shutdown_token() {
        let state = state();
        let ctx = state.request_context();
        assert!(ctx.deadline().is_some());
        assert!(ctx.state().is_none());

        state.requests.cancel();
        assert!(ctx.state().is_some());
    }

    #[tokio::test]
    async fn test_request_context_cancel_is_local() {
        let state = state();
        let first = state.request_context();
        let second = state.request_context();
        first.cancel();
        assert!(first.state().is_some());
        assert!(second.state().is_none());
        assert!(!state.requests.is_cancelled());
    }

    #[test]
    fn test_router_builds_with_custom_healthz_path() {
        let _router = webhook_router(state(), "/readyz");
    }
}
