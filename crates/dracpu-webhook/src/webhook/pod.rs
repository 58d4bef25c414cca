//! Pod Validation Webhook
//!
//! Handles AdmissionReview requests for Pods, denying those whose CPU
//! requests do not match the dra.cpu ResourceClaims they reference.

use std::sync::Arc;

use axum::{extract::State, Json};
use dracpu_admission::{validate_pod_claims, PodSnapshot, RequestContext};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::DynamicObject,
    core::{
        admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
        GroupVersionKind,
    },
};
use tracing::{debug, error, info, warn};

use super::WebhookState;

/// Handle validating admission review for Pods
///
/// Every review gets a response: malformed reviews are answered as invalid,
/// anything that is not a Pod create/update is allowed unchanged.
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let ctx = state.request_context();
    let response = review_pod(&state, &ctx, &req).await;
    Json(response.into_review())
}

/// Process a single admission request under `ctx`
pub async fn review_pod(
    state: &WebhookState,
    ctx: &RequestContext,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = request.uid.as_str();
    let response = AdmissionResponse::from(request);

    if !matches!(request.operation, Operation::Create | Operation::Update) {
        debug!(uid = %uid, operation = ?request.operation, "Operation not validated, allowing");
        return response;
    }

    if !is_core_pod(&request.kind) {
        debug!(uid = %uid, kind = %request.kind.kind, "Not a Pod, allowing");
        return response;
    }

    let Some(obj) = request.object.as_ref() else {
        debug!(uid = %uid, "No Pod object in request, allowing");
        return response;
    };

    let pod = match decode_pod(obj) {
        Ok(pod) => pod,
        Err(e) => {
            warn!(uid = %uid, error = %e, "Failed to decode Pod");
            return response.deny(format!("failed to decode Pod: {e}"));
        }
    };

    let snapshot = PodSnapshot::from_pod(&pod, request.namespace.as_deref());
    let violations = validate_pod_claims(
        ctx,
        &snapshot,
        &state.driver_name,
        state.counter.as_ref(),
    )
    .await;

    if violations.is_empty() {
        debug!(
            uid = %uid,
            namespace = %snapshot.namespace,
            pod = %snapshot.name,
            "Pod allowed"
        );
        return response;
    }

    info!(
        uid = %uid,
        namespace = %snapshot.namespace,
        pod = %snapshot.name,
        violations = violations.len(),
        "Pod denied"
    );
    response.deny(violations.join("; "))
}

/// Core-group `Pod`
fn is_core_pod(kind: &GroupVersionKind) -> bool {
    kind.group.is_empty() && kind.kind == "Pod"
}

/// Convert the dynamic admission object into a typed Pod
///
/// The type meta is forced to `v1/Pod`; some API servers omit it on embedded
/// objects.
fn decode_pod(obj: &DynamicObject) -> Result<Pod, serde_json::Error> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("apiVersion".to_string(), "v1".into());
        map.insert("kind".to_string(), "Pod".into());
    }
    serde_json::from_value(value)
}
