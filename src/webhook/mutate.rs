//! # Secret Mutation
//!
//! Handles AdmissionReview requests for Secrets, injecting a generated value
//! into managed Secrets before they are persisted.

use crate::controller::policy::{self, GenerationPolicy, PolicyDecision};
use crate::controller::store::decode;
use crate::observability::metrics;
use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine as _;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use tracing::{debug, error, info, warn};

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The admission review envelope was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    /// The embedded object could not be decoded as a Secret
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        metrics::increment_admission_requests("rejected");
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": self.to_string()})),
        )
            .into_response()
    }
}

/// Handle mutating admission review for Secrets
///
/// The body is decoded by hand so that a malformed review gets a 400 with a
/// message instead of the extractor's default rejection.
pub async fn mutate_handler(
    body: Bytes,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Failed to decode admission review");
        WebhookError::InvalidReview(e.to_string())
    })?;

    let request: AdmissionRequest<DynamicObject> = review.try_into().map_err(
        |e: kube::core::admission::ConvertAdmissionReviewError| {
            warn!(error = %e, "Admission review carries no request");
            WebhookError::InvalidReview(e.to_string())
        },
    )?;

    let response = mutate_secret(&request)?;
    Ok(Json(response.into_review()))
}

/// Decide the admission response for one Secret creation
///
/// Never denies: unmanaged, already-populated or non-CREATE requests are
/// allowed unchanged, managed ones are allowed with a JSON patch.
pub fn mutate_secret(
    request: &AdmissionRequest<DynamicObject>,
) -> Result<AdmissionResponse, WebhookError> {
    let uid = &request.uid;

    // Only creations are mutated; an update must never regenerate a value
    if !matches!(request.operation, Operation::Create) {
        debug!(uid = %uid, operation = ?request.operation, "Not a CREATE request, allowing unchanged");
        metrics::increment_admission_requests("ignored");
        return Ok(AdmissionResponse::from(request));
    }

    let obj = request.object.as_ref().ok_or_else(|| {
        WebhookError::InvalidObject("CREATE request without an object".to_string())
    })?;
    let secret: Secret = decode(obj).map_err(|e| {
        warn!(uid = %uid, error = %e, "Failed to decode Secret from admission request");
        WebhookError::InvalidObject(format!("error decoding Secret: {e}"))
    })?;

    let name = secret
        .metadata
        .name
        .as_deref()
        .or(secret.metadata.generate_name.as_deref())
        .unwrap_or_default()
        .to_string();
    let namespace = request.namespace.clone().unwrap_or_default();

    let PolicyDecision::Managed(policy) = policy::evaluate(&secret.metadata) else {
        debug!(uid = %uid, namespace = %namespace, name = %name, "Secret not managed, allowing unchanged");
        metrics::increment_admission_requests("unmanaged");
        return Ok(AdmissionResponse::from(request));
    };

    if policy.is_handled(&secret) {
        debug!(uid = %uid, namespace = %namespace, name = %name, key = %policy.key, "Secret already carries a value");
        metrics::increment_admission_requests("already-set");
        return Ok(AdmissionResponse::from(request));
    }

    let ops = build_patch_operations(&secret, &policy, &policy.generate());

    match AdmissionResponse::from(request).with_patch(json_patch::Patch(ops)) {
        Ok(response) => {
            metrics::increment_admission_requests("patched");
            metrics::increment_values_generated("admission");
            info!(
                uid = %uid,
                namespace = %namespace,
                name = %name,
                key = %policy.key,
                length = policy.length,
                "Injected generated value into Secret"
            );
            Ok(response)
        }
        Err(e) => {
            // Allow without a patch; the next sweep fills the value
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            metrics::increment_admission_requests("patch-error");
            Ok(AdmissionResponse::from(request))
        }
    }
}

/// Build JSON patch operations placing `value` at the policy key
///
/// `data` holds base64; an empty `stringData` entry for the key would win over
/// `data` on persistence, so it is replaced in place instead.
fn build_patch_operations(
    secret: &Secret,
    policy: &GenerationPolicy,
    value: &str,
) -> Vec<PatchOperation> {
    let key = policy.key.as_str();

    if secret
        .string_data
        .as_ref()
        .is_some_and(|d| d.contains_key(key))
    {
        return vec![PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["stringData", key]),
            value: serde_json::Value::String(value.to_string()),
        })];
    }

    let encoded = serde_json::Value::String(
        base64::engine::general_purpose::STANDARD.encode(value.as_bytes()),
    );

    if secret.data.is_none() {
        vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["data"]),
            value: serde_json::json!({ key: encoded }),
        })]
    } else {
        vec![PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["data", key]),
            value: encoded,
        })]
    }
}
