//! # Admission Webhook Tests
//!
//! Drives `/mutate` through the axum router and `mutate_secret` directly.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use common::*;
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use random_secret_controller::controller::generator::Charset;
use random_secret_controller::webhook::{mutate_secret, webhook_router};
use serde_json::{json, Value};
use tower::ServiceExt;

fn review(operation: &str, object: Option<Value>) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Secret"},
            "resource": {"group": "", "version": "v1", "resource": "secrets"},
            "name": "app",
            "namespace": "default",
            "operation": operation,
            "userInfo": {"username": "admin"},
            "object": object,
            "dryRun": false
        }
    })
}

fn secret_review(operation: &str, secret: &Secret) -> Value {
    review(operation, Some(serde_json::to_value(secret).unwrap()))
}

fn request_from(review: Value) -> AdmissionRequest<DynamicObject> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_value(review).unwrap();
    review.try_into().unwrap()
}

/// Response section of the review returned for `review`
fn respond(review: Value) -> Value {
    let response = mutate_secret(&request_from(review)).unwrap();
    serde_json::to_value(response.into_review()).unwrap()["response"].clone()
}

/// Decoded JSON patch operations of a response, if any
fn patch_ops(response: &Value) -> Option<Vec<Value>> {
    let bytes: Vec<u8> = match response.get("patch")? {
        Value::String(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap(),
        Value::Array(raw) => raw
            .iter()
            .map(|b| u8::try_from(b.as_u64().unwrap()).unwrap())
            .collect(),
        _ => return None,
    };
    Some(serde_json::from_slice(&bytes).unwrap())
}

fn decode_data_value(encoded: &Value) -> String {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_str().unwrap())
        .unwrap();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_managed_secret_patched_with_alphanumeric_value() {
    let secret = managed_secret("default", "app", "token", "16", "false");
    let response = respond(secret_review("CREATE", &secret));

    assert_eq!(response["allowed"], json!(true));
    assert_eq!(response["patchType"], json!("JSONPatch"));

    let ops = patch_ops(&response).expect("Managed Secret should be patched");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["op"], json!("add"));
    assert_eq!(ops[0]["path"], json!("/data"));

    let value = decode_data_value(&ops[0]["value"]["token"]);
    assert_eq!(value.len(), 16);
    assert!(value.chars().all(|c| Charset::Alphanumeric.contains(c)));
}

#[test]
fn test_unmanaged_secret_allowed_without_patch() {
    let secret = annotated_secret("default", "app", &[], &[]);
    let response = respond(secret_review("CREATE", &secret));

    assert_eq!(response["allowed"], json!(true));
    assert!(patch_ops(&response).is_none());
}

#[test]
fn test_existing_value_is_not_replaced() {
    let mut secret = managed_secret("default", "app", "password", "16", "true");
    secret.data = Some(
        [(
            "password".to_string(),
            k8s_openapi::ByteString(b"supplied".to_vec()),
        )]
        .into(),
    );
    let response = respond(secret_review("CREATE", &secret));

    assert_eq!(response["allowed"], json!(true));
    assert!(patch_ops(&response).is_none());
}

#[test]
fn test_existing_data_gets_key_added() {
    let mut secret = managed_secret("default", "app", "password", "12", "true");
    secret.data = Some(
        [(
            "username".to_string(),
            k8s_openapi::ByteString(b"app".to_vec()),
        )]
        .into(),
    );
    let response = respond(secret_review("CREATE", &secret));

    let ops = patch_ops(&response).unwrap();
    assert_eq!(ops[0]["path"], json!("/data/password"));
    assert_eq!(decode_data_value(&ops[0]["value"]).len(), 12);
}

#[test]
fn test_update_is_never_mutated() {
    let secret = managed_secret("default", "app", "password", "12", "true");
    let response = respond(secret_review("UPDATE", &secret));

    assert_eq!(response["allowed"], json!(true));
    assert!(patch_ops(&response).is_none());
}

#[test]
fn test_create_without_object_is_rejected() {
    let request = request_from(review("CREATE", None));
    assert!(mutate_secret(&request).is_err());
}

#[tokio::test]
async fn test_router_patches_managed_secret() {
    let secret = managed_secret("default", "app", "token", "16", "false");
    let body = serde_json::to_vec(&secret_review("CREATE", &secret)).unwrap();

    let response = webhook_router()
        .oneshot(
            Request::post("/mutate")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let review: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        review["response"]["uid"],
        json!("705ab4f5-6393-11e8-b7cc-42010a800002")
    );
    let ops = patch_ops(&review["response"]).unwrap();
    assert_eq!(decode_data_value(&ops[0]["value"]["token"]).len(), 16);
}

#[tokio::test]
async fn test_router_rejects_garbage_with_bad_request() {
    let response = webhook_router()
        .oneshot(
            Request::post("/mutate")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid admission review"));
}

#[tokio::test]
async fn test_router_rejects_review_without_request() {
    let body = json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"});
    let response = webhook_router()
        .oneshot(
            Request::post("/mutate")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
