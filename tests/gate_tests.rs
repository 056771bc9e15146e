//! End-to-end gate tests driving the router with an in-memory store double.

mod common;

use std::sync::Arc;

use authgate::config::Config;
use authgate::gate::{Gate, GateContext, gate_middleware};
use authgate::store::{MemoryParameterStore, ParameterStore};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::middleware;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use common::{TEST_ISSUER, authority, issue_bearer, standard_claims};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_config() -> Config {
    let mut config = Config::default();
    config.gate.allowed_issuers.push(TEST_ISSUER.to_string());
    config
}

fn seeded_store() -> MemoryParameterStore {
    let authority = authority();
    MemoryParameterStore::new()
        .with_parameter(
            "/authgate/certificates/encryption",
            &authority.encryption_blob(),
        )
        .with_parameter("/authgate/certificates/signing", &authority.signing_blob())
}

/// Echoes the identity headers the gate set on the forwarded request.
async fn echo(request: Request<Body>) -> Json<Value> {
    let headers = request.headers();
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    Json(json!({
        "user_id": value("x-user-id"),
        "user_email": value("x-user-email"),
        "authorization": value("authorization"),
        "user_agent": value("user-agent"),
    }))
}

/// A gated router whose origin echoes forwarded headers.
fn echo_router(config: &Config, store: Arc<dyn ParameterStore>) -> Router {
    let context = Arc::new(GateContext::new(config, store).unwrap());
    Router::new()
        .route("/echo", get(echo))
        .layer(middleware::from_fn_with_state(context, gate_middleware))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn authorized_request_carries_identity_headers() {
    let authority = authority();
    let config = test_config();
    let store: Arc<dyn ParameterStore> = Arc::new(seeded_store());
    let router = echo_router(&config, store);

    // Spec scenario: subject set, email omitted.
    let claims = standard_claims("1234567890", None, TEST_ISSUER);
    let bearer = issue_bearer(authority, &claims);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header(header::AUTHORIZATION, &bearer)
                .header(header::USER_AGENT, "Mozilla/5.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(echoed["user_id"], "1234567890");
    assert_eq!(echoed["user_email"], "");
    // The rest of the request is untouched.
    assert_eq!(echoed["authorization"], bearer.as_str());
    assert_eq!(echoed["user_agent"], "Mozilla/5.0");
}

#[tokio::test]
async fn spoofed_identity_headers_are_replaced() {
    let authority = authority();
    let config = test_config();
    let store: Arc<dyn ParameterStore> = Arc::new(seeded_store());
    let router = echo_router(&config, store);

    let claims = standard_claims("1234567890", None, TEST_ISSUER);
    let bearer = issue_bearer(authority, &claims);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header(header::AUTHORIZATION, &bearer)
                .header("x-user-id", "admin")
                .header("x-user-email", "admin@example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let echoed: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(echoed["user_id"], "1234567890");
    assert_eq!(echoed["user_email"], "");
}

#[tokio::test]
async fn missing_credential_rejects_without_store_call() {
    let store = Arc::new(seeded_store());
    let gate = Gate::with_store(test_config(), store.clone()).unwrap();

    let response = gate
        .router()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html"
    );
    let body = body_string(response).await;
    assert!(body.contains("no auth header present"));
    assert_eq!(store.calls(), 0, "anonymous requests must not hit the store");
}

#[tokio::test]
async fn invalid_credential_is_a_generic_401() {
    let store = Arc::new(seeded_store());
    let gate = Gate::with_store(test_config(), store.clone()).unwrap();

    let response = gate
        .router()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::AUTHORIZATION, "Bearer garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_string(response).await;
    assert_eq!(body, "User is not authenticated");
    // Both records were fetched before the credential was judged.
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn tampered_credential_is_rejected() {
    let authority = authority();
    let store: Arc<dyn ParameterStore> = Arc::new(seeded_store());
    let gate = Gate::with_store(test_config(), store).unwrap();

    let claims = standard_claims("1234567890", None, TEST_ISSUER);
    let bearer = issue_bearer(authority, &claims);
    // Truncating the tag corrupts the envelope.
    let tampered = &bearer[..bearer.len() - 4];

    let response = gate
        .router()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::AUTHORIZATION, tampered)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_store_record_is_a_500() {
    let authority = authority();
    let store: Arc<dyn ParameterStore> = Arc::new(
        MemoryParameterStore::new().with_parameter(
            "/authgate/certificates/encryption",
            &authority.encryption_blob(),
        ),
    );
    let gate = Gate::with_store(test_config(), store).unwrap();

    let claims = standard_claims("1234567890", None, TEST_ISSUER);
    let bearer = issue_bearer(authority, &claims);

    let response = gate
        .router()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert_eq!(body, "An error occurred while validating the request");
}

#[tokio::test]
async fn malformed_stored_material_is_a_500() {
    let authority = authority();
    let store: Arc<dyn ParameterStore> = Arc::new(
        MemoryParameterStore::new()
            .with_parameter(
                "/authgate/certificates/encryption",
                &authority.encryption_blob(),
            )
            .with_parameter("/authgate/certificates/signing", "not pem at all"),
    );
    let gate = Gate::with_store(test_config(), store).unwrap();

    let claims = standard_claims("1234567890", None, TEST_ISSUER);
    let bearer = issue_bearer(authority, &claims);

    let response = gate
        .router()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_bypasses_the_gate() {
    let store = Arc::new(seeded_store());
    let gate = Gate::with_store(test_config(), store.clone()).unwrap();

    let response = gate
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn demo_origin_answers_authorized_requests() {
    let authority = authority();
    let store: Arc<dyn ParameterStore> = Arc::new(seeded_store());
    let gate = Gate::with_store(test_config(), store).unwrap();

    let claims = standard_claims("1234567890", None, TEST_ISSUER);
    let bearer = issue_bearer(authority, &claims);

    let response = gate
        .router()
        .oneshot(
            Request::builder()
                .uri("/example-path")
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Hey from secure endpoint!");
}
