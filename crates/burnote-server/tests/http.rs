use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use burnote_server::store::crypto::generate_key;
use burnote_server::store::{ChaChaCrypto, CryptoProvider, MemoryStore};
use burnote_server::{router, AppState, SecretService, ServiceConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Encrypts normally, never decrypts.
struct Tampered(ChaChaCrypto);

impl CryptoProvider for Tampered {
    fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
        self.0.encrypt(plaintext)
    }

    fn decrypt(&self, _ciphertext: &[u8], _nonce: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("decrypt: aead::Error")
    }
}

fn app_with(crypto: Arc<dyn CryptoProvider>) -> axum::Router {
    let service = SecretService::new(
        Arc::new(MemoryStore::new()),
        crypto,
        ServiceConfig::default(),
    );
    router(AppState { service })
}

fn app() -> axum::Router {
    app_with(Arc::new(ChaChaCrypto::new(generate_key())))
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn create(app: &axum::Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/secrets")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn reveal(app: &axum::Router, id: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(format!("/api/secrets/{id}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

fn created_id(body: &Value) -> String {
    body["data"]["id"].as_str().expect("id in response").to_owned()
}

#[tokio::test]
async fn health_is_ok() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_then_reveal_once() {
    let app = app();
    let (status, body) = create(&app, json!({"text": "hello"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = created_id(&body);

    let (status, body) = reveal(&app, &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "data": "hello"}));

    let (status, body) = reveal(&app, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn view_limit_as_string_is_coerced() {
    let app = app();
    let (_, body) = create(&app, json!({"text": "hi", "viewLimit": "3"})).await;
    let id = created_id(&body);

    for _ in 0..3 {
        let (status, body) = reveal(&app, &id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "hi");
    }
    let (status, _) = reveal(&app, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn garbage_limits_fall_back_to_defaults() {
    let app = app();
    let (status, body) = create(
        &app,
        json!({"text": "x", "viewLimit": "lots", "expiration": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created_id(&body);

    assert_eq!(reveal(&app, &id).await.0, StatusCode::OK);
    assert_eq!(reveal(&app, &id).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_text_is_bad_request() {
    let app = app();
    let (status, body) = create(&app, json!({"viewLimit": 2})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = create(&app, json!({"text": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrongly_typed_text_is_a_bad_request_envelope() {
    let app = app();
    let (status, body) = create(&app, json!({"text": 5})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().starts_with("invalid request body"));
}

#[tokio::test]
async fn body_without_content_type_is_a_bad_request_envelope() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/secrets")
        .body(Body::from(json!({"text": "hello"}).to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn malformed_json_is_a_bad_request_envelope() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/secrets")
        .header("content-type", "application/json")
        .body(Body::from("{\"text\": "))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let app = app();
    let (status, body) = reveal(&app, "0123456789abcdef0123456789abcdef").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn decryption_failure_is_bad_request_and_consumes_the_view() {
    let app = app_with(Arc::new(Tampered(ChaChaCrypto::new(generate_key()))));
    let (_, body) = create(&app, json!({"text": "secret"})).await;
    let id = created_id(&body);

    let (status, body) = reveal(&app, &id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("decrypt"));

    let (status, _) = reveal(&app, &id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reveals_have_a_single_winner() {
    let app = app();
    let (_, body) = create(&app, json!({"text": "race", "viewLimit": 1})).await;
    let id = created_id(&body);

    let a = tokio::spawn({
        let (app, id) = (app.clone(), id.clone());
        async move { reveal(&app, &id).await.0 }
    });
    let b = tokio::spawn({
        let (app, id) = (app.clone(), id.clone());
        async move { reveal(&app, &id).await.0 }
    });

    let mut statuses = vec![a.await.unwrap(), b.await.unwrap()];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::NOT_FOUND]);
}
