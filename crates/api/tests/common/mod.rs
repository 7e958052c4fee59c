use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use thrift_api::config::{LockConfig, ServerConfig, StorageConfig};
use thrift_api::routes;
use thrift_api::state::AppState;
use thrift_db::MemoryStore;

pub const ITEM: &str = "550e8400-e29b-41d4-a716-446655440000";

const BOUNDARY: &str = "thrift-test-boundary";

/// Build a test `ServerConfig` with storage under `tmp` and fast lock retries.
pub fn test_config(tmp: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        maintenance_interval_secs: 60,
        storage: StorageConfig {
            upload_dir: tmp.path().join("uploads"),
            staging_dir: tmp.path().join("staging"),
            public_prefix: "/uploads".to_string(),
            max_upload_bytes: 1024 * 1024,
        },
        lock: LockConfig {
            max_retries: 200,
            retry_delay_ms: 5,
            ..LockConfig::default()
        },
    }
}

/// The router under test plus what it writes to.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub tmp: TempDir,
}

/// Build the full application router with all middleware layers over a
/// fresh in-memory store.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub fn build_test_app() -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = test_config(&tmp);
    let state = AppState::new(Arc::new(MemoryStore::new()), config.clone());

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .nest_service(
            &config.storage.public_prefix,
            ServeDir::new(&config.storage.upload_dir),
        )
        .layer(DefaultBodyLimit::max(config.storage.max_upload_bytes))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state.clone());

    TestApp { app, state, tmp }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Request::delete(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    send(app, Request::post(uri).body(Body::empty()).unwrap()).await
}

pub async fn put_json(app: Router, uri: &str, json: serde_json::Value) -> Response {
    let request = Request::put(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a multipart form with one `files` field per `(filename, contents)`.
pub async fn post_files(app: Router, uri: &str, files: &[(&str, &str)]) -> Response {
    let mut body = Vec::new();
    for (filename, contents) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    post_multipart(app, uri, body).await
}

/// POST a pre-built multipart body using the test boundary.
pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response {
    let request = Request::post(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

/// A multipart part for a plain text field.
pub fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
        .into_bytes()
}

/// The closing multipart delimiter.
pub fn closing_delimiter() -> Vec<u8> {
    format!("--{BOUNDARY}--\r\n").into_bytes()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Filenames from a `{ "data": [ImageRecord] }` body.
pub fn filenames(json: &serde_json::Value) -> Vec<String> {
    json["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|image| image["filename"].as_str().unwrap().to_string())
        .collect()
}
