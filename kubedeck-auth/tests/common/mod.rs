//! Shared helpers for HTTP integration tests.
//!
//! Tests drive the full router over the in-memory store and a scripted
//! connector, so no database or cluster is required.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use kubedeck_auth::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, EncryptionConfig, Environment, JwtConfig, RateLimitConfig,
        SecurityConfig, SwaggerConfig, SwaggerMode,
    },
    services::{
        AuthService, AuthStore, ClusterConnector, ClusterService, MemoryStore, MockConnector,
        SecretVault, TokenService,
    },
    AppState,
};
use kubedeck_core::middleware::rate_limit::create_ip_rate_limiter;
use serde_json::{json, Value};
use tower::util::ServiceExt;

/// Base64 of a fixed 32-byte key. Test-only.
pub const TEST_ENCRYPTION_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub const TEST_KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        service_name: "kubedeck-auth-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        port: 0,
        otlp_endpoint: None,
        allow_registration: true,
        database: DatabaseConfig {
            url: "postgres://unused-in-memory-tests".to_string(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-signing-secret".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        encryption: EncryptionConfig {
            key: TEST_ENCRYPTION_KEY.to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            register_attempts: 100,
            register_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

/// Build the full router from a config and a scripted connector.
pub async fn spawn_app_with(config: AuthConfig, connector: Arc<dyn ClusterConnector>) -> Router {
    let db: Arc<dyn AuthStore> = Arc::new(MemoryStore::new());
    let tokens = TokenService::new(&config.jwt).expect("Failed to create token service");
    let vault = SecretVault::new(&config.encryption).expect("Failed to create secret vault");

    let auth = AuthService::new(
        db.clone(),
        tokens,
        config.jwt.refresh_token_expiry_days,
        config.allow_registration,
    );
    let clusters = ClusterService::new(db.clone(), vault, connector);

    let state = AppState {
        config: config.clone(),
        db,
        auth,
        clusters,
        login_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        ),
        register_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.register_attempts,
            config.rate_limit.register_window_seconds,
        ),
        ip_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        ),
    };

    build_router(state).await.expect("Failed to build router")
}

pub async fn spawn_app() -> Router {
    spawn_app_with(test_config(), Arc::new(MockConnector::default())).await
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn authed_json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Response body was not valid JSON")
}

/// Register a fresh account and hand back its token pair.
pub async fn register_user(app: &Router, email: &str, password: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            json!({ "email": email, "password": password, "name": "Test User" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Register an account that owns a cluster, returning (access token, cluster id).
pub async fn register_user_with_cluster(app: &Router, email: &str, name: &str) -> (String, String) {
    let tokens = register_user(app, email, "password123").await;
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/clusters",
            &access,
            json!({ "name": name, "kubeconfig": TEST_KUBECONFIG }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cluster = body_json(response).await;
    let cluster_id = cluster["cluster_id"].as_str().unwrap().to_string();

    (access, cluster_id)
}
