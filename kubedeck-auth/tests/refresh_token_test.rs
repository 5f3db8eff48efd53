mod common;

use axum::http::StatusCode;
use serde_json::json;
use tower::util::ServiceExt;

#[tokio::test]
async fn refresh_rotates_the_session() {
    let app = common::spawn_app().await;
    let tokens = common::register_user(&app, "rotate@example.com", "password123").await;
    let old_refresh = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": old_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rotated = common::body_json(response).await;
    let new_refresh = rotated["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, old_refresh);

    // The rotated access token works
    let access = rotated["access_token"].as_str().unwrap();
    let response = app
        .oneshot(common::authed_request("GET", "/auth/me", access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn reusing_a_rotated_secret_revokes_the_whole_session() {
    let app = common::spawn_app().await;
    let tokens = common::register_user(&app, "replay@example.com", "password123").await;
    let old_refresh = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": old_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = common::body_json(response).await;
    let new_refresh = rotated["refresh_token"].as_str().unwrap();

    // Replaying the consumed secret is treated as compromise
    let response = app
        .clone()
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": old_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The successor issued by the legitimate rotation is dead too
    let response = app
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": new_refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_refresh_secret_is_unauthorized() {
    let app = common::spawn_app().await;

    let response = app
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": "never-issued" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = common::body_json(response).await;
    assert_eq!(body["error"], "Authentication failed");
}

#[tokio::test]
async fn logout_ends_the_session_and_is_idempotent() {
    let app = common::spawn_app().await;
    let tokens = common::register_user(&app, "logout@example.com", "password123").await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(common::json_request(
            "POST",
            "/auth/logout",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The revoked secret no longer refreshes
    let response = app
        .clone()
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A second logout of the same secret still reports success
    let response = app
        .oneshot(common::json_request(
            "POST",
            "/auth/logout",
            json!({ "refresh_token": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn sessions_are_independent_per_login() {
    let app = common::spawn_app().await;
    common::register_user(&app, "multi@example.com", "password123").await;

    // Two logins, two sessions
    let login = |app: &axum::Router| {
        app.clone().oneshot(common::json_request(
            "POST",
            "/auth/login",
            json!({ "email": "multi@example.com", "password": "password123" }),
        ))
    };

    let first = common::body_json(login(&app).await.unwrap()).await;
    let second = common::body_json(login(&app).await.unwrap()).await;

    // Logging out the first session leaves the second alive
    let response = app
        .clone()
        .oneshot(common::json_request(
            "POST",
            "/auth/logout",
            json!({ "refresh_token": first["refresh_token"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(common::json_request(
            "POST",
            "/auth/refresh",
            json!({ "refresh_token": second["refresh_token"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
