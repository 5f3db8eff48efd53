mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use kubedeck_auth::services::MockConnector;
use serde_json::json;
use tower::util::ServiceExt;

#[tokio::test]
async fn create_returns_cluster_without_credential_material() {
    let app = common::spawn_app().await;
    let tokens = common::register_user(&app, "owner@example.com", "password123").await;
    let access = tokens["access_token"].as_str().unwrap();

    let response = app
        .oneshot(common::authed_json_request(
            "POST",
            "/clusters",
            access,
            json!({
                "name": "prod-eu-west",
                "description": "Production",
                "kubeconfig": common::TEST_KUBECONFIG,
                "context": "prod-context",
                "tags": ["prod", "eu"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["name"], "prod-eu-west");
    assert_eq!(body["context"], "prod-context");
    assert_eq!(body["is_active"], false);
    assert_eq!(body["is_connected"], false);
    assert!(body.get("kubeconfig").is_none());
    assert!(body.get("kubeconfig_encrypted").is_none());
}

#[tokio::test]
async fn duplicate_name_for_same_owner_conflicts() {
    let app = common::spawn_app().await;
    let (access, _) = common::register_user_with_cluster(&app, "dup@example.com", "staging").await;

    let response = app
        .oneshot(common::authed_json_request(
            "POST",
            "/clusters",
            &access,
            json!({ "name": "staging", "kubeconfig": common::TEST_KUBECONFIG }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn same_name_is_allowed_across_owners() {
    let app = common::spawn_app().await;
    common::register_user_with_cluster(&app, "first@example.com", "shared-name").await;

    let tokens = common::register_user(&app, "second@example.com", "password123").await;
    let access = tokens["access_token"].as_str().unwrap();

    let response = app
        .oneshot(common::authed_json_request(
            "POST",
            "/clusters",
            access,
            json!({ "name": "shared-name", "kubeconfig": common::TEST_KUBECONFIG }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_returns_only_own_clusters() {
    let app = common::spawn_app().await;
    let (access_a, _) = common::register_user_with_cluster(&app, "lista@example.com", "a-one").await;
    common::register_user_with_cluster(&app, "listb@example.com", "b-one").await;

    let response = app
        .clone()
        .oneshot(common::authed_json_request(
            "POST",
            "/clusters",
            &access_a,
            json!({ "name": "a-two", "kubeconfig": common::TEST_KUBECONFIG }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(common::authed_request("GET", "/clusters", &access_a))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"a-one"));
    assert!(names.contains(&"a-two"));
}

#[tokio::test]
async fn update_and_delete_lifecycle() {
    let app = common::spawn_app().await;
    let (access, cluster_id) =
        common::register_user_with_cluster(&app, "life@example.com", "old-name").await;
    let uri = format!("/clusters/{}", cluster_id);

    // Rename
    let response = app
        .clone()
        .oneshot(common::authed_json_request(
            "PUT",
            &uri,
            &access,
            json!({ "name": "new-name" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["name"], "new-name");

    // Delete, then the record is gone
    let response = app
        .clone()
        .oneshot(common::authed_request("DELETE", &uri, &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(common::authed_request("GET", &uri, &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn foreign_clusters_are_forbidden_and_unknown_ids_not_found() {
    let app = common::spawn_app().await;
    let (_, cluster_id) =
        common::register_user_with_cluster(&app, "holder@example.com", "held").await;

    let tokens = common::register_user(&app, "intruder@example.com", "password123").await;
    let access = tokens["access_token"].as_str().unwrap();

    // Someone else's cluster: the record exists but is not yours
    let response = app
        .clone()
        .oneshot(common::authed_request(
            "GET",
            &format!("/clusters/{}", cluster_id),
            access,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A cluster that never existed
    let response = app
        .oneshot(common::authed_request(
            "GET",
            &format!("/clusters/{}", uuid::Uuid::new_v4()),
            access,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connect_probes_and_persists_the_outcome() {
    let app = common::spawn_app_with(
        common::test_config(),
        Arc::new(MockConnector::reachable("v1.30.1")),
    )
    .await;
    let (access, cluster_id) =
        common::register_user_with_cluster(&app, "probe@example.com", "probed").await;
    let uri = format!("/clusters/{}", cluster_id);

    let response = app
        .clone()
        .oneshot(common::authed_request(
            "POST",
            &format!("{}/connect", uri),
            &access,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["version"], "v1.30.1");
    assert!(body["error"].is_null());

    // The probe outcome is durable
    let response = app
        .oneshot(common::authed_request("GET", &uri, &access))
        .await
        .unwrap();
    let body = common::body_json(response).await;
    assert_eq!(body["is_connected"], true);
    assert_eq!(body["version"], "v1.30.1");
    assert!(!body["last_connected_utc"].is_null());
}

#[tokio::test]
async fn failed_probe_marks_the_cluster_disconnected() {
    let app = common::spawn_app_with(
        common::test_config(),
        Arc::new(MockConnector::unreachable("Connection failed: refused")),
    )
    .await;
    let (access, cluster_id) =
        common::register_user_with_cluster(&app, "down@example.com", "down").await;
    let uri = format!("/clusters/{}", cluster_id);

    let response = app
        .clone()
        .oneshot(common::authed_request(
            "POST",
            &format!("{}/connect", uri),
            &access,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["connected"], false);
    assert_eq!(body["error"], "Connection failed: refused");

    let response = app
        .oneshot(common::authed_request("GET", &uri, &access))
        .await
        .unwrap();
    let body = common::body_json(response).await;
    assert_eq!(body["is_connected"], false);
    assert!(body["last_connected_utc"].is_null());
}

#[tokio::test]
async fn activation_is_exclusive_per_owner() {
    let app = common::spawn_app().await;
    let (access, first_id) =
        common::register_user_with_cluster(&app, "active@example.com", "first").await;

    let response = app
        .clone()
        .oneshot(common::authed_json_request(
            "POST",
            "/clusters",
            &access,
            json!({ "name": "second", "kubeconfig": common::TEST_KUBECONFIG }),
        ))
        .await
        .unwrap();
    let second_id = common::body_json(response).await["cluster_id"]
        .as_str()
        .unwrap()
        .to_string();

    for id in [&first_id, &second_id] {
        let response = app
            .clone()
            .oneshot(common::authed_request(
                "PUT",
                &format!("/clusters/{}/activate", id),
                &access,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Only the most recent activation survives
    let response = app
        .oneshot(common::authed_request("GET", "/clusters", &access))
        .await
        .unwrap();
    let body = common::body_json(response).await;
    let active: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["is_active"] == true)
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(active, vec!["second"]);
}

#[tokio::test]
async fn cluster_routes_require_authentication() {
    let app = common::spawn_app().await;

    let response = app
        .clone()
        .oneshot(common::get_request("/clusters"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(common::json_request(
            "POST",
            "/clusters",
            json!({ "name": "open", "kubeconfig": common::TEST_KUBECONFIG }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
