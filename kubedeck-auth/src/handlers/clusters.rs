//! Cluster registry handlers. Every route is ownership-scoped to the
//! authenticated account; responses never carry credential material.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::dtos::cluster::{CreateClusterRequest, UpdateClusterRequest};
use crate::middleware::CurrentUser;
use crate::models::ClusterResponse;
use crate::utils::ValidatedJson;
use crate::AppState;
use kubedeck_core::error::AppError;

/// Register a cluster
#[utoipa::path(
    post,
    path = "/clusters",
    request_body = CreateClusterRequest,
    responses(
        (status = 200, description = "Cluster registered", body = ClusterResponse),
        (status = 409, description = "Name already in use", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_cluster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateClusterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cluster = state.clusters.create(user.user_id, req).await?;
    Ok(Json(ClusterResponse::from(cluster)))
}

/// List the caller's clusters
#[utoipa::path(
    get,
    path = "/clusters",
    responses(
        (status = 200, description = "Clusters owned by the caller", body = [ClusterResponse])
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_clusters(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let clusters = state.clusters.list(user.user_id).await?;
    let responses: Vec<ClusterResponse> =
        clusters.into_iter().map(ClusterResponse::from).collect();
    Ok(Json(responses))
}

/// Cluster details
#[utoipa::path(
    get,
    path = "/clusters/{cluster_id}",
    params(
        ("cluster_id" = Uuid, Path, description = "Cluster id")
    ),
    responses(
        (status = 200, description = "Cluster details", body = ClusterResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such cluster", body = ErrorResponse)
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_cluster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(cluster_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let cluster = state.clusters.get(user.user_id, cluster_id).await?;
    Ok(Json(ClusterResponse::from(cluster)))
}

/// Update a cluster
#[utoipa::path(
    put,
    path = "/clusters/{cluster_id}",
    params(
        ("cluster_id" = Uuid, Path, description = "Cluster id")
    ),
    request_body = UpdateClusterRequest,
    responses(
        (status = 200, description = "Cluster updated", body = ClusterResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such cluster", body = ErrorResponse),
        (status = 409, description = "Name already in use", body = ErrorResponse)
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_cluster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(cluster_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateClusterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cluster = state.clusters.update(user.user_id, cluster_id, req).await?;
    Ok(Json(ClusterResponse::from(cluster)))
}

/// Delete a cluster
#[utoipa::path(
    delete,
    path = "/clusters/{cluster_id}",
    params(
        ("cluster_id" = Uuid, Path, description = "Cluster id")
    ),
    responses(
        (status = 204, description = "Cluster deleted"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such cluster", body = ErrorResponse)
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_cluster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(cluster_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.clusters.delete(user.user_id, cluster_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Probe the cluster's API server
#[utoipa::path(
    post,
    path = "/clusters/{cluster_id}/connect",
    params(
        ("cluster_id" = Uuid, Path, description = "Cluster id")
    ),
    responses(
        (status = 200, description = "Probe outcome", body = ConnectionTestResult),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such cluster", body = ErrorResponse)
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn connect_cluster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(cluster_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.clusters.test_connection(user.user_id, cluster_id).await?;
    Ok(Json(result))
}

/// Make this the owner's active cluster
#[utoipa::path(
    put,
    path = "/clusters/{cluster_id}/activate",
    params(
        ("cluster_id" = Uuid, Path, description = "Cluster id")
    ),
    responses(
        (status = 200, description = "Cluster activated", body = ClusterResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such cluster", body = ErrorResponse)
    ),
    tag = "Clusters",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn activate_cluster(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(cluster_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let cluster = state.clusters.activate(user.user_id, cluster_id).await?;
    Ok(Json(ClusterResponse::from(cluster)))
}
