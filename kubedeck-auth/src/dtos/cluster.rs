use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateClusterRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    #[schema(example = "prod-eu-west")]
    pub name: String,

    #[schema(example = "Production cluster in eu-west")]
    pub description: Option<String>,

    /// Plaintext kubeconfig; encrypted before it is persisted.
    #[validate(length(min = 1, message = "Kubeconfig is required"))]
    pub kubeconfig: String,

    #[schema(example = "prod-context")]
    pub context: Option<String>,

    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateClusterRequest {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty"))]
    pub name: Option<String>,

    pub description: Option<String>,

    /// Replacement kubeconfig; re-encrypted before it is persisted.
    #[validate(length(min = 1, message = "Kubeconfig must not be empty"))]
    pub kubeconfig: Option<String>,

    pub context: Option<String>,

    pub tags: Option<Vec<String>>,

    pub is_active: Option<bool>,
}
