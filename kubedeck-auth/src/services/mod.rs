//! Services layer for kubedeck-auth.
//!
//! Session lifecycle, token minting, secret encryption, and the tenant
//! cluster registry live here; handlers stay thin over these services.

mod auth;
mod cluster;
mod connector;
mod database;
pub mod error;
pub mod metrics;
mod store;
mod token;
mod vault;

pub use auth::AuthService;
pub use cluster::{ClientCache, ClusterHandle, ClusterService};
pub use connector::{ClusterConnector, KubectlConnector, MockConnector};
pub use database::Database;
pub use error::ServiceError;
pub use store::{AuthStore, MemoryStore};
pub use token::{
    digest_refresh_secret, generate_refresh_secret, AccessTokenClaims, TokenService,
};
pub use vault::SecretVault;
