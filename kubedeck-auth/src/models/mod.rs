pub mod cluster;
pub mod session;
pub mod user;

pub use cluster::{Cluster, ClusterResponse, ConnectionTestResult};
pub use session::Session;
pub use user::{AuthProvider, TokenResponse, User, UserResponse};
