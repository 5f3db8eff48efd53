pub mod auth;
pub mod metrics;

pub use auth::{auth_middleware, CurrentUser};
pub use metrics::metrics_middleware;
