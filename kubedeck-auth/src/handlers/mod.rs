//! HTTP handlers for kubedeck-auth.

pub mod auth;
pub mod clusters;
pub mod metrics;

pub use auth::*;
pub use clusters::*;
pub use metrics::*;
