pub mod auth;
pub mod metrics;

pub use auth::Authenticated;
pub use metrics::metrics_middleware;
