pub mod audit_handler;
pub mod auth_handler;
pub mod debug;
pub mod health;
pub mod metrics;
pub mod permissions_handler;
pub mod roles_handler;
pub mod users_handler;

pub use health::health_check;
pub use metrics::{metrics_handler, setup_metrics_recorder, MetricsState};
