pub mod policy;
pub mod service;

pub use service::{AuthorizationService, CheckRequest, CheckResult};
