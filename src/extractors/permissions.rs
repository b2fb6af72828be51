use crate::authz::CheckRequest;
use crate::error::AppError;
use crate::extractors::AuthenticatedPrincipal;
use crate::models::{DynamicMap, UserStatus};
use crate::AppState;

/// Convenience wrapper handlers call after pulling an [`AuthenticatedPrincipal`]
/// out of the request, so the resource/action pair reads the same way at
/// every call site.
pub async fn require_permission(
    state: &AppState,
    principal: &AuthenticatedPrincipal,
    resource_type: &str,
    resource_id: &str,
    action: &str,
    ip_address: Option<String>,
) -> Result<(), AppError> {
    let status = match principal.status.as_str() {
        "active" => UserStatus::Active,
        "suspended" => UserStatus::Suspended,
        "blocked" => UserStatus::Blocked,
        _ => UserStatus::Pending,
    };

    let request = CheckRequest {
        principal_id: principal.principal_id.clone(),
        principal_status: status,
        mfa_verified: false,
        ip_address,
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        resource_owner_id: None,
        action: action.to_string(),
        conditions: DynamicMap::default(),
    };

    let result = state.authz.check(&request).await?;
    if result.allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "missing permission {action} on {resource_type}{}",
            result.reason.map(|r| format!(" ({r})")).unwrap_or_default()
        )))
    }
}
