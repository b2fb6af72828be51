use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

use crate::AppState;

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub principal_id: String,
    pub status: String,
    pub roles: Vec<String>,
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedPrincipal {
    type Rejection = (StatusCode, axum::Json<serde_json::Value>);

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = extract_bearer_token(parts);
        let state = state.clone();

        async move {
            let token = token.ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(json!({"error": true, "message": "missing bearer token"})),
                )
            })?;

            let claims = state.session.validate_access_token(&token).map_err(|e| {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(json!({"error": true, "message": format!("{e}")})),
                )
            })?;

            Ok(AuthenticatedPrincipal {
                principal_id: claims.sub,
                status: claims.status,
                roles: claims.roles,
            })
        }
    }
}
