use axum::{extract::State, Json};
use std::sync::Arc;

use crate::extractors::AuthenticatedPrincipal;
use crate::models::{LoginInput, LogoutInput, RefreshInput, SuccessResponse, TokenPair};
use crate::{AppResult, AppState};

fn client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

/// POST /v2/auth/login
#[utoipa::path(
    post,
    path = "/v2/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Issued access/refresh token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials or MFA code")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(input): Json<LoginInput>,
) -> AppResult<Json<TokenPair>> {
    let ip = client_ip(&headers);
    let pair = state.session.login(input, ip).await?;
    Ok(Json(pair))
}

/// POST /v2/auth/refresh -- deliberately does not require a bearer access
/// token: the whole point of a refresh token is to mint a new access token
/// once the old one has expired. The principal is derived from the refresh
/// token itself and the M-PIN proves possession independent of it.
#[utoipa::path(
    post,
    path = "/v2/auth/refresh",
    request_body = RefreshInput,
    responses(
        (status = 200, description = "Rotated access/refresh token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired, reused, or mpin incorrect")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RefreshInput>,
) -> AppResult<Json<TokenPair>> {
    let pair = state.session.refresh(&input.refresh_token, &input.mpin).await?;
    Ok(Json(pair))
}

/// POST /v2/auth/logout
#[utoipa::path(
    post,
    path = "/v2/auth/logout",
    request_body = LogoutInput,
    responses(
        (status = 200, description = "Session revoked", body = SuccessResponse)
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    principal: AuthenticatedPrincipal,
    Json(_input): Json<LogoutInput>,
) -> AppResult<Json<SuccessResponse>> {
    state.session.logout(&principal.principal_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
