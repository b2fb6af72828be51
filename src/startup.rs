use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{Html, IntoResponse},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

use crate::middleware::{metrics_middleware, request_id_middleware, require_debug_key};
use crate::{handlers, openapi::ApiDoc};

pub fn build_router(state: Arc<crate::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    // Auth routes (C7 Session Service)
    let auth_routes = Router::new()
        .route("/login", post(handlers::auth_handler::login))
        .route("/refresh", post(handlers::auth_handler::refresh))
        .route("/logout", post(handlers::auth_handler::logout));

    // User routes (C1 Identity Store + C6 Credential Service)
    let user_routes = Router::new()
        .route("/", get(handlers::users_handler::list_users))
        .route("/", post(handlers::users_handler::create_user))
        .route("/search", get(handlers::users_handler::search_users))
        .route("/me", get(handlers::users_handler::get_self))
        .route("/me/password", put(handlers::users_handler::change_password))
        .route("/me/mpin", put(handlers::users_handler::set_mpin))
        .route("/me/mfa/enroll", post(handlers::users_handler::enroll_mfa))
        .route("/me/mfa", delete(handlers::users_handler::disable_mfa))
        .route("/{id}", get(handlers::users_handler::get_user))
        .route("/{id}", patch(handlers::users_handler::update_user))
        .route("/{id}", delete(handlers::users_handler::delete_user))
        .route("/{id}/roles", get(handlers::roles_handler::get_principal_roles))
        .route("/{id}/roles", post(handlers::roles_handler::assign_role))
        .route("/{id}/roles/{role_id}", delete(handlers::roles_handler::revoke_role));

    // Role/permission/binding routes (C2 Policy Store)
    let role_routes = Router::new()
        .route("/", get(handlers::roles_handler::list_roles))
        .route("/", post(handlers::roles_handler::create_role))
        .route("/{id}", get(handlers::roles_handler::get_role))
        .route("/{id}", patch(handlers::roles_handler::update_role))
        .route("/{id}", delete(handlers::roles_handler::delete_role))
        .route("/{id}/permissions", get(handlers::roles_handler::get_role_permissions))
        .route("/{id}/permissions", post(handlers::roles_handler::bind_permission))
        .route(
            "/{id}/permissions/{permission_id}",
            delete(handlers::roles_handler::unbind_permission),
        );

    let resource_routes = Router::new()
        .route("/", post(handlers::roles_handler::create_resource))
        .route("/{type}/{id}/grants", post(handlers::roles_handler::grant_resource));

    let role_routes = role_routes
        .route(
            "/{id}/resource-actions",
            post(handlers::roles_handler::assign_resource_action),
        )
        .route(
            "/{id}/resource-actions/{resource_type}/{resource_id}/{action}",
            delete(handlers::roles_handler::revoke_resource_action),
        );

    let action_routes = Router::new().route("/", post(handlers::roles_handler::create_action));

    let permission_routes = Router::new().route("/", post(handlers::roles_handler::create_permission));

    // Authorization routes (C8 Authorization Service)
    let authz_routes = Router::new()
        .route("/evaluate", post(handlers::permissions_handler::evaluate))
        .route("/evaluate/bulk", post(handlers::permissions_handler::evaluate_bulk));

    // Audit routes (C3 Audit Log)
    let audit_routes = Router::new()
        .route("/", get(handlers::audit_handler::query_events))
        .route("/", post(handlers::audit_handler::emit_event));

    let debug_routes = Router::new()
        .route("/", get(handlers::debug::debug_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_debug_key));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/v2/auth", auth_routes)
        .nest("/v2/users", user_routes)
        .nest("/v1/roles", role_routes)
        .nest("/v1/resources", resource_routes)
        .nest("/v1/actions", action_routes)
        .nest("/v1/permissions", permission_routes)
        .nest("/v2/permissions", authz_routes)
        .nest("/v2/audit/events", audit_routes)
        .nest("/debug", debug_routes)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/swagger-ui", get(swagger_ui))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// §7: a recovered panic is surfaced as a generic `Internal` response, never
/// the panic message or payload, so a bug in one request handler can't leak
/// internal state to the caller.
fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    tracing::error!("request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal", "message": "an internal error occurred" })),
    )
        .into_response()
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>AAA Kernel API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = () => {
            window.ui = SwaggerUIBundle({
                url: '/api-docs/openapi.json',
                dom_id: '#swagger-ui',
                presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
            });
        };
    </script>
</body>
</html>
    "#,
    )
}
