use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::Modify;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AAA Kernel API",
        version = "1.0.0",
        description = "Authentication, authorization and audit kernel service",
        contact(
            name = "Platform Security",
            email = "platform-security@example.com"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    paths(
        // Health
        crate::handlers::health::health_check,

        // Auth
        crate::handlers::auth_handler::login,
        crate::handlers::auth_handler::refresh,
        crate::handlers::auth_handler::logout,

        // Users
        crate::handlers::users_handler::create_user,
        crate::handlers::users_handler::get_self,
        crate::handlers::users_handler::get_user,
        crate::handlers::users_handler::list_users,
        crate::handlers::users_handler::search_users,
        crate::handlers::users_handler::update_user,
        crate::handlers::users_handler::delete_user,
        crate::handlers::users_handler::change_password,
        crate::handlers::users_handler::set_mpin,
        crate::handlers::users_handler::enroll_mfa,
        crate::handlers::users_handler::disable_mfa,

        // Roles, permissions and bindings
        crate::handlers::roles_handler::create_role,
        crate::handlers::roles_handler::list_roles,
        crate::handlers::roles_handler::get_role,
        crate::handlers::roles_handler::update_role,
        crate::handlers::roles_handler::delete_role,
        crate::handlers::roles_handler::get_role_permissions,
        crate::handlers::roles_handler::bind_permission,
        crate::handlers::roles_handler::unbind_permission,
        crate::handlers::roles_handler::assign_role,
        crate::handlers::roles_handler::revoke_role,
        crate::handlers::roles_handler::get_principal_roles,
        crate::handlers::roles_handler::create_resource,
        crate::handlers::roles_handler::create_action,
        crate::handlers::roles_handler::create_permission,
        crate::handlers::roles_handler::grant_resource,
        crate::handlers::roles_handler::assign_resource_action,
        crate::handlers::roles_handler::revoke_resource_action,

        // Authorization
        crate::handlers::permissions_handler::evaluate,
        crate::handlers::permissions_handler::evaluate_bulk,

        // Audit
        crate::handlers::audit_handler::emit_event,
        crate::handlers::audit_handler::query_events,
    ),
    components(
        schemas(
            // Core models
            crate::models::Principal,
            crate::models::PrincipalKind,
            crate::models::UserStatus,
            crate::models::CreateUserInput,
            crate::models::UpdateUserInput,
            crate::models::DeleteReceipt,
            crate::models::SuccessResponse,

            crate::models::LoginInput,
            crate::models::LogoutInput,
            crate::models::RefreshInput,
            crate::models::TokenPair,

            crate::models::Role,
            crate::models::CreateRoleInput,
            crate::models::UpdateRoleInput,
            crate::models::Permission,
            crate::models::CreatePermissionInput,
            crate::models::Resource,
            crate::models::CreateResourceInput,
            crate::models::Action,
            crate::models::CreateActionInput,
            crate::models::RoleBinding,
            crate::models::UserRole,
            crate::models::AssignRoleInput,
            crate::models::AssignPermissionsInput,
            crate::models::AssignResourceActionInput,
            crate::models::ResourceGrant,

            crate::models::AuditEvent,
            crate::models::AuditStatus,
            crate::models::AuditPriority,
            crate::models::EmitAuditEventInput,

            // Handler-local request/response types
            crate::handlers::users_handler::ChangePasswordRequest,
            crate::handlers::users_handler::SetMpinRequest,
            crate::handlers::users_handler::EnrollMfaResponse,
            crate::handlers::roles_handler::GrantResourceRequest,
            crate::handlers::permissions_handler::EvaluateRequest,
            crate::handlers::permissions_handler::EvaluateResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check"),
        (name = "auth", description = "Login, refresh and session lifecycle"),
        (name = "users", description = "Principal management and self-service credentials"),
        (name = "roles", description = "Roles, permissions, resources and bindings"),
        (name = "permissions", description = "Authorization decisions"),
        (name = "audit", description = "Audit trail"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}
