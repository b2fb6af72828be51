pub mod audit;
pub mod bindings;
pub mod common;
pub mod context;
pub mod permission;
pub mod principal;
pub mod profile;
pub mod role;
pub mod session;

pub use audit::{AuditEvent, AuditPriority, AuditQuery, AuditStatus, EmitAuditEventInput};
pub use bindings::{
    AssignPermissionsInput, AssignResourceActionInput, AssignRoleInput, ResourceGrant, RoleBinding,
    UserRole,
};
pub use common::{PageQuery, SuccessResponse};
pub use context::DynamicMap;
pub use permission::{
    Action, CreateActionInput, CreatePermissionInput, CreateResourceInput, Permission, Resource,
};
pub use principal::{
    CreateUserInput, DeleteReceipt, Principal, PrincipalKind, UpdateUserInput, UserStatus,
};
pub use profile::{Address, Contact, Profile};
pub use role::{CreateRoleInput, Role, UpdateRoleInput};
pub use session::{
    AccessClaims, LoginInput, LogoutInput, RefreshClaims, RefreshInput, TokenPair,
};
