use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Permission names the engine consumes. Identity and session management live
/// outside; the engine only ever sees `CurrentUser` plus this check.
pub const PERM_SERVICE_BOOKING: &str = "service_booking";
pub const PERM_BOOKING_MANAGEMENT: &str = "booking_management";
pub const PERM_ANALYTICS_VIEW: &str = "analytics_view";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Customer,
    Staff,
    Manager,
}

/// The opaque caller handed in by the identity collaborator.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: Ulid,
    pub role: Role,
}

/// Permission contract. The engine never implements RBAC itself; callers plug
/// in whatever the surrounding system uses.
pub trait PermissionCheck: Send + Sync {
    fn has_permission(&self, role: Role, permission: &str) -> bool;
}

/// Default role table. Deny by default.
pub struct RoleTable;

impl PermissionCheck for RoleTable {
    fn has_permission(&self, role: Role, permission: &str) -> bool {
        match role {
            Role::Customer => permission == PERM_SERVICE_BOOKING,
            Role::Staff => {
                permission == PERM_SERVICE_BOOKING || permission == PERM_BOOKING_MANAGEMENT
            }
            Role::Manager => matches!(
                permission,
                PERM_SERVICE_BOOKING | PERM_BOOKING_MANAGEMENT | PERM_ANALYTICS_VIEW
            ),
        }
    }
}
