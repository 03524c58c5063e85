pub mod audit;
pub mod context;
pub mod group;
pub mod intent;
pub mod oauth;
pub mod organization;
pub mod permission;
pub mod user;

pub use audit::{AuditEntry, AuditLogLevel, AuditLogRow, CacheSource, ChainVerification};
pub use context::RequestContext;
pub use group::{Group, GroupMembership, GroupPermissionGrant};
pub use intent::{Criticality, OperationIntent, RequestIntent, SessionMode};
pub use oauth::{AuthorizationCode, ClientType, ConsentRecord, ConsentStatus, OAuthClient};
pub use organization::{Organization, OrganizationMembership, OrganizationRole, UserOrganization};
pub use permission::{parse_permission, Permission, UserPermissionGrant};
pub use user::{RefreshTokenRecord, User};
