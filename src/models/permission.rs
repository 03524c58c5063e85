use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permission identified by `(resource, action)`; canonical string form is
/// `"resource:action"`, which is also the OAuth scope form.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

/// One permission grant a user holds in an organization, with the group that
/// conveys it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPermissionGrant {
    pub resource: String,
    pub action: String,
    pub via_group_name: String,
    pub via_group_id: Uuid,
    pub granted_at: DateTime<Utc>,
    pub description: Option<String>,
}

impl UserPermissionGrant {
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

/// Split a canonical permission string into `(resource, action)`.
///
/// Splits on the first `:`; anything without one is rejected by the caller.
pub fn parse_permission(permission: &str) -> Option<(&str, &str)> {
    let (resource, action) = permission.split_once(':')?;
    if resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_permission() {
        assert_eq!(parse_permission("activity:create"), Some(("activity", "create")));
        assert_eq!(
            parse_permission("activity:create:extra"),
            Some(("activity", "create:extra"))
        );
        assert_eq!(parse_permission("no-colon"), None);
        assert_eq!(parse_permission(":action"), None);
        assert_eq!(parse_permission("resource:"), None);
    }
}
