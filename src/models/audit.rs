use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::intent::RequestIntent;

/// Where an authorization decision was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    L1Hit,
    L2Hit,
    CacheMiss,
    CacheDisabled,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSource::L1Hit => "l1_hit",
            CacheSource::L2Hit => "l2_hit",
            CacheSource::CacheMiss => "cache_miss",
            CacheSource::CacheDisabled => "cache_disabled",
        }
    }
}

/// Audit verbosity recorded per entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditLogLevel {
    #[serde(rename = "ESSENTIAL")]
    Essential,
    #[serde(rename = "FULL")]
    Full,
}

impl AuditLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLogLevel::Essential => "ESSENTIAL",
            AuditLogLevel::Full => "FULL",
        }
    }
}

/// An authorization decision queued for the audit pipeline.
///
/// This is the in-memory shape; `id`, `hash` and `prev_hash` are assigned at
/// write time when the entry joins the chain.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub permission: String,
    pub resource_type: Option<String>,
    pub action: Option<String>,
    pub resource_id: Option<Uuid>,
    pub authorized: bool,
    pub reason: String,
    pub matched_groups: Option<Vec<String>>,
    pub cache_source: CacheSource,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Uuid,
    pub session_id: Option<String>,
    pub log_level: AuditLogLevel,
    pub intent: RequestIntent,
}

impl AuditEntry {
    /// Deterministic serialization of the tamper-protected fields.
    ///
    /// The chain hash is `SHA-256(canonical ∥ prev_hash)`; write and verify
    /// must agree on this byte sequence exactly.
    pub fn canonical_fields(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.timestamp.timestamp_micros(),
            self.user_id,
            self.organization_id,
            self.permission,
            self.resource_type.as_deref().unwrap_or(""),
            self.action.as_deref().unwrap_or(""),
            self.resource_id.map(|id| id.to_string()).unwrap_or_default(),
            self.authorized,
            self.reason,
            self.matched_groups
                .as_ref()
                .map(|g| g.join(","))
                .unwrap_or_default(),
            self.cache_source.as_str(),
            self.request_id,
            self.log_level.as_str(),
        )
    }

    /// Chain hash over the canonical fields and the previous entry's hash
    pub fn chain_hash(&self, prev_hash: &str) -> String {
        compute_chain_hash(&self.canonical_fields(), prev_hash)
    }
}

/// Hex SHA-256 of `canonical ∥ prev_hash`
pub fn compute_chain_hash(canonical: &str, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persisted audit row, read back for chain verification
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub permission: String,
    pub resource_type: Option<String>,
    pub action: Option<String>,
    pub resource_id: Option<Uuid>,
    pub authorized: bool,
    pub reason: String,
    pub matched_groups: Option<Vec<String>>,
    pub cache_source: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Uuid,
    pub session_id: Option<String>,
    pub log_level: String,
    pub operation_intent: String,
    pub session_mode: String,
    pub request_purpose: Option<String>,
    pub batch_id: Option<String>,
    pub is_test: bool,
    pub criticality: String,
    pub hash: String,
    pub prev_hash: String,
}

impl AuditLogRow {
    /// Canonical form recomputed from the persisted row; must match
    /// [`AuditEntry::canonical_fields`] for an unaltered entry.
    pub fn canonical_fields(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.timestamp.timestamp_micros(),
            self.user_id,
            self.organization_id,
            self.permission,
            self.resource_type.as_deref().unwrap_or(""),
            self.action.as_deref().unwrap_or(""),
            self.resource_id.map(|id| id.to_string()).unwrap_or_default(),
            self.authorized,
            self.reason,
            self.matched_groups
                .as_ref()
                .map(|g| g.join(","))
                .unwrap_or_default(),
            self.cache_source,
            self.request_id,
            self.log_level,
        )
    }
}

/// Result of walking an audit window and recomputing the chain
#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub total_entries: u64,
    pub broken_chains: u64,
    pub first_broken_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::intent::RequestIntent;

    fn entry() -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            permission: "activity:create".to_string(),
            resource_type: Some("activity".to_string()),
            action: Some("create".to_string()),
            resource_id: None,
            authorized: true,
            reason: "User has permission via group membership".to_string(),
            matched_groups: Some(vec!["Admins".to_string()]),
            cache_source: CacheSource::CacheMiss,
            ip_address: None,
            user_agent: None,
            request_id: Uuid::new_v4(),
            session_id: None,
            log_level: AuditLogLevel::Full,
            intent: RequestIntent::default(),
        }
    }

    #[test]
    fn test_chain_hash_is_deterministic() {
        let e = entry();
        assert_eq!(e.chain_hash("prev"), e.chain_hash("prev"));
    }

    #[test]
    fn test_chain_hash_depends_on_prev() {
        let e = entry();
        assert_ne!(e.chain_hash("a"), e.chain_hash("b"));
    }

    #[test]
    fn test_chain_hash_depends_on_fields() {
        let e1 = entry();
        let mut e2 = e1.clone();
        e2.reason = "tampered".to_string();
        assert_ne!(e1.chain_hash("prev"), e2.chain_hash("prev"));
    }

    #[test]
    fn test_row_canonical_matches_entry_canonical() {
        let e = entry();
        let row = AuditLogRow {
            id: 1,
            timestamp: e.timestamp,
            user_id: e.user_id,
            organization_id: e.organization_id,
            permission: e.permission.clone(),
            resource_type: e.resource_type.clone(),
            action: e.action.clone(),
            resource_id: e.resource_id,
            authorized: e.authorized,
            reason: e.reason.clone(),
            matched_groups: e.matched_groups.clone(),
            cache_source: e.cache_source.as_str().to_string(),
            ip_address: None,
            user_agent: None,
            request_id: e.request_id,
            session_id: None,
            log_level: e.log_level.as_str().to_string(),
            operation_intent: "standard".to_string(),
            session_mode: "interactive".to_string(),
            request_purpose: None,
            batch_id: None,
            is_test: false,
            criticality: "standard".to_string(),
            hash: String::new(),
            prev_hash: String::new(),
        };

        assert_eq!(e.canonical_fields(), row.canonical_fields());
    }
}
