use sqlx::PgPool;

use crate::models::audit::compute_chain_hash;
use crate::models::{AuditEntry, AuditLogRow, ChainVerification};

/// Repository for the append-only authorization audit log.
///
/// Batch inserts extend the hash chain: each entry's hash covers its
/// canonical fields and the previous entry's hash. The background flusher is
/// the only writer, so the chain head read inside the insert transaction is
/// race-free.
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a batch atomically, chaining hashes from the current head.
    ///
    /// The whole batch commits or none of it does; the pipeline re-enqueues
    /// on failure.
    pub async fn insert_batch(&self, entries: &[AuditEntry]) -> anyhow::Result<()> {
        tracing::debug!(
            operation = "create_authorization_audit_log",
            batch_size = entries.len(),
            "repository call"
        );

        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let mut prev_hash: String = sqlx::query_scalar(
            "SELECT hash FROM authorization_audit_log ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or_default();

        for entry in entries {
            let hash = entry.chain_hash(&prev_hash);

            sqlx::query(
                r#"
                INSERT INTO authorization_audit_log
                    (timestamp, user_id, organization_id, permission, resource_type, action,
                     resource_id, authorized, reason, matched_groups, cache_source, ip_address,
                     user_agent, request_id, session_id, log_level, operation_intent,
                     session_mode, request_purpose, batch_id, is_test, criticality,
                     hash, prev_hash)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                        $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24)
                "#,
            )
            .bind(entry.timestamp)
            .bind(entry.user_id)
            .bind(entry.organization_id)
            .bind(&entry.permission)
            .bind(&entry.resource_type)
            .bind(&entry.action)
            .bind(entry.resource_id)
            .bind(entry.authorized)
            .bind(&entry.reason)
            .bind(&entry.matched_groups)
            .bind(entry.cache_source.as_str())
            .bind(&entry.ip_address)
            .bind(&entry.user_agent)
            .bind(entry.request_id)
            .bind(&entry.session_id)
            .bind(entry.log_level.as_str())
            .bind(entry.intent.operation_intent.as_str())
            .bind(entry.intent.session_mode.as_str())
            .bind(&entry.intent.request_purpose)
            .bind(&entry.intent.batch_id)
            .bind(entry.intent.is_test)
            .bind(entry.intent.criticality.as_str())
            .bind(&hash)
            .bind(&prev_hash)
            .execute(&mut *tx)
            .await?;

            prev_hash = hash;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Walk entries in id order, recomputing hashes.
    ///
    /// Any mismatch between a stored hash and the recomputation, or between
    /// an entry's `prev_hash` and its predecessor's `hash`, is a break,
    /// a tampering signal.
    pub async fn verify_chain(
        &self,
        from_id: Option<i64>,
        to_id: Option<i64>,
    ) -> anyhow::Result<ChainVerification> {
        tracing::debug!(operation = "verify_audit_chain", "repository call");

        let rows: Vec<AuditLogRow> = sqlx::query_as(
            r#"
            SELECT id, timestamp, user_id, organization_id, permission, resource_type, action,
                   resource_id, authorized, reason, matched_groups, cache_source, ip_address,
                   user_agent, request_id, session_id, log_level, operation_intent,
                   session_mode, request_purpose, batch_id, is_test, criticality,
                   hash, prev_hash
            FROM authorization_audit_log
            WHERE ($1::BIGINT IS NULL OR id >= $1)
              AND ($2::BIGINT IS NULL OR id <= $2)
            ORDER BY id
            "#,
        )
        .bind(from_id)
        .bind(to_id)
        .fetch_all(&self.pool)
        .await?;

        let mut broken_chains = 0u64;
        let mut first_broken_id = None;
        let mut expected_prev: Option<String> = None;

        for row in &rows {
            let recomputed = compute_chain_hash(&row.canonical_fields(), &row.prev_hash);
            let hash_matches = recomputed == row.hash;
            // The window may start mid-chain; the first entry's prev_hash is
            // taken as given.
            let link_matches = expected_prev
                .as_ref()
                .map(|prev| prev == &row.prev_hash)
                .unwrap_or(true);

            if !hash_matches || !link_matches {
                broken_chains += 1;
                if first_broken_id.is_none() {
                    first_broken_id = Some(row.id);
                }
            }

            expected_prev = Some(row.hash.clone());
        }

        Ok(ChainVerification {
            is_valid: broken_chains == 0,
            total_entries: rows.len() as u64,
            broken_chains,
            first_broken_id,
        })
    }
}
