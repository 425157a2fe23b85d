//! Audit log append
//!
//! Append-only audit records for access lifecycle operations. Writes are
//! best-effort: a failed append is logged and never propagates into the
//! operation that produced it.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AccessResult;

/// Who triggered the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// System automation (state machine, sweeps, executor)
    System,
    /// Operator support tooling
    Operator,
    /// Stripe webhook
    Stripe,
    /// Telegram payment callback
    Telegram,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::System => write!(f, "system"),
            ActorType::Operator => write!(f, "operator"),
            ActorType::Stripe => write!(f, "stripe"),
            ActorType::Telegram => write!(f, "telegram"),
        }
    }
}

/// One audit record to append
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub organization_id: Uuid,
    pub actor_type: ActorType,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub metadata: serde_json::Value,
    pub correlation_id: Option<String>,
}

impl AuditEntry {
    pub fn new(organization_id: Uuid, action: impl Into<String>) -> Self {
        Self {
            organization_id,
            actor_type: ActorType::System,
            action: action.into(),
            resource_type: String::new(),
            resource_id: None,
            metadata: serde_json::json!({}),
            correlation_id: None,
        }
    }

    pub fn actor(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Service for appending audit records
#[derive(Clone)]
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an audit record
    pub async fn record(&self, entry: AuditEntry) -> AccessResult<Uuid> {
        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO audit_log (
                organization_id,
                actor_type,
                action,
                resource_type,
                resource_id,
                metadata,
                correlation_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(entry.organization_id)
        .bind(entry.actor_type.to_string())
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.metadata)
        .bind(&entry.correlation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id.0)
    }

    /// Append an audit record, swallowing failures
    pub async fn record_best_effort(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.record(entry).await {
            tracing::error!(action = %action, error = %e, "Failed to append audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_display() {
        assert_eq!(ActorType::System.to_string(), "system");
        assert_eq!(ActorType::Operator.to_string(), "operator");
        assert_eq!(ActorType::Stripe.to_string(), "stripe");
        assert_eq!(ActorType::Telegram.to_string(), "telegram");
    }

    #[test]
    fn test_entry_builder() {
        let org_id = Uuid::new_v4();
        let entry = AuditEntry::new(org_id, "access.grant")
            .actor(ActorType::Stripe)
            .resource("subscription", "sub-1")
            .metadata(serde_json::json!({"channels": 2}))
            .correlation("evt_123");

        assert_eq!(entry.organization_id, org_id);
        assert_eq!(entry.action, "access.grant");
        assert_eq!(entry.actor_type, ActorType::Stripe);
        assert_eq!(entry.resource_id.as_deref(), Some("sub-1"));
        assert_eq!(entry.correlation_id.as_deref(), Some("evt_123"));
    }
}
