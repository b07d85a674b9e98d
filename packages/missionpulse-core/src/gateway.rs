//! Audit-logged mutation gateway.
//!
//! Every create/update/delete against a tracked table goes through
//! [`MutationGateway`]. Per call the order is fixed: validate, mutate, then
//! append exactly one audit record once the store has confirmed the change.
//! A failed mutation never produces an audit record. A failed audit append
//! after a committed mutation is a consistency gap: it is logged at error
//! level and reported through [`AuditStatus::Degraded`], not as a failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditAction, AuditEntry, AuditRecord, AuditSink};
use crate::auth::Actor;
use crate::error::{CoreError, StoreError};
use crate::record::{ChangeRequest, Fields, Record, RecordId};
use crate::schema::{validate_create, validate_update, SchemaRegistry, TableSchema};
use crate::store::RowStore;

/// Outcome of the audit half of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditStatus {
    /// Audit record durably appended
    Recorded(AuditRecord),
    /// Mutation committed but its audit record was not confirmed.
    ///
    /// When the append timed out the sink may still finish the write, so
    /// the record can appear in the trail later.
    Degraded { reason: String },
    /// Nothing was mutated, so nothing was audited
    NotRequired,
}

impl AuditStatus {
    /// Value for the `X-Audit-Status` response header.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            AuditStatus::Recorded(_) => Some("recorded"),
            AuditStatus::Degraded { .. } => Some("degraded"),
            AuditStatus::NotRequired => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AuditStatus::Degraded { .. })
    }
}

/// Result of a gateway operation: the mutation's value plus audit outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    pub audit: AuditStatus,
}

/// Validates, applies and audits change requests.
pub struct MutationGateway {
    store: Arc<dyn RowStore>,
    audit: Arc<dyn AuditSink>,
    schemas: Arc<SchemaRegistry>,
    store_timeout: Duration,
}

impl MutationGateway {
    /// Creates a gateway.
    ///
    /// # Arguments
    /// * `store` - Row store receiving mutations
    /// * `audit` - Sink receiving one audit record per committed mutation
    /// * `schemas` - Tracked table schemas
    /// * `store_timeout` - Bound on each individual collaborator call
    pub fn new(
        store: Arc<dyn RowStore>,
        audit: Arc<dyn AuditSink>,
        schemas: Arc<SchemaRegistry>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            audit,
            schemas,
            store_timeout,
        }
    }

    /// Applies a change request: create when it carries no id, update
    /// otherwise.
    pub async fn apply(
        &self,
        request: ChangeRequest,
        actor: &Actor,
    ) -> Result<Mutation<Record>, CoreError> {
        match request.id {
            None => self.create(&request.table, request.fields, actor).await,
            Some(id) => self.update(&request.table, &id, request.fields, actor).await,
        }
    }

    /// Inserts a record and audits it with a CREATE entry.
    ///
    /// # Errors
    /// `CoreError::Validation` before any store call on a schema violation,
    /// `CoreError::Store` if the insert fails (no audit record is written).
    pub async fn create(
        &self,
        table: &str,
        fields: Fields,
        actor: &Actor,
    ) -> Result<Mutation<Record>, CoreError> {
        let schema = self.schema(table)?;
        let row = validate_create(schema, fields, &actor.id)?;

        let record = self
            .bounded(self.store.insert(table, row))
            .await
            .map_err(|e| store_failure("insert", table, actor, e))?;
        tracing::info!("{} created {}/{}", actor.id, table, record.id);

        let entry = AuditEntry::new(AuditAction::Create, table, record.id.clone(), &actor.id);
        let audit = self.record_audit(entry).await;
        Ok(Mutation {
            value: record,
            audit,
        })
    }

    /// Merges `fields` into record `id` and audits it with an UPDATE entry
    /// carrying the changed-field snapshot.
    ///
    /// # Errors
    /// `CoreError::EmptyChange` when no fields remain after dropping nulls,
    /// `CoreError::Validation` on a schema violation,
    /// `CoreError::NotFound` if the record does not exist (nothing audited),
    /// `CoreError::Store` if the update fails.
    pub async fn update(
        &self,
        table: &str,
        id: &RecordId,
        fields: Fields,
        actor: &Actor,
    ) -> Result<Mutation<Record>, CoreError> {
        let schema = self.schema(table)?;
        let changes = validate_update(schema, fields)?;

        let updated = self
            .bounded(self.store.update(table, id, changes.clone()))
            .await
            .map_err(|e| store_failure("update", table, actor, e))?;
        let Some(record) = updated else {
            return Err(CoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        };
        tracing::info!(
            "{} updated {}/{} ({} fields)",
            actor.id,
            table,
            record.id,
            changes.len()
        );

        let entry = AuditEntry::new(AuditAction::Update, table, record.id.clone(), &actor.id)
            .with_changes(changes);
        let audit = self.record_audit(entry).await;
        Ok(Mutation {
            value: record,
            audit,
        })
    }

    /// Deletes record `id`.
    ///
    /// Idempotent: deleting a missing record succeeds with `false` and
    /// writes no audit record.
    pub async fn delete(
        &self,
        table: &str,
        id: &RecordId,
        actor: &Actor,
    ) -> Result<Mutation<bool>, CoreError> {
        self.schema(table)?;

        let deleted = self
            .bounded(self.store.delete(table, id))
            .await
            .map_err(|e| store_failure("delete", table, actor, e))?;
        if !deleted {
            tracing::debug!("{} deleted missing {}/{}", actor.id, table, id);
            return Ok(Mutation {
                value: false,
                audit: AuditStatus::NotRequired,
            });
        }
        tracing::info!("{} deleted {}/{}", actor.id, table, id);

        let entry = AuditEntry::new(AuditAction::Delete, table, id.clone(), &actor.id);
        let audit = self.record_audit(entry).await;
        Ok(Mutation {
            value: true,
            audit,
        })
    }

    fn schema(&self, table: &str) -> Result<&TableSchema, CoreError> {
        self.schemas.get(table).ok_or_else(|| CoreError::UnknownTable {
            table: table.to_string(),
        })
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.store_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn record_audit(&self, entry: AuditEntry) -> AuditStatus {
        let summary = format!(
            "{} {}/{} by {}",
            entry.action, entry.table_name, entry.record_id, entry.actor_id
        );
        match self.bounded(self.audit.append(entry)).await {
            Ok(record) => AuditStatus::Recorded(record),
            Err(e) => {
                tracing::error!("Audit write failed after committed {}: {}", summary, e);
                AuditStatus::Degraded {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn store_failure(op: &str, table: &str, actor: &Actor, e: StoreError) -> CoreError {
    if e == StoreError::Timeout {
        // The store may still have committed the write
        tracing::error!(
            "Store {} on {} by {} timed out; outcome unknown, possible unaudited mutation",
            op,
            table,
            actor.id
        );
    } else {
        tracing::error!("Store {} on {} by {} failed: {}", op, table, actor.id, e);
    }
    CoreError::Store(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, TableAuditSink};
    use crate::schema::AUDIT_LOG_TABLE;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn setup() -> (Arc<MemoryStore>, MutationGateway) {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(TableAuditSink::new(store.clone()));
        let gateway = MutationGateway::new(
            store.clone(),
            audit,
            Arc::new(SchemaRegistry::with_builtin_tables()),
            Duration::from_secs(5),
        );
        (store, gateway)
    }

    fn actor() -> Actor {
        Actor::new("exec_001", "executive", "internal")
    }

    #[tokio::test]
    async fn test_create_audits_once() {
        let (store, gateway) = setup();
        let created = gateway
            .create("opportunities", fields(json!({"title": "X"})), &actor())
            .await
            .unwrap();

        assert_eq!(created.value.fields["phase"], json!("qualify"));
        let AuditStatus::Recorded(audit) = &created.audit else {
            panic!("expected recorded audit");
        };
        assert_eq!(audit.action, AuditAction::Create);
        assert_eq!(audit.record_id, created.value.id);
        assert_eq!(audit.actor_id, "exec_001");
        assert!(audit.changed_fields.is_none());
        assert_eq!(store.row_count(AUDIT_LOG_TABLE), 1);
    }

    #[tokio::test]
    async fn test_apply_dispatches_on_id() {
        let (_store, gateway) = setup();
        let created = gateway
            .apply(
                ChangeRequest::create("competitors", fields(json!({"name": "Acme"}))),
                &actor(),
            )
            .await
            .unwrap();
        let updated = gateway
            .apply(
                ChangeRequest::update(
                    "competitors",
                    created.value.id.clone(),
                    fields(json!({"threat_level": "High"})),
                ),
                &actor(),
            )
            .await
            .unwrap();
        assert_eq!(updated.value.id, created.value.id);
        assert_eq!(updated.value.fields["threat_level"], json!("High"));
    }

    #[tokio::test]
    async fn test_update_snapshot_holds_changed_fields_only() {
        let (_store, gateway) = setup();
        let created = gateway
            .create("opportunities", fields(json!({"title": "X", "agency": "DHA"})), &actor())
            .await
            .unwrap();
        let updated = gateway
            .update(
                "opportunities",
                &created.value.id,
                fields(json!({"pwin": 60, "agency": null})),
                &actor(),
            )
            .await
            .unwrap();

        assert_eq!(updated.value.fields["agency"], json!("DHA"));
        let AuditStatus::Recorded(audit) = updated.audit else {
            panic!("expected recorded audit");
        };
        assert_eq!(audit.changed_fields, Some(fields(json!({"pwin": 60}))));
    }

    #[tokio::test]
    async fn test_rejected_updates_write_no_audit() {
        let (store, gateway) = setup();
        let missing = RecordId::from("missing");

        let err = gateway
            .update("opportunities", &missing, Fields::new(), &actor())
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::EmptyChange);

        let err = gateway
            .update("opportunities", &missing, fields(json!({"pwin": 5})), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));

        let err = gateway
            .create("nowhere", Fields::new(), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownTable { .. }));

        assert_eq!(store.row_count(AUDIT_LOG_TABLE), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, gateway) = setup();
        let created = gateway
            .create("win_themes", fields(json!({"theme": "Speed"})), &actor())
            .await
            .unwrap();

        let first = gateway
            .delete("win_themes", &created.value.id, &actor())
            .await
            .unwrap();
        assert!(first.value);
        assert_eq!(first.audit.header_value(), Some("recorded"));

        let second = gateway
            .delete("win_themes", &created.value.id, &actor())
            .await
            .unwrap();
        assert!(!second.value);
        assert_eq!(second.audit, AuditStatus::NotRequired);

        let audit = TableAuditSink::new(store);
        let deletes = audit
            .query(&AuditFilter::new(10).action(AuditAction::Delete))
            .await
            .unwrap();
        assert_eq!(deletes.len(), 1);
    }
}
