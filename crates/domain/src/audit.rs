//! Append-only audit trail of state-changing actions.

use catalog::{CatalogStore, NewAuditEntry};
use common::{AuditAction, OrderId, UserId};

/// Entity type recorded for order actions.
pub const ORDER_ENTITY: &str = "Order";

/// Writes audit entries without ever failing the caller.
///
/// A store failure is logged and counted in `audit_write_failures_total`;
/// the action being audited has already happened and is not undone.
pub struct AuditRecorder<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> AuditRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, changes), fields(action = %action))]
    pub async fn record(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: uuid::Uuid,
        actor_id: UserId,
        order_id: Option<OrderId>,
        changes: serde_json::Value,
    ) {
        let entry = NewAuditEntry {
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            user_id: actor_id,
            order_id,
            changes,
        };

        if let Err(e) = self.store.append_audit_entry(entry).await {
            metrics::counter!("audit_write_failures_total").increment(1);
            tracing::warn!(
                action = %action,
                %entity_id,
                error = %e,
                "failed to write audit entry"
            );
        }
    }

    /// Records an action on an order, using the order as the audited entity.
    pub async fn record_order(
        &self,
        action: AuditAction,
        order_id: OrderId,
        actor_id: UserId,
        changes: serde_json::Value,
    ) {
        self.record(
            action,
            ORDER_ENTITY,
            order_id.as_uuid(),
            actor_id,
            Some(order_id),
            changes,
        )
        .await;
    }
}
