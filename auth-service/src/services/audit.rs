use std::sync::Arc;

use crate::models::AuditEvent;
use crate::services::CredentialStore;

/// Fire-and-forget audit trail. Write failures are logged, never surfaced.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn CredentialStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn record(&self, event: AuditEvent) {
        tracing::info!(
            event_type = %event.event_type_code,
            user_id = ?event.user_id,
            tenant_id = ?event.tenant_id,
            "Audit event"
        );

        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.insert_audit_event(&event).await {
                tracing::error!(
                    error = %e,
                    event_type = %event.event_type_code,
                    "Failed to persist audit event"
                );
            }
        });
    }
}
