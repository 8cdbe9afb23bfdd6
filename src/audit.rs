use serde_json::Value;

use crate::store::OrderStore;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
}

/// Best-effort: runs after the business write committed, so a failure here is only logged.
pub async fn log_audit(
    store: &dyn OrderStore,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) {
    let entry = AuditEntry {
        action: action.to_string(),
        resource: resource.map(str::to_string),
        metadata,
    };

    if let Err(err) = store.record_audit(entry).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
