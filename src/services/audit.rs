use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::repository::table_service::create_row;

/// Best-effort audit trail: one row per mutating action, with before/after
/// snapshots. Failures are logged and swallowed so auditing never fails the
/// request that triggered it.
pub async fn write_audit_log(
    pool: Option<&PgPool>,
    user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    before: Option<Value>,
    after: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };

    let mut record = Map::new();
    record.insert("action".to_string(), Value::String(action.to_string()));
    record.insert(
        "entity_type".to_string(),
        Value::String(entity_type.to_string()),
    );
    if let Some(user_id) = user_id {
        record.insert("user_id".to_string(), Value::String(user_id.to_string()));
    }
    if let Some(entity_id) = entity_id {
        record.insert(
            "entity_id".to_string(),
            Value::String(entity_id.to_string()),
        );
    }
    if let Some(before) = before {
        record.insert("before_snapshot".to_string(), before);
    }
    if let Some(after) = after {
        record.insert("after_snapshot".to_string(), after);
    }

    if let Err(error) = create_row(pool, "audit_logs", &record).await {
        tracing::warn!(error = %error, action, entity_type, "Audit log write failed");
    }
}
