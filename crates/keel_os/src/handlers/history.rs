#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::{AuditEntry, AuditValues};
use keel_storage::repo::KeelAuditRepo;
use keel_storage::TenantPartition;
use serde_json::{json, Map, Value};

use super::{signature_json, HandlerContext};
use crate::error::ActionError;

/// `view_entity_history`: audit rows for one entity of the caller's yacht, oldest first.
pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    let entity_type = EntityType::parse(&cx.payload.text("entity_type")?)?;
    let entity_id = cx.payload.entity_id("entity_id")?;
    let rows: Vec<Value> = p
        .audit_rows_for_entity(entity_type, &entity_id)
        .into_iter()
        .map(entry_json)
        .collect();
    Ok(json!({
        "entity_type": entity_type.as_str(),
        "entity_id": entity_id,
        "count": rows.len(),
        "entries": rows,
    }))
}

fn values_json(values: &AuditValues) -> Value {
    let mut m = Map::new();
    for (k, v) in values.iter() {
        m.insert(k.to_string(), Value::String(v.to_string()));
    }
    Value::Object(m)
}

fn entry_json(e: &AuditEntry) -> Value {
    json!({
        "audit_id": e.audit_id.0,
        "created_at": e.created_at.0,
        "action": e.action,
        "actor_id": e.actor_id.as_str(),
        "actor_role": e.actor_role.as_str(),
        "old_values": values_json(&e.old_values),
        "new_values": values_json(&e.new_values),
        "signature": signature_json(&e.signature),
    })
}
