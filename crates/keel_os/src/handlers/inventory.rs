#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::AuditValues;
use keel_kernel_contracts::inventory::{
    validate_location, InventoryTransaction, InventoryTransactionId, InventoryTransactionKind,
    PartId, PartRecord, ARCHIVE_PART, CONSUME_PART, RECEIVE_PART,
};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_kernel_contracts::work_order::WorkOrderId;
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, status_change, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        RECEIVE_PART => move_stock(cx, p, InventoryTransactionKind::Receive),
        CONSUME_PART => move_stock(cx, p, InventoryTransactionKind::Consume),
        ARCHIVE_PART => archive(cx, p),
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    let part = load(cx, p)?;
    let movements: Vec<Value> = p
        .inventory_transactions_for(&part.part_id)
        .into_iter()
        .map(|t| {
            json!({
                "transaction_id": t.transaction_id.as_str(),
                "kind": t.kind.as_str(),
                "location": t.location,
                "quantity": t.quantity,
                "work_order_id": opt_str(&t.work_order_id.as_ref().map(|w| w.as_str())),
                "resulting_stock_level": t.resulting_stock_level,
                "performed_by": t.performed_by.as_str(),
                "created_at": t.created_at.0,
            })
        })
        .collect();
    Ok(json!({
        "part": part_json(part),
        "transactions": movements,
    }))
}

fn load<'p>(cx: &HandlerContext<'_>, p: &'p TenantPartition) -> Result<&'p PartRecord, ActionError> {
    let id = cx.payload.entity_id("part_id")?;
    PartId::new(id.as_str())
        .ok()
        .and_then(|pid| p.part(&pid))
        .ok_or_else(|| ActionError::not_found("part", &id))
}

fn move_stock(
    cx: &HandlerContext<'_>,
    p: &TenantPartition,
    kind: InventoryTransactionKind,
) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    transition(current.status, cx.action())?;
    let location_field = match kind {
        InventoryTransactionKind::Receive => "to_location",
        InventoryTransactionKind::Consume => "from_location",
    };
    let location = cx.payload.text(location_field)?;
    validate_location("location", &location)?;
    let quantity = cx.payload.quantity("quantity")?;
    let work_order_id = cx.payload.opt_id("work_order_id", WorkOrderId::new)?;
    if let Some(wid) = &work_order_id {
        if p.work_order(wid).is_none() {
            return Err(ActionError::not_found("work_order", wid.as_str()));
        }
    }

    let before_here = current.stock_at(&location);
    let after_here = match kind {
        InventoryTransactionKind::Receive => before_here.checked_add(quantity).ok_or_else(|| {
            ActionError::Validation(format!("invalid field 'quantity': stock at '{location}' would overflow"))
        })?,
        InventoryTransactionKind::Consume => {
            if before_here < quantity {
                return Err(ActionError::InsufficientStock(format!(
                    "insufficient stock for part '{}' at '{location}': available {before_here}, requested {quantity}",
                    current.part_id
                )));
            }
            before_here - quantity
        }
    };

    let mut next = current.clone();
    if after_here == 0 {
        next.stock_by_location.remove(&location);
    } else {
        next.stock_by_location.insert(location.clone(), after_here);
    }
    next.updated_at = cx.now();
    let level = next.checked_stock_level().ok_or_else(|| {
        ActionError::Validation(format!(
            "invalid field 'quantity': total stock of part '{}' would overflow",
            current.part_id
        ))
    })?;

    let movement = InventoryTransaction {
        yacht_id: cx.request.yacht_id().clone(),
        transaction_id: InventoryTransactionId::new(cx.ids().next("itx"))?,
        part_id: current.part_id.clone(),
        kind,
        location: location.clone(),
        quantity,
        work_order_id,
        resulting_stock_level: level,
        performed_by: cx.actor().clone(),
        created_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::Part,
        current.part_id.as_str(),
        AuditValues::new()
            .with("location", location.as_str())?
            .with("stock_at_location", before_here.to_string())?
            .with("stock_level", current.stock_level().to_string())?,
        AuditValues::new()
            .with("location", location.as_str())?
            .with("stock_at_location", after_here.to_string())?
            .with("stock_level", level.to_string())?
            .with("quantity", quantity.to_string())?
            .with("transaction_id", movement.transaction_id.as_str())?
            .with_opt(
                "work_order_id",
                movement.work_order_id.as_ref().map(|w| w.as_str()),
            )?,
    )?;
    Ok(MutationPlan::new(json!({
        "part_id": current.part_id.as_str(),
        "transaction_id": movement.transaction_id.as_str(),
        "location": location,
        "quantity": quantity,
        "stock_at_location": after_here,
        "stock_level": level,
        "new_stock_level": level,
    }))
    .write(EntityWrite::Update(EntityRow::Part(next)))
    .write(EntityWrite::AppendInventoryTransaction(movement))
    .audit(audit))
}

fn archive(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();
    let (old, new) = status_change(current.status, to)?;
    let audit = cx.audit(EntityType::Part, next.part_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "part_id": next.part_id.as_str(),
        "status": to.as_str(),
        "stock_level": next.stock_level(),
    }))
    .write(EntityWrite::Update(EntityRow::Part(next)))
    .audit(audit))
}

pub(crate) fn part_json(part: &PartRecord) -> Value {
    json!({
        "part_id": part.part_id.as_str(),
        "name": part.name,
        "part_number": opt_str(&part.part_number),
        "unit": part.unit,
        "stock_by_location": part.stock_by_location,
        "stock_level": part.stock_level(),
        "status": part.status.as_str(),
        "source_item_id": opt_str(&part.source_item_id),
        "created_at": part.created_at.0,
        "updated_at": part.updated_at.0,
    })
}
