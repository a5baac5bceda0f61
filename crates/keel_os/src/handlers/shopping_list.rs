#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::AuditValues;
use keel_kernel_contracts::inventory::{PartId, PartRecord, PartStatus};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_kernel_contracts::shopping_list::{
    ShoppingListItemId, ShoppingListItemRecord, ShoppingListStatus, ShoppingUrgency,
    APPROVE_SHOPPING_LIST_ITEM, PROMOTE_CANDIDATE_TO_PART, REJECT_SHOPPING_LIST_ITEM,
};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, status_change, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

const DEFAULT_UNIT: &str = "ea";

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "create_shopping_list_item" => create(cx),
        APPROVE_SHOPPING_LIST_ITEM | REJECT_SHOPPING_LIST_ITEM => decide(cx, p),
        PROMOTE_CANDIDATE_TO_PART => promote(cx, p),
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    Ok(json!({ "item": item_json(load(cx, p)?) }))
}

fn load<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p ShoppingListItemRecord, ActionError> {
    let id = cx.payload.entity_id("item_id")?;
    ShoppingListItemId::new(id.as_str())
        .ok()
        .and_then(|iid| p.shopping_list_item(&iid))
        .ok_or_else(|| ActionError::not_found("shopping_list_item", &id))
}

fn create(cx: &HandlerContext<'_>) -> Result<MutationPlan, ActionError> {
    let urgency = match cx.payload.opt_text("urgency")? {
        Some(s) => ShoppingUrgency::parse(&s)?,
        None => ShoppingUrgency::Normal,
    };
    let item = ShoppingListItemRecord {
        yacht_id: cx.request.yacht_id().clone(),
        item_id: ShoppingListItemId::new(cx.ids().next("shp"))?,
        part_name: cx.payload.text("part_name")?,
        part_number: cx.payload.opt_text("part_number")?,
        quantity: cx.payload.quantity("quantity")?,
        unit: cx
            .payload
            .opt_text("unit")?
            .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        urgency,
        status: ShoppingListStatus::Candidate,
        requested_by: cx.actor().clone(),
        decided_by: None,
        rejection_reason: None,
        promoted_part_id: None,
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::ShoppingListItem,
        item.item_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", item.status.as_str())?
            .with("part_name", item.part_name.as_str())?
            .with("quantity", item.quantity.to_string())?
            .with("urgency", urgency.as_str())?,
    )?;
    Ok(MutationPlan::new(json!({
        "item_id": item.item_id.as_str(),
        "status": item.status.as_str(),
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::ShoppingListItem(item)))
    .audit(audit))
}

fn decide(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.decided_by = Some(cx.actor().clone());
    next.updated_at = cx.now();
    let (old, mut new) = status_change(current.status, to)?;
    new.insert("decided_by", cx.actor().as_str())?;
    if cx.action() == REJECT_SHOPPING_LIST_ITEM {
        let reason = cx.payload.text("reason")?;
        new.insert("rejection_reason", reason.as_str())?;
        next.rejection_reason = Some(reason);
    }
    let audit = cx.audit(EntityType::ShoppingListItem, next.item_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "item_id": next.item_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
    }))
    .write(EntityWrite::Update(EntityRow::ShoppingListItem(next)))
    .audit(audit))
}

/// Creates a part from an approved item. A promoted item replays its part id without writing.
fn promote(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    if current.status == ShoppingListStatus::Promoted {
        if let Some(part_id) = &current.promoted_part_id {
            return Ok(MutationPlan::new(json!({
                "item_id": current.item_id.as_str(),
                "part_id": part_id.as_str(),
                "status": current.status.as_str(),
                "already_promoted": true,
            })));
        }
    }
    let to = transition(current.status, cx.action())?;

    let part = PartRecord {
        yacht_id: cx.request.yacht_id().clone(),
        part_id: PartId::new(cx.ids().next("prt"))?,
        name: current.part_name.clone(),
        part_number: current.part_number.clone(),
        unit: current.unit.clone(),
        stock_by_location: BTreeMap::new(),
        status: PartStatus::Active,
        source_item_id: Some(current.item_id.as_str().to_string()),
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let mut next = current.clone();
    next.status = to;
    next.promoted_part_id = Some(part.part_id.clone());
    next.updated_at = cx.now();

    let part_audit = cx.audit(
        EntityType::Part,
        part.part_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", part.status.as_str())?
            .with("name", part.name.as_str())?
            .with("source_item_id", current.item_id.as_str())?,
    )?;
    let (old, mut new) = status_change(current.status, to)?;
    new.insert("promoted_part_id", part.part_id.as_str())?;
    let item_audit = cx.audit(EntityType::ShoppingListItem, next.item_id.as_str(), old, new)?;

    Ok(MutationPlan::new(json!({
        "item_id": next.item_id.as_str(),
        "part_id": part.part_id.as_str(),
        "status": to.as_str(),
        "already_promoted": false,
    }))
    .write(EntityWrite::Insert(EntityRow::Part(part)))
    .write(EntityWrite::Update(EntityRow::ShoppingListItem(next)))
    .audit(part_audit)
    .audit(item_audit))
}

pub(crate) fn item_json(i: &ShoppingListItemRecord) -> Value {
    json!({
        "item_id": i.item_id.as_str(),
        "part_name": i.part_name,
        "part_number": opt_str(&i.part_number),
        "quantity": i.quantity,
        "unit": i.unit,
        "urgency": i.urgency.as_str(),
        "status": i.status.as_str(),
        "requested_by": i.requested_by.as_str(),
        "decided_by": opt_str(&i.decided_by.as_ref().map(|u| u.as_str())),
        "rejection_reason": opt_str(&i.rejection_reason),
        "promoted_part_id": opt_str(&i.promoted_part_id.as_ref().map(|p| p.as_str())),
        "created_at": i.created_at.0,
        "updated_at": i.updated_at.0,
    })
}
