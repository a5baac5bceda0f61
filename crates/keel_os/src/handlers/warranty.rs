#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::AuditValues;
use keel_kernel_contracts::inventory::PartId;
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_kernel_contracts::warranty::{
    WarrantyClaimId, WarrantyClaimRecord, WarrantyStatus, APPROVE_WARRANTY_CLAIM,
    CLOSE_WARRANTY_CLAIM, REJECT_WARRANTY_CLAIM, SUBMIT_WARRANTY_CLAIM,
};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, status_change, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "create_warranty_claim" => create(cx, p),
        SUBMIT_WARRANTY_CLAIM | APPROVE_WARRANTY_CLAIM | REJECT_WARRANTY_CLAIM
        | CLOSE_WARRANTY_CLAIM => change_status(cx, p),
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    Ok(json!({ "claim": claim_json(load(cx, p)?) }))
}

fn load<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p WarrantyClaimRecord, ActionError> {
    let id = cx.payload.entity_id("claim_id")?;
    WarrantyClaimId::new(id.as_str())
        .ok()
        .and_then(|cid| p.warranty_claim(&cid))
        .ok_or_else(|| ActionError::not_found("warranty_claim", &id))
}

fn create(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let part_id = cx.payload.opt_id("part_id", PartId::new)?;
    if let Some(pid) = &part_id {
        if p.part(pid).is_none() {
            return Err(ActionError::not_found("part", pid.as_str()));
        }
    }
    let claim = WarrantyClaimRecord {
        yacht_id: cx.request.yacht_id().clone(),
        claim_id: WarrantyClaimId::new(cx.ids().next("wcl"))?,
        title: cx.payload.text("title")?,
        description: cx.payload.text("description")?,
        part_id,
        equipment_id: cx.payload.opt_text("equipment_id")?,
        claimed_amount: cx.payload.opt_amount("claimed_amount")?,
        status: WarrantyStatus::Draft,
        created_by: cx.actor().clone(),
        decided_by: None,
        decision_notes: None,
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::WarrantyClaim,
        claim.claim_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", claim.status.as_str())?
            .with("title", claim.title.as_str())?
            .with_opt("part_id", claim.part_id.as_ref().map(|p| p.as_str()))?
            .with_opt(
                "claimed_amount",
                claim.claimed_amount.map(|a| a.to_string()),
            )?,
    )?;
    Ok(MutationPlan::new(json!({
        "claim_id": claim.claim_id.as_str(),
        "status": claim.status.as_str(),
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::WarrantyClaim(claim)))
    .audit(audit))
}

fn change_status(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();
    let (old, mut new) = status_change(current.status, to)?;
    let decision_notes = match cx.action() {
        APPROVE_WARRANTY_CLAIM => Some(cx.payload.opt_text("notes")?),
        REJECT_WARRANTY_CLAIM => Some(Some(cx.payload.text("reason")?)),
        _ => None,
    };
    if let Some(notes) = decision_notes {
        new.insert("decided_by", cx.actor().as_str())?;
        if let Some(n) = &notes {
            new.insert("decision_notes", n.as_str())?;
        }
        next.decided_by = Some(cx.actor().clone());
        next.decision_notes = notes;
    }
    let audit = cx.audit(EntityType::WarrantyClaim, next.claim_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "claim_id": next.claim_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
    }))
    .write(EntityWrite::Update(EntityRow::WarrantyClaim(next)))
    .audit(audit))
}

pub(crate) fn claim_json(c: &WarrantyClaimRecord) -> Value {
    json!({
        "claim_id": c.claim_id.as_str(),
        "title": c.title,
        "description": c.description,
        "part_id": opt_str(&c.part_id.as_ref().map(|p| p.as_str())),
        "equipment_id": opt_str(&c.equipment_id),
        "claimed_amount": opt_str(&c.claimed_amount.map(|a| a.to_string())),
        "status": c.status.as_str(),
        "created_by": c.created_by.as_str(),
        "decided_by": opt_str(&c.decided_by.as_ref().map(|u| u.as_str())),
        "decision_notes": opt_str(&c.decision_notes),
        "created_at": c.created_at.0,
        "updated_at": c.updated_at.0,
    })
}
