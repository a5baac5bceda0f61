#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::AuditValues;
use keel_kernel_contracts::common::EntityNote;
use keel_kernel_contracts::fault::{FaultId, FaultStatus};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_kernel_contracts::tenancy::UserId;
use keel_kernel_contracts::work_order::{
    WorkOrderId, WorkOrderPriority, WorkOrderRecord, WorkOrderStatus, ADD_WORK_ORDER_NOTE,
    ASSIGN_WORK_ORDER, CANCEL_WORK_ORDER, CLOSE_WORK_ORDER, START_WORK_ORDER,
};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "create_work_order" => create(cx, p),
        ASSIGN_WORK_ORDER | START_WORK_ORDER | ADD_WORK_ORDER_NOTE | CLOSE_WORK_ORDER
        | CANCEL_WORK_ORDER => update(cx, p),
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    Ok(json!({ "work_order": work_order_json(load(cx, p)?) }))
}

fn load<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p WorkOrderRecord, ActionError> {
    let id = cx.payload.entity_id("work_order_id")?;
    WorkOrderId::new(id.as_str())
        .ok()
        .and_then(|wid| p.work_order(&wid))
        .ok_or_else(|| ActionError::not_found("work_order", &id))
}

fn assignee(cx: &HandlerContext<'_>) -> Result<Option<UserId>, ActionError> {
    let Some(user) = cx.payload.opt_id("assignee_id", UserId::new)? else {
        return Ok(None);
    };
    if cx.crew_member_role(&user)?.is_none() {
        return Err(ActionError::Validation(format!(
            "assignee '{user}' is not a member of this yacht"
        )));
    }
    Ok(Some(user))
}

fn create(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let fault_id = cx.payload.opt_id("fault_id", FaultId::new)?;
    if let Some(fid) = &fault_id {
        let fault = p
            .fault(fid)
            .ok_or_else(|| ActionError::not_found("fault", fid.as_str()))?;
        if matches!(fault.status, FaultStatus::Closed | FaultStatus::FalseAlarm) {
            return Err(ActionError::InvalidTransition(format!(
                "cannot open a work order against fault '{fid}' while it is '{}'",
                fault.status.as_str()
            )));
        }
    }
    let priority = match cx.payload.opt_text("priority")? {
        Some(s) => WorkOrderPriority::parse(&s)?,
        None => WorkOrderPriority::Normal,
    };
    let wo = WorkOrderRecord {
        yacht_id: cx.request.yacht_id().clone(),
        work_order_id: WorkOrderId::new(cx.ids().next("wo"))?,
        title: cx.payload.text("title")?,
        description: cx.payload.opt_text("description")?,
        priority,
        fault_id,
        assigned_to: assignee(cx)?,
        status: WorkOrderStatus::Open,
        created_by: cx.actor().clone(),
        completion_notes: None,
        cancellation_reason: None,
        notes: Vec::new(),
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::WorkOrder,
        wo.work_order_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", wo.status.as_str())?
            .with("title", wo.title.as_str())?
            .with("priority", priority.as_str())?
            .with_opt("fault_id", wo.fault_id.as_ref().map(|f| f.as_str()))?
            .with_opt("assigned_to", wo.assigned_to.as_ref().map(|u| u.as_str()))?,
    )?;
    Ok(MutationPlan::new(json!({
        "work_order_id": wo.work_order_id.as_str(),
        "status": wo.status.as_str(),
        "fault_id": opt_str(&wo.fault_id.as_ref().map(|f| f.as_str())),
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::WorkOrder(wo)))
    .audit(audit))
}

fn update(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();

    let mut old = AuditValues::new();
    let mut new = AuditValues::new();
    if current.status != to {
        old.insert("status", current.status.as_str())?;
        new.insert("status", to.as_str())?;
    }
    match cx.action() {
        ASSIGN_WORK_ORDER => {
            let user = assignee(cx)?.ok_or_else(|| {
                ActionError::MissingField("missing required field 'assignee_id'".to_string())
            })?;
            if let Some(prev) = &current.assigned_to {
                old.insert("assigned_to", prev.as_str())?;
            }
            new.insert("assigned_to", user.as_str())?;
            next.assigned_to = Some(user);
        }
        START_WORK_ORDER => {
            if next.assigned_to.is_none() {
                next.assigned_to = Some(cx.actor().clone());
                new.insert("assigned_to", cx.actor().as_str())?;
            }
        }
        ADD_WORK_ORDER_NOTE => {
            let body = cx.payload.text("note")?;
            new.insert("note", body.as_str())?;
            next.notes.push(EntityNote {
                author: cx.actor().clone(),
                body,
                created_at: cx.now(),
            });
        }
        CLOSE_WORK_ORDER => {
            next.completion_notes = cx.payload.opt_text("completion_notes")?;
            if let Some(n) = &next.completion_notes {
                new.insert("completion_notes", n.as_str())?;
            }
        }
        CANCEL_WORK_ORDER => {
            let reason = cx.payload.text("reason")?;
            new.insert("cancellation_reason", reason.as_str())?;
            next.cancellation_reason = Some(reason);
        }
        _ => return Err(unhandled(cx)),
    }
    let audit = cx.audit(EntityType::WorkOrder, next.work_order_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "work_order_id": next.work_order_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
        "assigned_to": opt_str(&next.assigned_to.as_ref().map(|u| u.as_str())),
    }))
    .write(EntityWrite::Update(EntityRow::WorkOrder(next)))
    .audit(audit))
}

pub(crate) fn work_order_json(w: &WorkOrderRecord) -> Value {
    let notes: Vec<Value> = w
        .notes
        .iter()
        .map(|n| json!({"author": n.author.as_str(), "body": n.body, "created_at": n.created_at.0}))
        .collect();
    json!({
        "work_order_id": w.work_order_id.as_str(),
        "title": w.title,
        "description": opt_str(&w.description),
        "priority": w.priority.as_str(),
        "fault_id": opt_str(&w.fault_id.as_ref().map(|f| f.as_str())),
        "assigned_to": opt_str(&w.assigned_to.as_ref().map(|u| u.as_str())),
        "status": w.status.as_str(),
        "created_by": w.created_by.as_str(),
        "completion_notes": opt_str(&w.completion_notes),
        "cancellation_reason": opt_str(&w.cancellation_reason),
        "notes": notes,
        "created_at": w.created_at.0,
        "updated_at": w.updated_at.0,
    })
}
