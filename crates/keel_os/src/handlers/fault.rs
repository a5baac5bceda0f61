#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::AuditValues;
use keel_kernel_contracts::common::EntityNote;
use keel_kernel_contracts::fault::{
    FaultId, FaultRecord, FaultSeverity, FaultStatus, ACKNOWLEDGE_FAULT, ADD_FAULT_NOTE,
    CLOSE_FAULT, DIAGNOSE_FAULT, MARK_FAULT_FALSE_ALARM, REOPEN_FAULT,
};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, status_change, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "report_fault" => report(cx),
        ACKNOWLEDGE_FAULT | MARK_FAULT_FALSE_ALARM => change_status(cx, p, |_| Ok(())),
        DIAGNOSE_FAULT => {
            let diagnosis = cx.payload.text("diagnosis")?;
            change_status(cx, p, move |f| {
                f.diagnosis = Some(diagnosis);
                Ok(())
            })
        }
        CLOSE_FAULT => {
            let resolution = cx.payload.text("resolution")?;
            change_status(cx, p, move |f| {
                f.resolution = Some(resolution);
                Ok(())
            })
        }
        REOPEN_FAULT => {
            let reason = cx.payload.text("reason")?;
            let author = cx.actor().clone();
            let now = cx.now();
            change_status(cx, p, move |f| {
                f.notes.push(EntityNote {
                    author,
                    body: format!("reopened: {reason}"),
                    created_at: now,
                });
                Ok(())
            })
        }
        ADD_FAULT_NOTE => add_note(cx, p),
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    let f = load(cx, p)?;
    let linked: Vec<Value> = p
        .work_orders_for_fault(&f.fault_id)
        .into_iter()
        .map(|w| json!({"work_order_id": w.work_order_id.as_str(), "status": w.status.as_str()}))
        .collect();
    Ok(json!({
        "fault": fault_json(f),
        "work_orders": linked,
    }))
}

fn load<'p>(cx: &HandlerContext<'_>, p: &'p TenantPartition) -> Result<&'p FaultRecord, ActionError> {
    let id = cx.payload.entity_id("fault_id")?;
    FaultId::new(id.as_str())
        .ok()
        .and_then(|fid| p.fault(&fid))
        .ok_or_else(|| ActionError::not_found("fault", &id))
}

fn report(cx: &HandlerContext<'_>) -> Result<MutationPlan, ActionError> {
    let severity = FaultSeverity::parse(&cx.payload.text("severity")?)?;
    let fault = FaultRecord {
        yacht_id: cx.request.yacht_id().clone(),
        fault_id: FaultId::new(cx.ids().next("flt"))?,
        title: cx.payload.text("title")?,
        description: cx.payload.opt_text("description")?,
        severity,
        equipment_id: cx.payload.opt_text("equipment_id")?,
        status: FaultStatus::Open,
        reported_by: cx.actor().clone(),
        diagnosis: None,
        resolution: None,
        notes: Vec::new(),
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::Fault,
        fault.fault_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", fault.status.as_str())?
            .with("title", fault.title.as_str())?
            .with("severity", severity.as_str())?,
    )?;
    Ok(MutationPlan::new(json!({
        "fault_id": fault.fault_id.as_str(),
        "status": fault.status.as_str(),
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::Fault(fault)))
    .audit(audit))
}

fn change_status(
    cx: &HandlerContext<'_>,
    p: &TenantPartition,
    edit: impl FnOnce(&mut FaultRecord) -> Result<(), ActionError>,
) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();
    edit(&mut next)?;

    let (old, mut new) = status_change(current.status, to)?;
    for (key, before, after) in [
        ("diagnosis", &current.diagnosis, &next.diagnosis),
        ("resolution", &current.resolution, &next.resolution),
    ] {
        if before != after {
            new.insert(key, after.clone().unwrap_or_default())?;
        }
    }
    if let Some(note) = next.notes.last().filter(|_| next.notes.len() > current.notes.len()) {
        new.insert("note", note.body.as_str())?;
    }
    let audit = cx.audit(EntityType::Fault, next.fault_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "fault_id": next.fault_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
    }))
    .write(EntityWrite::Update(EntityRow::Fault(next)))
    .audit(audit))
}

fn add_note(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    transition(current.status, cx.action())?;
    let body = cx.payload.text("note")?;
    let mut next = current.clone();
    next.notes.push(EntityNote {
        author: cx.actor().clone(),
        body: body.clone(),
        created_at: cx.now(),
    });
    next.updated_at = cx.now();
    let audit = cx.audit(
        EntityType::Fault,
        next.fault_id.as_str(),
        AuditValues::new(),
        AuditValues::new().with("note", body)?,
    )?;
    Ok(MutationPlan::new(json!({
        "fault_id": next.fault_id.as_str(),
        "status": next.status.as_str(),
        "note_count": next.notes.len(),
    }))
    .write(EntityWrite::Update(EntityRow::Fault(next)))
    .audit(audit))
}

pub(crate) fn fault_json(f: &FaultRecord) -> Value {
    let notes: Vec<Value> = f
        .notes
        .iter()
        .map(|n| json!({"author": n.author.as_str(), "body": n.body, "created_at": n.created_at.0}))
        .collect();
    json!({
        "fault_id": f.fault_id.as_str(),
        "title": f.title,
        "description": opt_str(&f.description),
        "severity": f.severity.as_str(),
        "equipment_id": opt_str(&f.equipment_id),
        "status": f.status.as_str(),
        "reported_by": f.reported_by.as_str(),
        "diagnosis": opt_str(&f.diagnosis),
        "resolution": opt_str(&f.resolution),
        "notes": notes,
        "created_at": f.created_at.0,
        "updated_at": f.updated_at.0,
    })
}
