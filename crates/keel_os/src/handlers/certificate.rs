#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::AuditValues;
use keel_kernel_contracts::certificate::{
    CertificateId, CertificateRecord, CertificateStatus, REINSTATE_CERTIFICATE, RENEW_CERTIFICATE,
    REVOKE_CERTIFICATE, SUSPEND_CERTIFICATE,
};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, status_change, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "create_certificate" => create(cx),
        RENEW_CERTIFICATE => renew(cx, p),
        SUSPEND_CERTIFICATE | REINSTATE_CERTIFICATE | REVOKE_CERTIFICATE => change_status(cx, p),
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    Ok(json!({ "certificate": certificate_json(load(cx, p)?) }))
}

fn load<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p CertificateRecord, ActionError> {
    let id = cx.payload.entity_id("certificate_id")?;
    CertificateId::new(id.as_str())
        .ok()
        .and_then(|cid| p.certificate(&cid))
        .ok_or_else(|| ActionError::not_found("certificate", &id))
}

fn create(cx: &HandlerContext<'_>) -> Result<MutationPlan, ActionError> {
    let cert = CertificateRecord {
        yacht_id: cx.request.yacht_id().clone(),
        certificate_id: CertificateId::new(cx.ids().next("crt"))?,
        name: cx.payload.text("name")?,
        issuing_authority: cx.payload.text("issuing_authority")?,
        certificate_number: cx.payload.opt_text("certificate_number")?,
        expires_on: cx.payload.date("expires_on")?,
        status: CertificateStatus::Valid,
        suspension_reason: None,
        revocation_reason: None,
        created_by: cx.actor().clone(),
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::Certificate,
        cert.certificate_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", cert.status.as_str())?
            .with("name", cert.name.as_str())?
            .with("expires_on", cert.expires_on.to_string())?,
    )?;
    Ok(MutationPlan::new(json!({
        "certificate_id": cert.certificate_id.as_str(),
        "status": cert.status.as_str(),
        "expires_on": cert.expires_on.to_string(),
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::Certificate(cert)))
    .audit(audit))
}

fn renew(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    transition(current.status, cx.action())?;
    let expires_on = cx.payload.date("expires_on")?;
    if expires_on <= current.expires_on {
        return Err(ActionError::Validation(format!(
            "invalid field 'expires_on': must be later than the current expiry {}",
            current.expires_on
        )));
    }
    let mut next = current.clone();
    next.expires_on = expires_on;
    next.updated_at = cx.now();
    let audit = cx.audit(
        EntityType::Certificate,
        next.certificate_id.as_str(),
        AuditValues::new().with("expires_on", current.expires_on.to_string())?,
        AuditValues::new().with("expires_on", expires_on.to_string())?,
    )?;
    Ok(MutationPlan::new(json!({
        "certificate_id": next.certificate_id.as_str(),
        "status": next.status.as_str(),
        "previous_expires_on": current.expires_on.to_string(),
        "expires_on": expires_on.to_string(),
    }))
    .write(EntityWrite::Update(EntityRow::Certificate(next)))
    .audit(audit))
}

fn change_status(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();
    let (old, mut new) = status_change(current.status, to)?;
    match cx.action() {
        SUSPEND_CERTIFICATE => {
            let reason = cx.payload.text("reason")?;
            new.insert("suspension_reason", reason.as_str())?;
            next.suspension_reason = Some(reason);
        }
        REINSTATE_CERTIFICATE => next.suspension_reason = None,
        REVOKE_CERTIFICATE => {
            let reason = cx.payload.text("reason")?;
            new.insert("revocation_reason", reason.as_str())?;
            next.revocation_reason = Some(reason);
        }
        _ => return Err(unhandled(cx)),
    }
    let audit = cx.audit(EntityType::Certificate, next.certificate_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "certificate_id": next.certificate_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
    }))
    .write(EntityWrite::Update(EntityRow::Certificate(next)))
    .audit(audit))
}

pub(crate) fn certificate_json(c: &CertificateRecord) -> Value {
    json!({
        "certificate_id": c.certificate_id.as_str(),
        "name": c.name,
        "issuing_authority": c.issuing_authority,
        "certificate_number": opt_str(&c.certificate_number),
        "expires_on": c.expires_on.to_string(),
        "status": c.status.as_str(),
        "suspension_reason": opt_str(&c.suspension_reason),
        "revocation_reason": opt_str(&c.revocation_reason),
        "created_by": c.created_by.as_str(),
        "created_at": c.created_at.0,
        "updated_at": c.updated_at.0,
    })
}
