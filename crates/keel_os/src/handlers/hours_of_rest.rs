#![forbid(unsafe_code)]

//! Daily rest records, low-rest warnings and the three-signature monthly sign-off.

use keel_engines::handover_digest::{sha256_hex, signature_hash};
use keel_engines::rest_compliance::{is_compliant, summarize_month, MIN_DAILY_REST_HOURS};
use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::{AuditValues, SignatureRecord};
use keel_kernel_contracts::hours_of_rest::{
    HoursOfRestRecord, MonthlySignoffId, MonthlySignoffRecord, RestRecordId, RestWarningId,
    RestWarningRecord, RestWarningStatus, SignoffStatus, ACKNOWLEDGE_REST_WARNING,
    CAPTAIN_FINALIZE_MONTHLY_SIGNOFF, CREW_SIGN_MONTHLY_SIGNOFF, DISMISS_REST_WARNING,
    HOD_SIGN_MONTHLY_SIGNOFF,
};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Value};

use super::{opt_str, signature_json, status_change, unhandled, HandlerContext, MutationPlan};
use crate::error::ActionError;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "record_hours_of_rest" => record(cx, p),
        ACKNOWLEDGE_REST_WARNING | DISMISS_REST_WARNING => change_warning(cx, p),
        "create_monthly_signoff" => create_signoff(cx, p),
        CREW_SIGN_MONTHLY_SIGNOFF | HOD_SIGN_MONTHLY_SIGNOFF | CAPTAIN_FINALIZE_MONTHLY_SIGNOFF => {
            sign(cx, p)
        }
        _ => Err(unhandled(cx)),
    }
}

pub fn read(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<Value, ActionError> {
    let s = load_signoff(cx, p)?;
    let records: Vec<Value> = p
        .rest_records_for_month(&s.user_id, s.month)
        .into_iter()
        .map(record_json)
        .collect();
    Ok(json!({
        "signoff": signoff_json(s),
        "records": records,
    }))
}

fn load_signoff<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p MonthlySignoffRecord, ActionError> {
    let id = cx.payload.entity_id("signoff_id")?;
    MonthlySignoffId::new(id.as_str())
        .ok()
        .and_then(|sid| p.monthly_signoff(&sid))
        .ok_or_else(|| ActionError::not_found("monthly_signoff", &id))
}

fn record(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let user = cx.actor();
    let record_date = cx.payload.date("record_date")?;
    let rest_hours = cx.payload.rest_hours("rest_hours")?;
    let notes = cx.payload.opt_text("notes")?;

    if let Some(s) = p.signoff_for_month(user, record_date.month()) {
        if s.status != SignoffStatus::Draft {
            return Err(ActionError::InvalidTransition(format!(
                "rest records for {} are locked by sign-off '{}' ({})",
                s.month,
                s.signoff_id,
                s.status.as_str()
            )));
        }
    }

    let compliant = is_compliant(rest_hours);
    let existing = p.rest_record_for_day(user, record_date);
    let (row, old, created) = match existing {
        Some(prev) => {
            let mut next = prev.clone();
            next.rest_hours = rest_hours;
            next.is_compliant = compliant;
            next.notes = notes;
            next.updated_at = cx.now();
            let old = AuditValues::new()
                .with("rest_hours", prev.rest_hours.to_string())?
                .with("is_compliant", prev.is_compliant.to_string())?;
            (next, old, false)
        }
        None => (
            HoursOfRestRecord {
                yacht_id: cx.request.yacht_id().clone(),
                record_id: RestRecordId::new(cx.ids().next("hor"))?,
                user_id: user.clone(),
                record_date,
                rest_hours,
                is_compliant: compliant,
                notes,
                created_at: cx.now(),
                updated_at: cx.now(),
            },
            AuditValues::new(),
            true,
        ),
    };
    let new = AuditValues::new()
        .with("record_date", record_date.to_string())?
        .with("rest_hours", rest_hours.to_string())?
        .with("is_compliant", compliant.to_string())?;
    let record_audit = cx.audit(EntityType::HoursOfRestRecord, row.record_id.as_str(), old, new)?;

    let open_warning = existing.is_some()
        && p.rest_warnings_for_record(&row.record_id)
            .iter()
            .any(|w| w.status == RestWarningStatus::Active);
    let warning = if !compliant && !open_warning {
        Some(RestWarningRecord {
            yacht_id: cx.request.yacht_id().clone(),
            warning_id: RestWarningId::new(cx.ids().next("rwn"))?,
            user_id: user.clone(),
            record_id: row.record_id.clone(),
            record_date,
            rest_hours,
            status: RestWarningStatus::Active,
            dismissal_reason: None,
            created_at: cx.now(),
            updated_at: cx.now(),
        })
    } else {
        None
    };

    let mut plan = MutationPlan::new(json!({
        "record_id": row.record_id.as_str(),
        "record_date": record_date.to_string(),
        "rest_hours": rest_hours.to_string(),
        "is_compliant": compliant,
        "minimum_rest_hours": MIN_DAILY_REST_HOURS.to_string(),
        "warning_id": opt_str(&warning.as_ref().map(|w| w.warning_id.as_str())),
    }));
    if created {
        plan = plan
            .created()
            .write(EntityWrite::Insert(EntityRow::RestRecord(row)));
    } else {
        plan = plan.write(EntityWrite::Update(EntityRow::RestRecord(row)));
    }
    plan = plan.audit(record_audit);
    if let Some(w) = warning {
        let audit = cx.audit(
            EntityType::RestWarning,
            w.warning_id.as_str(),
            AuditValues::new(),
            AuditValues::new()
                .with("status", w.status.as_str())?
                .with("record_id", w.record_id.as_str())?
                .with("rest_hours", w.rest_hours.to_string())?,
        )?;
        plan = plan
            .write(EntityWrite::Insert(EntityRow::RestWarning(w)))
            .audit(audit);
    }
    Ok(plan)
}

fn change_warning(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let id = cx.payload.entity_id("warning_id")?;
    let current = RestWarningId::new(id.as_str())
        .ok()
        .and_then(|wid| p.rest_warning(&wid))
        .ok_or_else(|| ActionError::not_found("rest_warning", &id))?;
    let to = transition(current.status, cx.action())?;
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();
    let (old, mut new) = status_change(current.status, to)?;
    if cx.action() == DISMISS_REST_WARNING {
        let reason = cx.payload.text("reason")?;
        new.insert("dismissal_reason", reason.as_str())?;
        next.dismissal_reason = Some(reason);
    }
    let audit = cx.audit(EntityType::RestWarning, next.warning_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "warning_id": next.warning_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
    }))
    .write(EntityWrite::Update(EntityRow::RestWarning(next)))
    .audit(audit))
}

fn create_signoff(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let user = cx.actor();
    let month = cx.payload.month("month")?;
    if let Some(existing) = p.signoff_for_month(user, month) {
        return Err(ActionError::Validation(format!(
            "a monthly sign-off for {month} already exists: '{}'",
            existing.signoff_id
        )));
    }
    let summary = summarize_month(month, p.rest_records_for_month(user, month));
    let signoff = MonthlySignoffRecord {
        yacht_id: cx.request.yacht_id().clone(),
        signoff_id: MonthlySignoffId::new(cx.ids().next("sgn"))?,
        user_id: user.clone(),
        month,
        total_rest_hours: summary.total_rest_hours,
        recorded_days: summary.recorded_days,
        non_compliant_days: summary.non_compliant_days,
        status: SignoffStatus::Draft,
        crew_signature: None,
        hod_signature: None,
        captain_signature: None,
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::MonthlySignoff,
        signoff.signoff_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", signoff.status.as_str())?
            .with("month", month.to_string())?
            .with("total_rest_hours", summary.total_rest_hours.to_string())?
            .with("recorded_days", summary.recorded_days.to_string())?
            .with("non_compliant_days", summary.non_compliant_days.to_string())?,
    )?;
    Ok(MutationPlan::new(json!({
        "signoff_id": signoff.signoff_id.as_str(),
        "month": month.to_string(),
        "status": signoff.status.as_str(),
        "total_rest_hours": summary.total_rest_hours.to_string(),
        "recorded_days": summary.recorded_days,
        "non_compliant_days": summary.non_compliant_days,
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::MonthlySignoff(signoff)))
    .audit(audit))
}

fn summary_digest(s: &MonthlySignoffRecord) -> String {
    sha256_hex(
        format!(
            "{}|{}|{}|{}|{}",
            s.signoff_id, s.month, s.total_rest_hours, s.recorded_days, s.non_compliant_days
        )
        .as_bytes(),
    )
}

/// Each signature chains onto the previous one so a later signer covers every earlier signature.
fn sign(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load_signoff(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let input = cx.payload.signature("signature")?;

    let mut next = current.clone();
    if cx.action() == CREW_SIGN_MONTHLY_SIGNOFF {
        let summary =
            summarize_month(current.month, p.rest_records_for_month(&current.user_id, current.month));
        next.total_rest_hours = summary.total_rest_hours;
        next.recorded_days = summary.recorded_days;
        next.non_compliant_days = summary.non_compliant_days;
    }
    let digest = summary_digest(&next);
    let previous = next
        .hod_signature
        .as_ref()
        .or(next.crew_signature.as_ref())
        .map(|s| s.signature_hash.clone())
        .unwrap_or_else(|| digest.clone());
    let record = SignatureRecord {
        user_id: cx.actor().clone(),
        role: cx.request.role(),
        signer_name: input.signer_name,
        signed_at: cx.now(),
        signature_hash: signature_hash(&digest, &previous, cx.actor(), cx.now(), &input.bytes),
    };
    match cx.action() {
        CREW_SIGN_MONTHLY_SIGNOFF => next.crew_signature = Some(record.clone()),
        HOD_SIGN_MONTHLY_SIGNOFF => next.hod_signature = Some(record.clone()),
        CAPTAIN_FINALIZE_MONTHLY_SIGNOFF => next.captain_signature = Some(record.clone()),
        _ => return Err(unhandled(cx)),
    }
    next.status = to;
    next.updated_at = cx.now();

    let (old, mut new) = status_change(current.status, to)?;
    new.insert("summary_digest", digest.as_str())?;
    new.insert("total_rest_hours", next.total_rest_hours.to_string())?;
    new.insert("non_compliant_days", next.non_compliant_days.to_string())?;
    let audit = cx.audit_signed(
        EntityType::MonthlySignoff,
        next.signoff_id.as_str(),
        old,
        new,
        Some(record.clone()),
    )?;
    Ok(MutationPlan::new(json!({
        "signoff_id": next.signoff_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
        "signature_hash": record.signature_hash,
        "summary_digest": digest,
    }))
    .write(EntityWrite::Update(EntityRow::MonthlySignoff(next)))
    .audit(audit))
}

fn record_json(r: &HoursOfRestRecord) -> Value {
    json!({
        "record_id": r.record_id.as_str(),
        "record_date": r.record_date.to_string(),
        "rest_hours": r.rest_hours.to_string(),
        "is_compliant": r.is_compliant,
        "notes": opt_str(&r.notes),
    })
}

pub(crate) fn signoff_json(s: &MonthlySignoffRecord) -> Value {
    json!({
        "signoff_id": s.signoff_id.as_str(),
        "user_id": s.user_id.as_str(),
        "month": s.month.to_string(),
        "status": s.status.as_str(),
        "total_rest_hours": s.total_rest_hours.to_string(),
        "recorded_days": s.recorded_days,
        "non_compliant_days": s.non_compliant_days,
        "crew_signature": signature_json(&s.crew_signature),
        "hod_signature": signature_json(&s.hod_signature),
        "captain_signature": signature_json(&s.captain_signature),
        "created_at": s.created_at.0,
        "updated_at": s.updated_at.0,
    })
}
