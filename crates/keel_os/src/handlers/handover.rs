#![forbid(unsafe_code)]

//! Handover drafts, sealed exports and the outgoing/incoming signature pair.
//!
//! A draft's `content_hash` is fixed at finalize. Export re-derives it from the stored items and
//! refuses to continue on mismatch; nothing downstream ever recomputes it silently.

use keel_engines::handover_digest::{
    content_hash, document_hash, render_document, sha256_hex, signature_hash,
};
use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::{AuditValues, SignatureRecord};
use keel_kernel_contracts::handover::{
    HandoverDraftId, HandoverDraftRecord, HandoverDraftStatus, HandoverExportId,
    HandoverExportRecord, HandoverExportStatus, HandoverItem, HandoverItemId, ADD_HANDOVER_ITEM,
    EXPORT_HANDOVER, FINALIZE_HANDOVER, SIGN_HANDOVER_INCOMING, SIGN_HANDOVER_OUTGOING,
};
use keel_kernel_contracts::lifecycle::{transition, Lifecycle};
use keel_storage::{EntityRow, EntityWrite, TenantPartition};
use serde_json::{json, Map, Value};

use super::{
    into_map, signature_json, status_change, unhandled, DocumentPut, HandlerContext, MutationPlan,
};
use crate::error::ActionError;

const MAX_ITEMS: usize = 1_000;

pub fn plan(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    match cx.action() {
        "create_handover_draft" => create_draft(cx),
        ADD_HANDOVER_ITEM => add_item(cx, p),
        FINALIZE_HANDOVER => finalize(cx, p),
        EXPORT_HANDOVER => export(cx, p),
        SIGN_HANDOVER_OUTGOING | SIGN_HANDOVER_INCOMING => sign(cx, p),
        _ => Err(unhandled(cx)),
    }
}

/// Stored export state plus the content check, waiting on the stored document bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingVerification {
    document_ref: String,
    document_hash: String,
    content_matches: bool,
    view: Map<String, Value>,
}

impl PendingVerification {
    pub fn document_ref(&self) -> &str {
        &self.document_ref
    }

    pub fn finish(self, stored_document: Option<&[u8]>) -> Map<String, Value> {
        let document_matches = stored_document
            .map(|bytes| sha256_hex(bytes) == self.document_hash)
            .unwrap_or(false);
        let mut view = self.view;
        view.insert("document_present".to_string(), json!(stored_document.is_some()));
        view.insert(
            "verified".to_string(),
            json!(self.content_matches && document_matches),
        );
        view
    }
}

/// `verify_handover_export`: stored hashes and signatures plus a fresh content check. The document
/// half of the check runs in [`PendingVerification::finish`].
pub fn read(
    cx: &HandlerContext<'_>,
    p: &TenantPartition,
) -> Result<PendingVerification, ActionError> {
    let export = load_export(cx, p)?;
    let draft = p
        .handover_draft(&export.draft_id)
        .ok_or_else(|| ActionError::Internal(format!("export '{}' has no draft", export.export_id)))?;
    let content_matches = content_hash(&draft.items) == export.content_hash
        && draft.content_hash.as_deref() == Some(export.content_hash.as_str());
    Ok(PendingVerification {
        document_ref: export.document_ref.clone(),
        document_hash: export.document_hash.clone(),
        content_matches,
        view: into_map(json!({
            "export_id": export.export_id.as_str(),
            "draft_id": export.draft_id.as_str(),
            "status": export.status.as_str(),
            "content_hash": export.content_hash,
            "document_hash": export.document_hash,
            "document_ref": export.document_ref,
            "has_critical_items": export.has_critical_items,
            "critical_acknowledged": export.critical_acknowledged,
            "signoff_complete": export.signoff_complete,
            "outgoing_signature": signature_json(&export.outgoing_signature),
            "incoming_signature": signature_json(&export.incoming_signature),
        })),
    })
}

fn load_draft<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p HandoverDraftRecord, ActionError> {
    let id = cx.payload.entity_id("draft_id")?;
    HandoverDraftId::new(id.as_str())
        .ok()
        .and_then(|did| p.handover_draft(&did))
        .ok_or_else(|| ActionError::not_found("handover_draft", &id))
}

fn load_export<'p>(
    cx: &HandlerContext<'_>,
    p: &'p TenantPartition,
) -> Result<&'p HandoverExportRecord, ActionError> {
    let id = cx.payload.entity_id("export_id")?;
    HandoverExportId::new(id.as_str())
        .ok()
        .and_then(|eid| p.handover_export(&eid))
        .ok_or_else(|| ActionError::not_found("handover_export", &id))
}

fn create_draft(cx: &HandlerContext<'_>) -> Result<MutationPlan, ActionError> {
    let draft = HandoverDraftRecord {
        yacht_id: cx.request.yacht_id().clone(),
        draft_id: HandoverDraftId::new(cx.ids().next("hod"))?,
        title: cx.payload.text("title")?,
        items: Vec::new(),
        status: HandoverDraftStatus::Open,
        created_by: cx.actor().clone(),
        content_hash: None,
        finalized_at: None,
        finalized_by: None,
        export_id: None,
        created_at: cx.now(),
        updated_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::HandoverDraft,
        draft.draft_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", draft.status.as_str())?
            .with("title", draft.title.as_str())?,
    )?;
    Ok(MutationPlan::new(json!({
        "draft_id": draft.draft_id.as_str(),
        "status": draft.status.as_str(),
    }))
    .created()
    .write(EntityWrite::Insert(EntityRow::HandoverDraft(draft)))
    .audit(audit))
}

fn add_item(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load_draft(cx, p)?;
    transition(current.status, cx.action())?;
    if current.items.len() >= MAX_ITEMS {
        return Err(ActionError::Validation(format!(
            "handover draft '{}' already holds {MAX_ITEMS} items",
            current.draft_id
        )));
    }
    let item = HandoverItem {
        item_id: HandoverItemId::new(cx.ids().next("hoi"))?,
        summary: cx.payload.text("summary")?,
        detail: cx.payload.opt_text("detail")?,
        is_critical: cx.payload.flag("is_critical")?,
        entity_ref: cx.payload.opt_text("entity_ref")?,
        added_by: cx.actor().clone(),
        added_at: cx.now(),
    };
    let audit = cx.audit(
        EntityType::HandoverDraft,
        current.draft_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("item_id", item.item_id.as_str())?
            .with("summary", item.summary.as_str())?
            .with("is_critical", item.is_critical.to_string())?
            .with_opt("entity_ref", item.entity_ref.as_deref())?,
    )?;
    let mut next = current.clone();
    let item_id = item.item_id.as_str().to_string();
    let is_critical = item.is_critical;
    next.items.push(item);
    next.updated_at = cx.now();
    Ok(MutationPlan::new(json!({
        "draft_id": next.draft_id.as_str(),
        "item_id": item_id,
        "is_critical": is_critical,
        "item_count": next.items.len(),
    }))
    .write(EntityWrite::Update(EntityRow::HandoverDraft(next)))
    .audit(audit))
}

fn finalize(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load_draft(cx, p)?;
    let to = transition(current.status, cx.action())?;
    if current.items.is_empty() {
        return Err(ActionError::Validation(format!(
            "handover draft '{}' has no items to finalize",
            current.draft_id
        )));
    }
    let hash = content_hash(&current.items);
    let mut next = current.clone();
    next.status = to;
    next.content_hash = Some(hash.clone());
    next.finalized_at = Some(cx.now());
    next.finalized_by = Some(cx.actor().clone());
    next.updated_at = cx.now();
    let (old, mut new) = status_change(current.status, to)?;
    new.insert("content_hash", hash.as_str())?;
    new.insert("item_count", next.items.len().to_string())?;
    let audit = cx.audit(EntityType::HandoverDraft, next.draft_id.as_str(), old, new)?;
    Ok(MutationPlan::new(json!({
        "draft_id": next.draft_id.as_str(),
        "status": to.as_str(),
        "content_hash": hash,
        "item_count": next.items.len(),
        "has_critical_items": next.has_critical_items(),
    }))
    .write(EntityWrite::Update(EntityRow::HandoverDraft(next)))
    .audit(audit))
}

fn export(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load_draft(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let recomputed = content_hash(&current.items);
    let sealed = current.content_hash.as_deref().unwrap_or_default();
    if recomputed != sealed {
        return Err(ActionError::IntegrityFailure(format!(
            "handover draft '{}' content hash mismatch: sealed {sealed}, recomputed {recomputed}",
            current.draft_id
        )));
    }

    let export_id = HandoverExportId::new(cx.ids().next("hex"))?;
    let document = render_document(current, &recomputed, cx.actor(), cx.now());
    let doc_hash = document_hash(&document);
    let document_ref = format!("handover/{}/{}.txt", cx.request.yacht_id(), export_id);
    let export = HandoverExportRecord {
        yacht_id: cx.request.yacht_id().clone(),
        export_id: export_id.clone(),
        draft_id: current.draft_id.clone(),
        content_hash: recomputed.clone(),
        document_hash: doc_hash.clone(),
        document_ref: document_ref.clone(),
        has_critical_items: current.has_critical_items(),
        status: HandoverExportStatus::PendingOutgoing,
        outgoing_signature: None,
        incoming_signature: None,
        critical_acknowledged: false,
        signoff_complete: false,
        exported_by: cx.actor().clone(),
        created_at: cx.now(),
        updated_at: cx.now(),
    };

    let mut next = current.clone();
    next.status = to;
    next.export_id = Some(export_id.clone());
    next.updated_at = cx.now();

    let (old, mut new) = status_change(current.status, to)?;
    new.insert("export_id", export_id.as_str())?;
    let draft_audit = cx.audit(EntityType::HandoverDraft, next.draft_id.as_str(), old, new)?;
    let export_audit = cx.audit(
        EntityType::HandoverExport,
        export_id.as_str(),
        AuditValues::new(),
        AuditValues::new()
            .with("status", export.status.as_str())?
            .with("content_hash", recomputed.as_str())?
            .with("document_hash", doc_hash.as_str())?
            .with("document_ref", document_ref.as_str())?,
    )?;

    Ok(MutationPlan::new(json!({
        "export_id": export_id.as_str(),
        "draft_id": next.draft_id.as_str(),
        "status": export.status.as_str(),
        "content_hash": recomputed,
        "document_hash": doc_hash,
        "document_ref": document_ref,
        "has_critical_items": export.has_critical_items,
    }))
    .created()
    .write(EntityWrite::Update(EntityRow::HandoverDraft(next)))
    .write(EntityWrite::Insert(EntityRow::HandoverExport(export)))
    .audit(draft_audit)
    .audit(export_audit)
    .document(DocumentPut {
        document_ref,
        body: document,
    }))
}

fn sign(cx: &HandlerContext<'_>, p: &TenantPartition) -> Result<MutationPlan, ActionError> {
    let current = load_export(cx, p)?;
    let to = transition(current.status, cx.action())?;
    let input = cx.payload.signature("signature")?;
    let incoming = cx.action() == SIGN_HANDOVER_INCOMING;

    // Distinct signers are enforced by `precondition`; acknowledgement depends on the payload.
    if incoming && current.has_critical_items && !cx.payload.flag("acknowledge_critical")? {
        return Err(ActionError::Validation(
            "export has critical items: acknowledge_critical=true is required".to_string(),
        ));
    }

    let record = SignatureRecord {
        user_id: cx.actor().clone(),
        role: cx.request.role(),
        signer_name: input.signer_name,
        signed_at: cx.now(),
        signature_hash: signature_hash(
            &current.document_hash,
            &current.content_hash,
            cx.actor(),
            cx.now(),
            &input.bytes,
        ),
    };
    let mut next = current.clone();
    next.status = to;
    next.updated_at = cx.now();
    let (old, mut new) = status_change(current.status, to)?;
    if incoming {
        next.incoming_signature = Some(record.clone());
        next.critical_acknowledged = current.has_critical_items;
        next.signoff_complete = true;
        new.insert("signoff_complete", "true")?;
        if current.has_critical_items {
            new.insert("critical_acknowledged", "true")?;
        }
    } else {
        next.outgoing_signature = Some(record.clone());
    }
    let audit = cx.audit_signed(
        EntityType::HandoverExport,
        next.export_id.as_str(),
        old,
        new,
        Some(record.clone()),
    )?;
    Ok(MutationPlan::new(json!({
        "export_id": next.export_id.as_str(),
        "previous_status": current.status.as_str(),
        "status": to.as_str(),
        "signature_hash": record.signature_hash,
        "signoff_complete": next.signoff_complete,
        "critical_acknowledged": next.critical_acknowledged,
        "document_ref": next.document_ref.as_str(),
    }))
    .write(EntityWrite::Update(EntityRow::HandoverExport(next)))
    .audit(audit))
}
