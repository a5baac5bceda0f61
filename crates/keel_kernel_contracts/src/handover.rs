#![forbid(unsafe_code)]

use crate::action::EntityType;
use crate::audit::SignatureRecord;
use crate::common::{validate_id, validate_opt_text, validate_text, validated_id};
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(HandoverDraftId, "draft_id", 64);
validated_id!(HandoverExportId, "export_id", 64);
validated_id!(HandoverItemId, "item_id", 64);

pub const ADD_HANDOVER_ITEM: &str = "add_handover_item";
pub const FINALIZE_HANDOVER: &str = "finalize_handover";
pub const EXPORT_HANDOVER: &str = "export_handover";
pub const SIGN_HANDOVER_OUTGOING: &str = "sign_handover_outgoing";
pub const SIGN_HANDOVER_INCOMING: &str = "sign_handover_incoming";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoverDraftStatus {
    Open,
    Finalized,
    Exported,
}

#[rustfmt::skip]
const DRAFT_TRANSITIONS: &[Transition<HandoverDraftStatus>] = &[
    Transition { from: HandoverDraftStatus::Open, action: ADD_HANDOVER_ITEM, to: HandoverDraftStatus::Open },
    Transition { from: HandoverDraftStatus::Open, action: FINALIZE_HANDOVER, to: HandoverDraftStatus::Finalized },
    Transition { from: HandoverDraftStatus::Finalized, action: EXPORT_HANDOVER, to: HandoverDraftStatus::Exported },
];

impl Lifecycle for HandoverDraftStatus {
    const ENTITY: EntityType = EntityType::HandoverDraft;

    fn as_str(self) -> &'static str {
        match self {
            HandoverDraftStatus::Open => "open",
            HandoverDraftStatus::Finalized => "finalized",
            HandoverDraftStatus::Exported => "exported",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        DRAFT_TRANSITIONS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoverExportStatus {
    PendingOutgoing,
    PendingIncoming,
    Completed,
}

#[rustfmt::skip]
const EXPORT_TRANSITIONS: &[Transition<HandoverExportStatus>] = &[
    Transition { from: HandoverExportStatus::PendingOutgoing, action: SIGN_HANDOVER_OUTGOING, to: HandoverExportStatus::PendingIncoming },
    Transition { from: HandoverExportStatus::PendingIncoming, action: SIGN_HANDOVER_INCOMING, to: HandoverExportStatus::Completed },
];

impl Lifecycle for HandoverExportStatus {
    const ENTITY: EntityType = EntityType::HandoverExport;

    fn as_str(self) -> &'static str {
        match self {
            HandoverExportStatus::PendingOutgoing => "pending_outgoing",
            HandoverExportStatus::PendingIncoming => "pending_incoming",
            HandoverExportStatus::Completed => "completed",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        EXPORT_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverItem {
    pub item_id: HandoverItemId,
    pub summary: String,
    pub detail: Option<String>,
    pub is_critical: bool,
    /// Free-form reference to another entity, e.g. `fault:flt_000001`.
    pub entity_ref: Option<String>,
    pub added_by: UserId,
    pub added_at: MonotonicTimeNs,
}

impl Validate for HandoverItem {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.item_id.validate()?;
        validate_text("handover_item.summary", &self.summary, 500)?;
        validate_opt_text("handover_item.detail", &self.detail, 4_000)?;
        if let Some(r) = &self.entity_ref {
            validate_id("handover_item.entity_ref", r, 160)?;
        }
        self.added_by.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverDraftRecord {
    pub yacht_id: YachtId,
    pub draft_id: HandoverDraftId,
    pub title: String,
    pub items: Vec<HandoverItem>,
    pub status: HandoverDraftStatus,
    pub created_by: UserId,
    pub content_hash: Option<String>,
    pub finalized_at: Option<MonotonicTimeNs>,
    pub finalized_by: Option<UserId>,
    pub export_id: Option<HandoverExportId>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl HandoverDraftRecord {
    pub fn has_critical_items(&self) -> bool {
        self.items.iter().any(|i| i.is_critical)
    }
}

impl Validate for HandoverDraftRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.draft_id.validate()?;
        validate_text("handover_draft.title", &self.title, 200)?;
        if self.items.len() > 1_000 {
            return Err(ContractViolation::InvalidValue {
                field: "handover_draft.items",
                reason: "must be <= 1000 items",
            });
        }
        for i in &self.items {
            i.validate()?;
        }
        self.created_by.validate()?;
        let sealed = self.status != HandoverDraftStatus::Open;
        if sealed != self.content_hash.is_some() || sealed != self.finalized_at.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "handover_draft.content_hash",
                reason: "must be set exactly once the draft is finalized",
            });
        }
        if let Some(h) = &self.content_hash {
            validate_sha256_hex("handover_draft.content_hash", h)?;
        }
        if (self.status == HandoverDraftStatus::Exported) != self.export_id.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "handover_draft.export_id",
                reason: "must be set exactly when the draft is exported",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverExportRecord {
    pub yacht_id: YachtId,
    pub export_id: HandoverExportId,
    pub draft_id: HandoverDraftId,
    pub content_hash: String,
    pub document_hash: String,
    pub document_ref: String,
    pub has_critical_items: bool,
    pub status: HandoverExportStatus,
    pub outgoing_signature: Option<SignatureRecord>,
    pub incoming_signature: Option<SignatureRecord>,
    pub critical_acknowledged: bool,
    pub signoff_complete: bool,
    pub exported_by: UserId,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for HandoverExportRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.export_id.validate()?;
        self.draft_id.validate()?;
        validate_sha256_hex("handover_export.content_hash", &self.content_hash)?;
        validate_sha256_hex("handover_export.document_hash", &self.document_hash)?;
        validate_text("handover_export.document_ref", &self.document_ref, 256)?;
        self.exported_by.validate()?;
        if let Some(s) = &self.outgoing_signature {
            s.validate()?;
        }
        if let Some(s) = &self.incoming_signature {
            s.validate()?;
        }
        if (self.status == HandoverExportStatus::Completed) != self.signoff_complete {
            return Err(ContractViolation::InvalidValue {
                field: "handover_export.signoff_complete",
                reason: "must be true exactly when the export is completed",
            });
        }
        if self.signoff_complete && self.has_critical_items && !self.critical_acknowledged {
            return Err(ContractViolation::InvalidValue {
                field: "handover_export.critical_acknowledged",
                reason: "critical items must be acknowledged before completion",
            });
        }
        Ok(())
    }
}

pub fn validate_sha256_hex(field: &'static str, value: &str) -> Result<(), ContractViolation> {
    if value.len() != 64 || !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be 64 lowercase hex chars",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{is_legal, transition};

    #[test]
    fn at_handover_01_export_only_after_finalize() {
        assert!(!is_legal(HandoverDraftStatus::Open, EXPORT_HANDOVER));
        assert!(!is_legal(HandoverDraftStatus::Finalized, FINALIZE_HANDOVER));
        assert!(!is_legal(HandoverDraftStatus::Finalized, ADD_HANDOVER_ITEM));
        assert_eq!(
            transition(HandoverDraftStatus::Finalized, EXPORT_HANDOVER).unwrap(),
            HandoverDraftStatus::Exported
        );
    }

    #[test]
    fn at_handover_02_incoming_signature_requires_outgoing_first() {
        assert!(!is_legal(HandoverExportStatus::PendingOutgoing, SIGN_HANDOVER_INCOMING));
        assert!(is_legal(HandoverExportStatus::PendingIncoming, SIGN_HANDOVER_INCOMING));
        assert!(HandoverExportStatus::Completed.is_terminal());
    }

    #[test]
    fn at_handover_03_sha256_hex_is_lowercase_64() {
        assert!(validate_sha256_hex("h", &"a".repeat(64)).is_ok());
        assert!(validate_sha256_hex("h", &"A".repeat(64)).is_err());
        assert!(validate_sha256_hex("h", "abc").is_err());
    }
}
