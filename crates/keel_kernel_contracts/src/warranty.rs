#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::action::EntityType;
use crate::common::{validate_opt_text, validate_text, validated_id};
use crate::inventory::PartId;
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(WarrantyClaimId, "claim_id", 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarrantyStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Closed,
}

pub const SUBMIT_WARRANTY_CLAIM: &str = "submit_warranty_claim";
pub const APPROVE_WARRANTY_CLAIM: &str = "approve_warranty_claim";
pub const REJECT_WARRANTY_CLAIM: &str = "reject_warranty_claim";
pub const CLOSE_WARRANTY_CLAIM: &str = "close_warranty_claim";

#[rustfmt::skip]
const WARRANTY_TRANSITIONS: &[Transition<WarrantyStatus>] = &[
    Transition { from: WarrantyStatus::Draft, action: SUBMIT_WARRANTY_CLAIM, to: WarrantyStatus::Submitted },
    Transition { from: WarrantyStatus::Submitted, action: APPROVE_WARRANTY_CLAIM, to: WarrantyStatus::Approved },
    Transition { from: WarrantyStatus::Submitted, action: REJECT_WARRANTY_CLAIM, to: WarrantyStatus::Rejected },
    Transition { from: WarrantyStatus::Approved, action: CLOSE_WARRANTY_CLAIM, to: WarrantyStatus::Closed },
    Transition { from: WarrantyStatus::Rejected, action: CLOSE_WARRANTY_CLAIM, to: WarrantyStatus::Closed },
];

impl Lifecycle for WarrantyStatus {
    const ENTITY: EntityType = EntityType::WarrantyClaim;

    fn as_str(self) -> &'static str {
        match self {
            WarrantyStatus::Draft => "draft",
            WarrantyStatus::Submitted => "submitted",
            WarrantyStatus::Approved => "approved",
            WarrantyStatus::Rejected => "rejected",
            WarrantyStatus::Closed => "closed",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        WARRANTY_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarrantyClaimRecord {
    pub yacht_id: YachtId,
    pub claim_id: WarrantyClaimId,
    pub title: String,
    pub description: String,
    pub part_id: Option<PartId>,
    pub equipment_id: Option<String>,
    pub claimed_amount: Option<Decimal>,
    pub status: WarrantyStatus,
    pub created_by: UserId,
    pub decided_by: Option<UserId>,
    pub decision_notes: Option<String>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for WarrantyClaimRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.claim_id.validate()?;
        validate_text("warranty_claim.title", &self.title, 200)?;
        validate_text("warranty_claim.description", &self.description, 4_000)?;
        if let Some(p) = &self.part_id {
            p.validate()?;
        }
        validate_opt_text("warranty_claim.equipment_id", &self.equipment_id, 128)?;
        if let Some(a) = self.claimed_amount {
            if a.is_sign_negative() {
                return Err(ContractViolation::InvalidValue {
                    field: "warranty_claim.claimed_amount",
                    reason: "must be >= 0",
                });
            }
        }
        self.created_by.validate()?;
        validate_opt_text("warranty_claim.decision_notes", &self.decision_notes, 4_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{is_legal, legal_actions};

    #[test]
    fn at_warranty_01_decision_only_after_submission() {
        assert!(!is_legal(WarrantyStatus::Draft, APPROVE_WARRANTY_CLAIM));
        assert_eq!(
            legal_actions(WarrantyStatus::Submitted),
            vec![APPROVE_WARRANTY_CLAIM, REJECT_WARRANTY_CLAIM]
        );
        assert!(is_legal(WarrantyStatus::Rejected, CLOSE_WARRANTY_CLAIM));
        assert!(WarrantyStatus::Closed.is_terminal());
    }
}
