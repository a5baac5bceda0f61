#![forbid(unsafe_code)]

use crate::action::EntityType;
use crate::common::{validate_opt_text, validate_text, validated_id};
use crate::inventory::PartId;
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(ShoppingListItemId, "item_id", 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShoppingUrgency {
    Low,
    Normal,
    Urgent,
}

impl ShoppingUrgency {
    pub fn as_str(self) -> &'static str {
        match self {
            ShoppingUrgency::Low => "low",
            ShoppingUrgency::Normal => "normal",
            ShoppingUrgency::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        match s {
            "low" => Ok(ShoppingUrgency::Low),
            "normal" => Ok(ShoppingUrgency::Normal),
            "urgent" => Ok(ShoppingUrgency::Urgent),
            _ => Err(ContractViolation::InvalidValue {
                field: "urgency",
                reason: "must be one of low|normal|urgent",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShoppingListStatus {
    Candidate,
    Approved,
    Rejected,
    Promoted,
}

pub const APPROVE_SHOPPING_LIST_ITEM: &str = "approve_shopping_list_item";
pub const REJECT_SHOPPING_LIST_ITEM: &str = "reject_shopping_list_item";
pub const PROMOTE_CANDIDATE_TO_PART: &str = "promote_candidate_to_part";

#[rustfmt::skip]
const SHOPPING_LIST_TRANSITIONS: &[Transition<ShoppingListStatus>] = &[
    Transition { from: ShoppingListStatus::Candidate, action: APPROVE_SHOPPING_LIST_ITEM, to: ShoppingListStatus::Approved },
    Transition { from: ShoppingListStatus::Candidate, action: REJECT_SHOPPING_LIST_ITEM, to: ShoppingListStatus::Rejected },
    Transition { from: ShoppingListStatus::Approved, action: PROMOTE_CANDIDATE_TO_PART, to: ShoppingListStatus::Promoted },
];

impl Lifecycle for ShoppingListStatus {
    const ENTITY: EntityType = EntityType::ShoppingListItem;

    fn as_str(self) -> &'static str {
        match self {
            ShoppingListStatus::Candidate => "candidate",
            ShoppingListStatus::Approved => "approved",
            ShoppingListStatus::Rejected => "rejected",
            ShoppingListStatus::Promoted => "promoted",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        SHOPPING_LIST_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItemRecord {
    pub yacht_id: YachtId,
    pub item_id: ShoppingListItemId,
    pub part_name: String,
    pub part_number: Option<String>,
    pub quantity: u64,
    pub unit: String,
    pub urgency: ShoppingUrgency,
    pub status: ShoppingListStatus,
    pub requested_by: UserId,
    pub decided_by: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub promoted_part_id: Option<PartId>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for ShoppingListItemRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.item_id.validate()?;
        validate_text("shopping_list_item.part_name", &self.part_name, 200)?;
        validate_opt_text("shopping_list_item.part_number", &self.part_number, 64)?;
        if self.quantity == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "shopping_list_item.quantity",
                reason: "must be > 0",
            });
        }
        validate_text("shopping_list_item.unit", &self.unit, 32)?;
        self.requested_by.validate()?;
        validate_opt_text(
            "shopping_list_item.rejection_reason",
            &self.rejection_reason,
            1_000,
        )?;
        if (self.status == ShoppingListStatus::Promoted) != self.promoted_part_id.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "shopping_list_item.promoted_part_id",
                reason: "must be set exactly when the item is promoted",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::is_legal;

    #[test]
    fn at_shopping_01_promotion_requires_approval() {
        assert!(!is_legal(ShoppingListStatus::Candidate, PROMOTE_CANDIDATE_TO_PART));
        assert!(is_legal(ShoppingListStatus::Approved, PROMOTE_CANDIDATE_TO_PART));
        assert!(!is_legal(ShoppingListStatus::Promoted, APPROVE_SHOPPING_LIST_ITEM));
        assert!(ShoppingListStatus::Rejected.is_terminal());
    }
}
