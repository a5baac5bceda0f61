#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::action::EntityType;
use crate::common::{validate_id, validate_opt_text, validate_text, validated_id};
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::work_order::WorkOrderId;
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(PartId, "part_id", 64);
validated_id!(InventoryTransactionId, "transaction_id", 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartStatus {
    Active,
    Archived,
}

pub const RECEIVE_PART: &str = "receive_part";
pub const CONSUME_PART: &str = "consume_part";
pub const ARCHIVE_PART: &str = "archive_part";

#[rustfmt::skip]
const PART_TRANSITIONS: &[Transition<PartStatus>] = &[
    Transition { from: PartStatus::Active, action: RECEIVE_PART, to: PartStatus::Active },
    Transition { from: PartStatus::Active, action: CONSUME_PART, to: PartStatus::Active },
    Transition { from: PartStatus::Active, action: ARCHIVE_PART, to: PartStatus::Archived },
];

impl Lifecycle for PartStatus {
    const ENTITY: EntityType = EntityType::Part;

    fn as_str(self) -> &'static str {
        match self {
            PartStatus::Active => "active",
            PartStatus::Archived => "archived",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        PART_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub yacht_id: YachtId,
    pub part_id: PartId,
    pub name: String,
    pub part_number: Option<String>,
    pub unit: String,
    pub stock_by_location: BTreeMap<String, u64>,
    pub status: PartStatus,
    /// Shopping-list item this part was promoted from, if any.
    pub source_item_id: Option<String>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl PartRecord {
    /// Total across locations, or `None` when it does not fit in a `u64`.
    pub fn checked_stock_level(&self) -> Option<u64> {
        self.stock_by_location
            .values()
            .try_fold(0u64, |acc, q| acc.checked_add(*q))
    }

    /// Saturating total. A validated record never saturates.
    pub fn stock_level(&self) -> u64 {
        self.checked_stock_level().unwrap_or(u64::MAX)
    }

    pub fn stock_at(&self, location: &str) -> u64 {
        self.stock_by_location.get(location).copied().unwrap_or(0)
    }
}

impl Validate for PartRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.part_id.validate()?;
        validate_text("part.name", &self.name, 200)?;
        validate_opt_text("part.part_number", &self.part_number, 64)?;
        validate_text("part.unit", &self.unit, 32)?;
        for loc in self.stock_by_location.keys() {
            validate_location("part.stock_by_location", loc)?;
        }
        if self.checked_stock_level().is_none() {
            return Err(ContractViolation::InvalidValue {
                field: "part.stock_by_location",
                reason: "total stock must fit in u64",
            });
        }
        if let Some(src) = &self.source_item_id {
            validate_id("part.source_item_id", src, 64)?;
        }
        Ok(())
    }
}

pub fn validate_location(field: &'static str, location: &str) -> Result<(), ContractViolation> {
    validate_text(field, location, 64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryTransactionKind {
    Receive,
    Consume,
}

impl InventoryTransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InventoryTransactionKind::Receive => "receive",
            InventoryTransactionKind::Consume => "consume",
        }
    }
}

/// Append-only stock movement row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryTransaction {
    pub yacht_id: YachtId,
    pub transaction_id: InventoryTransactionId,
    pub part_id: PartId,
    pub kind: InventoryTransactionKind,
    pub location: String,
    pub quantity: u64,
    pub work_order_id: Option<WorkOrderId>,
    pub resulting_stock_level: u64,
    pub performed_by: UserId,
    pub created_at: MonotonicTimeNs,
}

impl Validate for InventoryTransaction {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.transaction_id.validate()?;
        self.part_id.validate()?;
        validate_location("inventory_transaction.location", &self.location)?;
        if self.quantity == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "inventory_transaction.quantity",
                reason: "must be > 0",
            });
        }
        if let Some(w) = &self.work_order_id {
            w.validate()?;
        }
        self.performed_by.validate()
    }
}
