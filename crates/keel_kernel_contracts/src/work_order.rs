#![forbid(unsafe_code)]

use crate::action::EntityType;
use crate::common::{validate_opt_text, validate_text, validated_id, EntityNote};
use crate::fault::FaultId;
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(WorkOrderId, "work_order_id", 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkOrderPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl WorkOrderPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkOrderPriority::Low => "low",
            WorkOrderPriority::Normal => "normal",
            WorkOrderPriority::High => "high",
            WorkOrderPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        match s {
            "low" => Ok(WorkOrderPriority::Low),
            "normal" => Ok(WorkOrderPriority::Normal),
            "high" => Ok(WorkOrderPriority::High),
            "urgent" => Ok(WorkOrderPriority::Urgent),
            _ => Err(ContractViolation::InvalidValue {
                field: "priority",
                reason: "must be one of low|normal|high|urgent",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkOrderStatus {
    Open,
    InProgress,
    Closed,
    Cancelled,
}

impl WorkOrderStatus {
    /// Open work orders block closing the fault they are linked to.
    pub fn is_active(self) -> bool {
        matches!(self, WorkOrderStatus::Open | WorkOrderStatus::InProgress)
    }
}

pub const ASSIGN_WORK_ORDER: &str = "assign_work_order";
pub const START_WORK_ORDER: &str = "start_work_order";
pub const ADD_WORK_ORDER_NOTE: &str = "add_work_order_note";
pub const CLOSE_WORK_ORDER: &str = "close_work_order";
pub const CANCEL_WORK_ORDER: &str = "cancel_work_order";

// `start` leaves only `open` and `close` leaves only `in_progress`; the two are never legal together.
#[rustfmt::skip]
const WORK_ORDER_TRANSITIONS: &[Transition<WorkOrderStatus>] = &[
    Transition { from: WorkOrderStatus::Open, action: START_WORK_ORDER, to: WorkOrderStatus::InProgress },
    Transition { from: WorkOrderStatus::InProgress, action: CLOSE_WORK_ORDER, to: WorkOrderStatus::Closed },
    Transition { from: WorkOrderStatus::Open, action: CANCEL_WORK_ORDER, to: WorkOrderStatus::Cancelled },
    Transition { from: WorkOrderStatus::InProgress, action: CANCEL_WORK_ORDER, to: WorkOrderStatus::Cancelled },
    Transition { from: WorkOrderStatus::Open, action: ASSIGN_WORK_ORDER, to: WorkOrderStatus::Open },
    Transition { from: WorkOrderStatus::InProgress, action: ASSIGN_WORK_ORDER, to: WorkOrderStatus::InProgress },
    Transition { from: WorkOrderStatus::Open, action: ADD_WORK_ORDER_NOTE, to: WorkOrderStatus::Open },
    Transition { from: WorkOrderStatus::InProgress, action: ADD_WORK_ORDER_NOTE, to: WorkOrderStatus::InProgress },
];

impl Lifecycle for WorkOrderStatus {
    const ENTITY: EntityType = EntityType::WorkOrder;

    fn as_str(self) -> &'static str {
        match self {
            WorkOrderStatus::Open => "open",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Closed => "closed",
            WorkOrderStatus::Cancelled => "cancelled",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        WORK_ORDER_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrderRecord {
    pub yacht_id: YachtId,
    pub work_order_id: WorkOrderId,
    pub title: String,
    pub description: Option<String>,
    pub priority: WorkOrderPriority,
    pub fault_id: Option<FaultId>,
    pub assigned_to: Option<UserId>,
    pub status: WorkOrderStatus,
    pub created_by: UserId,
    pub completion_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub notes: Vec<EntityNote>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for WorkOrderRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.work_order_id.validate()?;
        validate_text("work_order.title", &self.title, 200)?;
        validate_opt_text("work_order.description", &self.description, 4_000)?;
        if let Some(f) = &self.fault_id {
            f.validate()?;
        }
        if let Some(u) = &self.assigned_to {
            u.validate()?;
        }
        self.created_by.validate()?;
        validate_opt_text("work_order.completion_notes", &self.completion_notes, 4_000)?;
        validate_opt_text(
            "work_order.cancellation_reason",
            &self.cancellation_reason,
            1_000,
        )?;
        for n in &self.notes {
            n.validate()?;
        }
        if self.updated_at < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "work_order.updated_at",
                reason: "must be >= created_at",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::is_legal;

    const ALL: [WorkOrderStatus; 4] = [
        WorkOrderStatus::Open,
        WorkOrderStatus::InProgress,
        WorkOrderStatus::Closed,
        WorkOrderStatus::Cancelled,
    ];

    #[test]
    fn at_work_order_01_start_and_close_never_both_legal() {
        for s in ALL {
            assert!(
                !(is_legal(s, START_WORK_ORDER) && is_legal(s, CLOSE_WORK_ORDER)),
                "{s:?}"
            );
        }
    }

    #[test]
    fn at_work_order_02_cancel_reachable_from_any_non_terminal_state() {
        assert!(is_legal(WorkOrderStatus::Open, CANCEL_WORK_ORDER));
        assert!(is_legal(WorkOrderStatus::InProgress, CANCEL_WORK_ORDER));
        assert!(!is_legal(WorkOrderStatus::Closed, CANCEL_WORK_ORDER));
        assert!(WorkOrderStatus::Closed.is_terminal());
        assert!(WorkOrderStatus::Cancelled.is_terminal());
    }
}
