#![forbid(unsafe_code)]

use crate::action::EntityType;
use crate::common::{validate_opt_text, validate_text, validated_id, EntityNote};
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(FaultId, "fault_id", 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaultSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FaultSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultSeverity::Low => "low",
            FaultSeverity::Medium => "medium",
            FaultSeverity::High => "high",
            FaultSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        match s {
            "low" => Ok(FaultSeverity::Low),
            "medium" => Ok(FaultSeverity::Medium),
            "high" => Ok(FaultSeverity::High),
            "critical" => Ok(FaultSeverity::Critical),
            _ => Err(ContractViolation::InvalidValue {
                field: "severity",
                reason: "must be one of low|medium|high|critical",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultStatus {
    Open,
    Acknowledged,
    Diagnosed,
    Closed,
    Reopened,
    FalseAlarm,
}

pub const ACKNOWLEDGE_FAULT: &str = "acknowledge_fault";
pub const DIAGNOSE_FAULT: &str = "diagnose_fault";
pub const ADD_FAULT_NOTE: &str = "add_fault_note";
pub const CLOSE_FAULT: &str = "close_fault";
pub const REOPEN_FAULT: &str = "reopen_fault";
pub const MARK_FAULT_FALSE_ALARM: &str = "mark_fault_false_alarm";

#[rustfmt::skip]
const FAULT_TRANSITIONS: &[Transition<FaultStatus>] = &[
    Transition { from: FaultStatus::Open, action: ACKNOWLEDGE_FAULT, to: FaultStatus::Acknowledged },
    Transition { from: FaultStatus::Reopened, action: ACKNOWLEDGE_FAULT, to: FaultStatus::Acknowledged },
    Transition { from: FaultStatus::Acknowledged, action: DIAGNOSE_FAULT, to: FaultStatus::Diagnosed },
    Transition { from: FaultStatus::Acknowledged, action: CLOSE_FAULT, to: FaultStatus::Closed },
    Transition { from: FaultStatus::Diagnosed, action: CLOSE_FAULT, to: FaultStatus::Closed },
    Transition { from: FaultStatus::Closed, action: REOPEN_FAULT, to: FaultStatus::Reopened },
    Transition { from: FaultStatus::Open, action: MARK_FAULT_FALSE_ALARM, to: FaultStatus::FalseAlarm },
    Transition { from: FaultStatus::Acknowledged, action: MARK_FAULT_FALSE_ALARM, to: FaultStatus::FalseAlarm },
    Transition { from: FaultStatus::Reopened, action: MARK_FAULT_FALSE_ALARM, to: FaultStatus::FalseAlarm },
    Transition { from: FaultStatus::Open, action: ADD_FAULT_NOTE, to: FaultStatus::Open },
    Transition { from: FaultStatus::Acknowledged, action: ADD_FAULT_NOTE, to: FaultStatus::Acknowledged },
    Transition { from: FaultStatus::Diagnosed, action: ADD_FAULT_NOTE, to: FaultStatus::Diagnosed },
    Transition { from: FaultStatus::Reopened, action: ADD_FAULT_NOTE, to: FaultStatus::Reopened },
];

impl Lifecycle for FaultStatus {
    const ENTITY: EntityType = EntityType::Fault;

    fn as_str(self) -> &'static str {
        match self {
            FaultStatus::Open => "open",
            FaultStatus::Acknowledged => "acknowledged",
            FaultStatus::Diagnosed => "diagnosed",
            FaultStatus::Closed => "closed",
            FaultStatus::Reopened => "reopened",
            FaultStatus::FalseAlarm => "false_alarm",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        FAULT_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    pub yacht_id: YachtId,
    pub fault_id: FaultId,
    pub title: String,
    pub description: Option<String>,
    pub severity: FaultSeverity,
    pub equipment_id: Option<String>,
    pub status: FaultStatus,
    pub reported_by: UserId,
    pub diagnosis: Option<String>,
    pub resolution: Option<String>,
    pub notes: Vec<EntityNote>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for FaultRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.fault_id.validate()?;
        validate_text("fault.title", &self.title, 200)?;
        validate_opt_text("fault.description", &self.description, 4_000)?;
        validate_opt_text("fault.equipment_id", &self.equipment_id, 128)?;
        self.reported_by.validate()?;
        validate_opt_text("fault.diagnosis", &self.diagnosis, 4_000)?;
        validate_opt_text("fault.resolution", &self.resolution, 4_000)?;
        if self.notes.len() > 500 {
            return Err(ContractViolation::InvalidValue {
                field: "fault.notes",
                reason: "must be <= 500 notes",
            });
        }
        for n in &self.notes {
            n.validate()?;
        }
        if self.updated_at < self.created_at {
            return Err(ContractViolation::InvalidValue {
                field: "fault.updated_at",
                reason: "must be >= created_at",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{is_legal, transition};

    #[test]
    fn at_fault_01_acknowledge_only_from_open_or_reopened() {
        assert_eq!(
            transition(FaultStatus::Open, ACKNOWLEDGE_FAULT).unwrap(),
            FaultStatus::Acknowledged
        );
        assert!(!is_legal(FaultStatus::Acknowledged, ACKNOWLEDGE_FAULT));
        assert!(is_legal(FaultStatus::Reopened, ACKNOWLEDGE_FAULT));
    }

    #[test]
    fn at_fault_02_false_alarm_blocked_once_closed() {
        assert!(is_legal(FaultStatus::Open, MARK_FAULT_FALSE_ALARM));
        assert!(!is_legal(FaultStatus::Closed, MARK_FAULT_FALSE_ALARM));
        assert!(FaultStatus::FalseAlarm.is_terminal());
    }

    #[test]
    fn at_fault_03_reopen_only_from_closed() {
        for s in [
            FaultStatus::Open,
            FaultStatus::Acknowledged,
            FaultStatus::Diagnosed,
            FaultStatus::Reopened,
            FaultStatus::FalseAlarm,
        ] {
            assert!(!is_legal(s, REOPEN_FAULT), "{s:?}");
        }
        assert!(is_legal(FaultStatus::Closed, REOPEN_FAULT));
    }

    #[test]
    fn at_fault_04_close_requires_acknowledgement() {
        assert!(!is_legal(FaultStatus::Open, CLOSE_FAULT));
        assert!(is_legal(FaultStatus::Acknowledged, CLOSE_FAULT));
        assert!(is_legal(FaultStatus::Diagnosed, CLOSE_FAULT));
    }
}
