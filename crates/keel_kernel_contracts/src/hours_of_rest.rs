#![forbid(unsafe_code)]

use rust_decimal::Decimal;

use crate::action::EntityType;
use crate::audit::SignatureRecord;
use crate::common::{validate_opt_text, validated_id, CalendarDate, CalendarMonth};
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(RestRecordId, "record_id", 64);
validated_id!(RestWarningId, "warning_id", 64);
validated_id!(MonthlySignoffId, "signoff_id", 64);

/// One crew member's rest for one calendar day. Re-recording the same day updates this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoursOfRestRecord {
    pub yacht_id: YachtId,
    pub record_id: RestRecordId,
    pub user_id: UserId,
    pub record_date: CalendarDate,
    pub rest_hours: Decimal,
    pub is_compliant: bool,
    pub notes: Option<String>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for HoursOfRestRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.record_id.validate()?;
        self.user_id.validate()?;
        validate_rest_hours(self.rest_hours)?;
        validate_opt_text("hours_of_rest.notes", &self.notes, 1_000)
    }
}

pub fn validate_rest_hours(hours: Decimal) -> Result<(), ContractViolation> {
    if hours.is_sign_negative() || hours > Decimal::from(24) {
        return Err(ContractViolation::InvalidValue {
            field: "rest_hours",
            reason: "must be within 0..=24",
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestWarningStatus {
    Active,
    Acknowledged,
    Dismissed,
}

pub const ACKNOWLEDGE_REST_WARNING: &str = "acknowledge_rest_warning";
pub const DISMISS_REST_WARNING: &str = "dismiss_rest_warning";

#[rustfmt::skip]
const REST_WARNING_TRANSITIONS: &[Transition<RestWarningStatus>] = &[
    Transition { from: RestWarningStatus::Active, action: ACKNOWLEDGE_REST_WARNING, to: RestWarningStatus::Acknowledged },
    Transition { from: RestWarningStatus::Active, action: DISMISS_REST_WARNING, to: RestWarningStatus::Dismissed },
    Transition { from: RestWarningStatus::Acknowledged, action: DISMISS_REST_WARNING, to: RestWarningStatus::Dismissed },
];

impl Lifecycle for RestWarningStatus {
    const ENTITY: EntityType = EntityType::RestWarning;

    fn as_str(self) -> &'static str {
        match self {
            RestWarningStatus::Active => "active",
            RestWarningStatus::Acknowledged => "acknowledged",
            RestWarningStatus::Dismissed => "dismissed",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        REST_WARNING_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestWarningRecord {
    pub yacht_id: YachtId,
    pub warning_id: RestWarningId,
    pub user_id: UserId,
    pub record_id: RestRecordId,
    pub record_date: CalendarDate,
    pub rest_hours: Decimal,
    pub status: RestWarningStatus,
    pub dismissal_reason: Option<String>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for RestWarningRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.warning_id.validate()?;
        self.user_id.validate()?;
        self.record_id.validate()?;
        validate_rest_hours(self.rest_hours)?;
        validate_opt_text("rest_warning.dismissal_reason", &self.dismissal_reason, 1_000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignoffStatus {
    Draft,
    CrewSigned,
    HodSigned,
    Finalized,
}

pub const CREW_SIGN_MONTHLY_SIGNOFF: &str = "crew_sign_monthly_signoff";
pub const HOD_SIGN_MONTHLY_SIGNOFF: &str = "hod_sign_monthly_signoff";
pub const CAPTAIN_FINALIZE_MONTHLY_SIGNOFF: &str = "captain_finalize_monthly_signoff";

#[rustfmt::skip]
const SIGNOFF_TRANSITIONS: &[Transition<SignoffStatus>] = &[
    Transition { from: SignoffStatus::Draft, action: CREW_SIGN_MONTHLY_SIGNOFF, to: SignoffStatus::CrewSigned },
    Transition { from: SignoffStatus::CrewSigned, action: HOD_SIGN_MONTHLY_SIGNOFF, to: SignoffStatus::HodSigned },
    Transition { from: SignoffStatus::HodSigned, action: CAPTAIN_FINALIZE_MONTHLY_SIGNOFF, to: SignoffStatus::Finalized },
];

impl Lifecycle for SignoffStatus {
    const ENTITY: EntityType = EntityType::MonthlySignoff;

    fn as_str(self) -> &'static str {
        match self {
            SignoffStatus::Draft => "draft",
            SignoffStatus::CrewSigned => "crew_signed",
            SignoffStatus::HodSigned => "hod_signed",
            SignoffStatus::Finalized => "finalized",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        SIGNOFF_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySignoffRecord {
    pub yacht_id: YachtId,
    pub signoff_id: MonthlySignoffId,
    pub user_id: UserId,
    pub month: CalendarMonth,
    pub total_rest_hours: Decimal,
    pub recorded_days: u32,
    pub non_compliant_days: u32,
    pub status: SignoffStatus,
    pub crew_signature: Option<SignatureRecord>,
    pub hod_signature: Option<SignatureRecord>,
    pub captain_signature: Option<SignatureRecord>,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for MonthlySignoffRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.signoff_id.validate()?;
        self.user_id.validate()?;
        if self.non_compliant_days > self.recorded_days {
            return Err(ContractViolation::InvalidValue {
                field: "monthly_signoff.non_compliant_days",
                reason: "must be <= recorded_days",
            });
        }
        let expected = match self.status {
            SignoffStatus::Draft => (false, false, false),
            SignoffStatus::CrewSigned => (true, false, false),
            SignoffStatus::HodSigned => (true, true, false),
            SignoffStatus::Finalized => (true, true, true),
        };
        let actual = (
            self.crew_signature.is_some(),
            self.hod_signature.is_some(),
            self.captain_signature.is_some(),
        );
        if expected != actual {
            return Err(ContractViolation::InvalidValue {
                field: "monthly_signoff.signatures",
                reason: "must match the sign-off status",
            });
        }
        for s in [&self.crew_signature, &self.hod_signature, &self.captain_signature]
            .into_iter()
            .flatten()
        {
            s.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{is_legal, legal_actions};

    #[test]
    fn at_rest_01_signoff_chain_is_strictly_ordered() {
        assert_eq!(
            legal_actions(SignoffStatus::Draft),
            vec![CREW_SIGN_MONTHLY_SIGNOFF]
        );
        assert!(!is_legal(SignoffStatus::Draft, HOD_SIGN_MONTHLY_SIGNOFF));
        assert!(!is_legal(SignoffStatus::CrewSigned, CAPTAIN_FINALIZE_MONTHLY_SIGNOFF));
        assert!(SignoffStatus::Finalized.is_terminal());
    }

    #[test]
    fn at_rest_02_rest_hours_bounded_to_a_day() {
        assert!(validate_rest_hours(Decimal::new(105, 1)).is_ok());
        assert!(validate_rest_hours(Decimal::from(25)).is_err());
        assert!(validate_rest_hours(Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn at_rest_03_warning_can_be_dismissed_after_acknowledgement() {
        assert!(is_legal(RestWarningStatus::Acknowledged, DISMISS_REST_WARNING));
        assert!(!is_legal(RestWarningStatus::Acknowledged, ACKNOWLEDGE_REST_WARNING));
    }
}
