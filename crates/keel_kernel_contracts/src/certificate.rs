#![forbid(unsafe_code)]

use crate::action::EntityType;
use crate::common::{validate_opt_text, validate_text, validated_id, CalendarDate};
use crate::lifecycle::{Lifecycle, Transition};
use crate::tenancy::{UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, Validate};

validated_id!(CertificateId, "certificate_id", 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateStatus {
    Valid,
    Suspended,
    Revoked,
}

pub const RENEW_CERTIFICATE: &str = "renew_certificate";
pub const SUSPEND_CERTIFICATE: &str = "suspend_certificate";
pub const REINSTATE_CERTIFICATE: &str = "reinstate_certificate";
pub const REVOKE_CERTIFICATE: &str = "revoke_certificate";

#[rustfmt::skip]
const CERTIFICATE_TRANSITIONS: &[Transition<CertificateStatus>] = &[
    Transition { from: CertificateStatus::Valid, action: RENEW_CERTIFICATE, to: CertificateStatus::Valid },
    Transition { from: CertificateStatus::Valid, action: SUSPEND_CERTIFICATE, to: CertificateStatus::Suspended },
    Transition { from: CertificateStatus::Suspended, action: REINSTATE_CERTIFICATE, to: CertificateStatus::Valid },
    Transition { from: CertificateStatus::Valid, action: REVOKE_CERTIFICATE, to: CertificateStatus::Revoked },
    Transition { from: CertificateStatus::Suspended, action: REVOKE_CERTIFICATE, to: CertificateStatus::Revoked },
];

impl Lifecycle for CertificateStatus {
    const ENTITY: EntityType = EntityType::Certificate;

    fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Valid => "valid",
            CertificateStatus::Suspended => "suspended",
            CertificateStatus::Revoked => "revoked",
        }
    }

    fn transitions() -> &'static [Transition<Self>] {
        CERTIFICATE_TRANSITIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub yacht_id: YachtId,
    pub certificate_id: CertificateId,
    pub name: String,
    pub issuing_authority: String,
    pub certificate_number: Option<String>,
    pub expires_on: CalendarDate,
    pub status: CertificateStatus,
    pub suspension_reason: Option<String>,
    pub revocation_reason: Option<String>,
    pub created_by: UserId,
    pub created_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl Validate for CertificateRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        self.certificate_id.validate()?;
        validate_text("certificate.name", &self.name, 200)?;
        validate_text("certificate.issuing_authority", &self.issuing_authority, 200)?;
        validate_opt_text("certificate.certificate_number", &self.certificate_number, 64)?;
        validate_opt_text("certificate.suspension_reason", &self.suspension_reason, 1_000)?;
        validate_opt_text("certificate.revocation_reason", &self.revocation_reason, 1_000)?;
        self.created_by.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{is_legal, transition};

    #[test]
    fn at_certificate_01_suspend_then_reinstate_returns_to_valid() {
        let s = transition(CertificateStatus::Valid, SUSPEND_CERTIFICATE).unwrap();
        assert_eq!(s, CertificateStatus::Suspended);
        assert!(!is_legal(s, RENEW_CERTIFICATE));
        assert_eq!(
            transition(s, REINSTATE_CERTIFICATE).unwrap(),
            CertificateStatus::Valid
        );
    }

    #[test]
    fn at_certificate_02_revoked_is_terminal() {
        assert!(CertificateStatus::Revoked.is_terminal());
        assert!(!is_legal(CertificateStatus::Revoked, REINSTATE_CERTIFICATE));
    }
}
