#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{validate_text, validated_id};
use crate::{ContractViolation, Validate};

validated_id!(
    /// Tenant isolation boundary. Always resolved server-side from the authenticated session.
    YachtId,
    "yacht_id",
    64
);

validated_id!(UserId, "user_id", 128);

/// Fixed role set. Permission is an explicit allow-set per action, never a rank comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Crew,
    #[serde(alias = "hod")]
    ChiefEngineer,
    Captain,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Crew, Role::ChiefEngineer, Role::Captain];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Crew => "crew",
            Role::ChiefEngineer => "chief_engineer",
            Role::Captain => "captain",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ContractViolation> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crew" => Ok(Role::Crew),
            "chief_engineer" | "hod" => Ok(Role::ChiefEngineer),
            "captain" => Ok(Role::Captain),
            _ => Err(ContractViolation::InvalidValue {
                field: "role",
                reason: "must be one of crew|chief_engineer|captain",
            }),
        }
    }
}

/// Authenticated caller, bound to exactly one tenant and one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub yacht_id: YachtId,
    pub role: Role,
    pub display_name: String,
}

impl Principal {
    pub fn v1(
        user_id: UserId,
        yacht_id: YachtId,
        role: Role,
        display_name: String,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            user_id,
            yacht_id,
            role,
            display_name,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for Principal {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user_id.validate()?;
        self.yacht_id.validate()?;
        validate_text("principal.display_name", &self.display_name, 128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_tenancy_01_role_accepts_hod_alias() {
        assert_eq!(Role::parse("HOD").unwrap(), Role::ChiefEngineer);
        assert_eq!(Role::parse("chief_engineer").unwrap(), Role::ChiefEngineer);
        assert!(Role::parse("bosun").is_err());
    }

    #[test]
    fn at_tenancy_02_yacht_id_rejects_empty() {
        assert!(YachtId::new("").is_err());
        assert_eq!(YachtId::new("yacht_a").unwrap().as_str(), "yacht_a");
    }
}
