#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::action::EntityType;
use crate::common::validate_text;
use crate::tenancy::{Role, UserId, YachtId};
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuditEntryId(pub u64);

impl Validate for AuditEntryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_entry_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PayloadKey(String);

fn is_ascii_lower_snake_key(s: &str) -> bool {
    let b = s.as_bytes();
    if b.is_empty() || !b[0].is_ascii_lowercase() {
        return false;
    }
    b.iter()
        .skip(1)
        .all(|&c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_')
}

impl PayloadKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let k = Self(key.into());
        k.validate()?;
        Ok(k)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PayloadKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be <= 64 chars",
            });
        }
        if !is_ascii_lower_snake_key(&self.0) {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be lower_snake_case (a-z0-9_)",
            });
        }
        Ok(())
    }
}

/// Field snapshot recorded on one side of an audited change. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditValues {
    entries: BTreeMap<PayloadKey, String>,
}

impl AuditValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Result<Self, ContractViolation> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn with_opt(
        self,
        key: &str,
        value: Option<impl Into<String>>,
    ) -> Result<Self, ContractViolation> {
        match value {
            Some(v) => self.with(key, v),
            None => Ok(self),
        }
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<(), ContractViolation> {
        let value = value.into();
        if value.len() > 4_096 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_values.value",
                reason: "must be <= 4096 bytes",
            });
        }
        self.entries.insert(PayloadKey::new(key)?, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Validate for AuditValues {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.entries.len() > 32 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_values",
                reason: "must be <= 32 entries",
            });
        }
        for k in self.entries.keys() {
            k.validate()?;
        }
        Ok(())
    }
}

/// Digest of a captured signature. The raw signature bytes are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    pub user_id: UserId,
    pub role: Role,
    pub signer_name: String,
    pub signed_at: MonotonicTimeNs,
    pub signature_hash: String,
}

impl Validate for SignatureRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user_id.validate()?;
        validate_text("signature.signer_name", &self.signer_name, 128)?;
        if self.signed_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "signature.signed_at",
                reason: "must be > 0",
            });
        }
        if self.signature_hash.len() != 64
            || !self.signature_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(ContractViolation::InvalidValue {
                field: "signature.signature_hash",
                reason: "must be 64 hex chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntryInput {
    pub schema_version: SchemaVersion,
    pub created_at: MonotonicTimeNs,
    pub yacht_id: YachtId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: String,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub old_values: AuditValues,
    pub new_values: AuditValues,
    pub signature: Option<SignatureRecord>,
}

impl AuditEntryInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        created_at: MonotonicTimeNs,
        yacht_id: YachtId,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        actor_id: UserId,
        actor_role: Role,
        old_values: AuditValues,
        new_values: AuditValues,
        signature: Option<SignatureRecord>,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            created_at,
            yacht_id,
            entity_type,
            entity_id: entity_id.into(),
            action: action.into(),
            actor_id,
            actor_role,
            old_values,
            new_values,
            signature,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for AuditEntryInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_entry_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_entry_input.created_at",
                reason: "must be > 0",
            });
        }
        self.yacht_id.validate()?;
        crate::common::validate_id("audit_entry_input.entity_id", &self.entity_id, 128)?;
        crate::common::validate_id("audit_entry_input.action", &self.action, 64)?;
        self.actor_id.validate()?;
        self.old_values.validate()?;
        self.new_values.validate()?;
        if self.old_values.is_empty() && self.new_values.is_empty() && self.signature.is_none() {
            return Err(ContractViolation::InvalidValue {
                field: "audit_entry_input",
                reason: "must record a change or a signature",
            });
        }
        if let Some(s) = &self.signature {
            s.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub audit_id: AuditEntryId,
    pub schema_version: SchemaVersion,
    pub created_at: MonotonicTimeNs,
    pub yacht_id: YachtId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: String,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub old_values: AuditValues,
    pub new_values: AuditValues,
    pub signature: Option<SignatureRecord>,
}

impl AuditEntry {
    pub fn from_input_v1(
        audit_id: AuditEntryId,
        input: AuditEntryInput,
    ) -> Result<Self, ContractViolation> {
        audit_id.validate()?;
        input.validate()?;
        Ok(Self {
            audit_id,
            schema_version: input.schema_version,
            created_at: input.created_at,
            yacht_id: input.yacht_id,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            action: input.action,
            actor_id: input.actor_id,
            actor_role: input.actor_role,
            old_values: input.old_values,
            new_values: input.new_values,
            signature: input.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(old: AuditValues, new: AuditValues) -> Result<AuditEntryInput, ContractViolation> {
        AuditEntryInput::v1(
            MonotonicTimeNs(10),
            YachtId::new("yacht_a").unwrap(),
            EntityType::Fault,
            "flt_000001",
            "acknowledge_fault",
            UserId::new("user_hod").unwrap(),
            Role::ChiefEngineer,
            old,
            new,
            None,
        )
    }

    #[test]
    fn at_audit_01_payload_key_requires_lower_snake_case_ascii() {
        assert!(PayloadKey::new("Status").is_err());
        assert!(PayloadKey::new("status-x").is_err());
        assert!(PayloadKey::new("1status").is_err());
        assert!(PayloadKey::new("status").is_ok());
    }

    #[test]
    fn at_audit_02_entry_must_record_a_change() {
        assert!(input(AuditValues::new(), AuditValues::new()).is_err());
        let new = AuditValues::new().with("status", "acknowledged").unwrap();
        let ok = input(AuditValues::new(), new).unwrap();
        assert_eq!(ok.new_values.get("status"), Some("acknowledged"));
    }

    #[test]
    fn at_audit_03_values_skip_absent_fields() {
        let v = AuditValues::new()
            .with_opt("diagnosis", None::<String>)
            .unwrap()
            .with_opt("resolution", Some("replaced seal"))
            .unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v.get("resolution"), Some("replaced seal"));
    }
}
