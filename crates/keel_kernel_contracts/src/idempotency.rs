#![forbid(unsafe_code)]

use crate::common::validate_text;
use crate::tenancy::YachtId;
use crate::{ContractViolation, MonotonicTimeNs, Validate};

/// Caller-chosen deduplication key. Any printable text up to 128 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let k = Self(v.into());
        k.validate()?;
        Ok(k)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for IdempotencyKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("idempotency_key", &self.0, 128)?;
        if self.0.chars().any(char::is_control) {
            return Err(ContractViolation::InvalidValue {
                field: "idempotency_key",
                reason: "must not contain control characters",
            });
        }
        Ok(())
    }
}

/// Ledger row. `result_snapshot` is empty while the reserving transaction is still running and
/// carries the serialized result once it commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub yacht_id: YachtId,
    pub action_id: String,
    pub idempotency_key: IdempotencyKey,
    pub created_at: MonotonicTimeNs,
    pub result_snapshot: Option<String>,
}

impl Validate for IdempotencyRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.yacht_id.validate()?;
        crate::common::validate_id("idempotency_record.action_id", &self.action_id, 64)?;
        self.idempotency_key.validate()?;
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "idempotency_record.created_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_idem_01_key_accepts_free_text_within_bounds() {
        assert!(IdempotencyKey::new("K1").is_ok());
        assert!(IdempotencyKey::new("receive 2024/06 #3").is_ok());
        assert!(IdempotencyKey::new("").is_err());
        assert!(IdempotencyKey::new("a\nb").is_err());
        assert!(IdempotencyKey::new("k".repeat(129)).is_err());
    }
}
