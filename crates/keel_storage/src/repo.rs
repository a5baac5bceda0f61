#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::{AuditEntry, AuditEntryId, AuditEntryInput};
use keel_kernel_contracts::idempotency::{IdempotencyKey, IdempotencyRecord};
use keel_kernel_contracts::MonotonicTimeNs;

use crate::partition::{EntityWrite, TenantPartition};
use crate::store::StorageError;

/// Typed repository interface for the per-tenant audit ledger.
pub trait KeelAuditRepo {
    fn append_audit_row(&mut self, input: AuditEntryInput) -> Result<AuditEntryId, StorageError>;
    fn audit_rows(&self) -> &[AuditEntry];
    fn audit_rows_for_entity(&self, entity_type: EntityType, entity_id: &str) -> Vec<&AuditEntry>;
}

/// Typed repository interface for the per-tenant idempotency ledger.
///
/// Uniqueness of `(yacht_id, action_id, idempotency_key)` is enforced here, not by callers.
pub trait KeelIdempotencyRepo {
    fn reserve_idempotency_key(
        &mut self,
        action_id: &str,
        key: IdempotencyKey,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError>;
    fn complete_idempotency_key(
        &mut self,
        action_id: &str,
        key: &IdempotencyKey,
        result_snapshot: String,
    ) -> Result<(), StorageError>;
    fn idempotency_row(&self, action_id: &str, key: &IdempotencyKey)
        -> Option<&IdempotencyRecord>;
    fn idempotency_row_count(&self) -> usize;
}

/// Typed repository interface for entity rows.
pub trait KeelEntityRepo {
    fn apply_entity_write(&mut self, write: EntityWrite) -> Result<(), StorageError>;
    fn entity_row_exists(&self, entity_type: EntityType, entity_id: &str) -> bool;
}

impl KeelAuditRepo for TenantPartition {
    fn append_audit_row(&mut self, input: AuditEntryInput) -> Result<AuditEntryId, StorageError> {
        self.append_audit_entry(input)
    }

    fn audit_rows(&self) -> &[AuditEntry] {
        self.audit_entries()
    }

    fn audit_rows_for_entity(&self, entity_type: EntityType, entity_id: &str) -> Vec<&AuditEntry> {
        self.audit_entries_for_entity(entity_type, entity_id)
    }
}

impl KeelIdempotencyRepo for TenantPartition {
    fn reserve_idempotency_key(
        &mut self,
        action_id: &str,
        key: IdempotencyKey,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError> {
        self.reserve_idempotency_record(action_id, key, now)
    }

    fn complete_idempotency_key(
        &mut self,
        action_id: &str,
        key: &IdempotencyKey,
        result_snapshot: String,
    ) -> Result<(), StorageError> {
        self.complete_idempotency_record(action_id, key, result_snapshot)
    }

    fn idempotency_row(
        &self,
        action_id: &str,
        key: &IdempotencyKey,
    ) -> Option<&IdempotencyRecord> {
        self.idempotency_record_row(action_id, key)
    }

    fn idempotency_row_count(&self) -> usize {
        self.idempotency_record_count()
    }
}

impl KeelEntityRepo for TenantPartition {
    fn apply_entity_write(&mut self, write: EntityWrite) -> Result<(), StorageError> {
        self.apply(write)
    }

    fn entity_row_exists(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.entity_exists(entity_type, entity_id)
    }
}
