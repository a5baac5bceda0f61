#![forbid(unsafe_code)]

use keel_kernel_contracts::audit::{AuditEntryId, AuditEntryInput};

use crate::repo::KeelAuditRepo;
use crate::store::StorageError;

/// Append-only writer into a tenant's audit ledger.
///
/// Entries are written inside the same transaction as the mutation they describe, so a rolled
/// back mutation never leaves an audit row behind.
#[derive(Debug, Default)]
pub struct AuditWriter;

impl AuditWriter {
    pub fn emit(
        repo: &mut impl KeelAuditRepo,
        input: AuditEntryInput,
    ) -> Result<AuditEntryId, StorageError> {
        repo.append_audit_row(input)
    }

    pub fn emit_all(
        repo: &mut impl KeelAuditRepo,
        inputs: Vec<AuditEntryInput>,
    ) -> Result<Vec<AuditEntryId>, StorageError> {
        inputs
            .into_iter()
            .map(|input| repo.append_audit_row(input))
            .collect()
    }
}
