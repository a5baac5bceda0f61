#![forbid(unsafe_code)]

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::{AuditEntryId, AuditEntryInput, AuditValues};
use keel_kernel_contracts::tenancy::{Role, UserId, YachtId};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::audit::AuditWriter;
use keel_storage::repo::KeelAuditRepo;
use keel_storage::{KeelStore, StorageError};

fn input(yacht: &str, entity_id: &str, to: &str) -> AuditEntryInput {
    AuditEntryInput::v1(
        MonotonicTimeNs(100),
        YachtId::new(yacht).unwrap(),
        EntityType::Fault,
        entity_id,
        "acknowledge_fault",
        UserId::new("dbw_hod").unwrap(),
        Role::ChiefEngineer,
        AuditValues::new().with("status", "open").unwrap(),
        AuditValues::new().with("status", to).unwrap(),
        None,
    )
    .unwrap()
}

#[test]
fn at_audit_db_01_ids_are_sequential_per_tenant() {
    let s = KeelStore::new_in_memory();
    let y = YachtId::new("yacht_a").unwrap();
    let ids = s
        .transaction::<_, StorageError>(&y, |p| {
            AuditWriter::emit_all(
                p,
                vec![
                    input("yacht_a", "flt_000001", "acknowledged"),
                    input("yacht_a", "flt_000002", "acknowledged"),
                ],
            )
        })
        .unwrap();
    assert_eq!(ids, vec![AuditEntryId(1), AuditEntryId(2)]);
}

#[test]
fn at_audit_db_02_cross_tenant_row_rejected() {
    let s = KeelStore::new_in_memory();
    let y = YachtId::new("yacht_a").unwrap();
    let r = s.transaction(&y, |p| {
        AuditWriter::emit(p, input("yacht_b", "flt_000001", "acknowledged"))
    });
    assert!(matches!(r, Err(StorageError::TenantMismatch { .. })));
}

#[test]
fn at_audit_db_03_entity_history_scoped_and_append_only() {
    let s = KeelStore::new_in_memory();
    let y = YachtId::new("yacht_a").unwrap();
    s.transaction::<_, StorageError>(&y, |p| {
        AuditWriter::emit(p, input("yacht_a", "flt_000001", "acknowledged"))?;
        AuditWriter::emit(p, input("yacht_a", "flt_000002", "acknowledged"))?;
        AuditWriter::emit(p, input("yacht_a", "flt_000001", "diagnosed"))?;
        Ok(())
    })
    .unwrap();
    let history = s
        .read(&y, |p| {
            p.audit_rows_for_entity(EntityType::Fault, "flt_000001")
                .iter()
                .map(|e| e.new_values.get("status").unwrap_or("").to_string())
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(history, vec!["acknowledged", "diagnosed"]);

    let overwrite = s.transaction(&y, |p| p.attempt_overwrite_audit_entry(AuditEntryId(1)));
    assert_eq!(
        overwrite,
        Err(StorageError::AppendOnlyViolation {
            table: "audit_entries"
        })
    );
}
