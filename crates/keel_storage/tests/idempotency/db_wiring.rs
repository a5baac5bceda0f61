#![forbid(unsafe_code)]

use keel_kernel_contracts::idempotency::IdempotencyKey;
use keel_kernel_contracts::tenancy::YachtId;
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::repo::KeelIdempotencyRepo;
use keel_storage::{KeelStore, StorageError};

fn yacht(id: &str) -> YachtId {
    YachtId::new(id).unwrap()
}

fn key(k: &str) -> IdempotencyKey {
    IdempotencyKey::new(k).unwrap()
}

#[test]
fn at_idem_db_01_duplicate_triple_rejected() {
    let s = KeelStore::new_in_memory();
    let y = yacht("yacht_a");
    s.transaction::<_, StorageError>(&y, |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(10))
    })
    .unwrap();
    let dup = s.transaction(&y, |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(11))
    });
    assert_eq!(
        dup,
        Err(StorageError::DuplicateKey {
            table: "idempotency_records",
            key: "K1".to_string()
        })
    );
}

#[test]
fn at_idem_db_02_same_key_other_action_or_tenant_is_distinct() {
    let s = KeelStore::new_in_memory();
    s.transaction::<_, StorageError>(&yacht("yacht_a"), |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(10))?;
        p.reserve_idempotency_key("consume_part", key("K1"), MonotonicTimeNs(10))
    })
    .unwrap();
    s.transaction::<_, StorageError>(&yacht("yacht_b"), |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(10))
    })
    .unwrap();
    assert_eq!(
        s.read(&yacht("yacht_a"), |p| p.idempotency_row_count())
            .unwrap(),
        2
    );
}

#[test]
fn at_idem_db_03_rollback_releases_reservation() {
    let s = KeelStore::new_in_memory();
    let y = yacht("yacht_a");
    let failed: Result<(), StorageError> = s.transaction(&y, |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(10))?;
        Err(StorageError::RowMissing {
            table: "parts",
            key: "prt_404".to_string(),
        })
    });
    assert!(failed.is_err());
    s.transaction::<_, StorageError>(&y, |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(12))
    })
    .unwrap();
}

#[test]
fn at_idem_db_04_snapshot_written_once() {
    let s = KeelStore::new_in_memory();
    let y = yacht("yacht_a");
    s.transaction::<_, StorageError>(&y, |p| {
        p.reserve_idempotency_key("receive_part", key("K1"), MonotonicTimeNs(10))?;
        p.complete_idempotency_key("receive_part", &key("K1"), "{\"stock\":5}".to_string())
    })
    .unwrap();
    let snap = s
        .read(&y, |p| {
            p.idempotency_row("receive_part", &key("K1"))
                .and_then(|r| r.result_snapshot.clone())
        })
        .unwrap();
    assert_eq!(snap.as_deref(), Some("{\"stock\":5}"));

    let second = s.transaction(&y, |p| {
        p.complete_idempotency_key("receive_part", &key("K1"), "{}".to_string())
    });
    assert!(matches!(second, Err(StorageError::AppendOnlyViolation { .. })));
    let overwrite = s.transaction(&y, |p| {
        p.attempt_overwrite_idempotency_record("receive_part", &key("K1"))
    });
    assert!(matches!(overwrite, Err(StorageError::AppendOnlyViolation { .. })));
}
