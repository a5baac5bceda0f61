#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::str::FromStr;

use keel_kernel_contracts::common::{CalendarDate, CalendarMonth};
use keel_kernel_contracts::fault::{FaultId, FaultRecord, FaultSeverity, FaultStatus};
use keel_kernel_contracts::hours_of_rest::{HoursOfRestRecord, RestRecordId};
use keel_kernel_contracts::inventory::{
    InventoryTransaction, InventoryTransactionId, InventoryTransactionKind, PartId, PartRecord,
    PartStatus,
};
use keel_kernel_contracts::tenancy::{UserId, YachtId};
use keel_kernel_contracts::work_order::{
    WorkOrderId, WorkOrderPriority, WorkOrderRecord, WorkOrderStatus,
};
use keel_kernel_contracts::MonotonicTimeNs;
use keel_storage::repo::KeelEntityRepo;
use keel_storage::{EntityRow, EntityWrite, KeelStore, StorageError};
use rust_decimal::Decimal;

fn yacht() -> YachtId {
    YachtId::new("yacht_a").unwrap()
}

fn user() -> UserId {
    UserId::new("dbw_user_1").unwrap()
}

fn fault(yacht_id: YachtId, id: &str, status: FaultStatus) -> FaultRecord {
    FaultRecord {
        yacht_id,
        fault_id: FaultId::new(id).unwrap(),
        title: "Raw water pump leak".to_string(),
        description: None,
        severity: FaultSeverity::High,
        equipment_id: Some("eq_genset_1".to_string()),
        status,
        reported_by: user(),
        diagnosis: None,
        resolution: None,
        notes: Vec::new(),
        created_at: MonotonicTimeNs(1),
        updated_at: MonotonicTimeNs(1),
    }
}

fn work_order(fault_id: Option<&str>) -> WorkOrderRecord {
    WorkOrderRecord {
        yacht_id: yacht(),
        work_order_id: WorkOrderId::new("wo_000001").unwrap(),
        title: "Replace seal".to_string(),
        description: None,
        priority: WorkOrderPriority::Normal,
        fault_id: fault_id.map(|f| FaultId::new(f).unwrap()),
        assigned_to: None,
        status: WorkOrderStatus::Open,
        created_by: user(),
        completion_notes: None,
        cancellation_reason: None,
        notes: Vec::new(),
        created_at: MonotonicTimeNs(2),
        updated_at: MonotonicTimeNs(2),
    }
}

fn rest(id: &str, date: &str, hours: &str) -> HoursOfRestRecord {
    HoursOfRestRecord {
        yacht_id: yacht(),
        record_id: RestRecordId::new(id).unwrap(),
        user_id: user(),
        record_date: CalendarDate::parse("record_date", date).unwrap(),
        rest_hours: Decimal::from_str(hours).unwrap(),
        is_compliant: true,
        notes: None,
        created_at: MonotonicTimeNs(3),
        updated_at: MonotonicTimeNs(3),
    }
}

#[test]
fn at_partition_db_01_insert_then_update_round_trips() {
    let s = KeelStore::new_in_memory();
    s.transaction::<_, StorageError>(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))?;
        p.apply_entity_write(EntityWrite::Update(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Acknowledged,
        ))))
    })
    .unwrap();
    let status = s
        .read(&yacht(), |p| {
            p.fault(&FaultId::new("flt_000001").unwrap()).map(|f| f.status)
        })
        .unwrap();
    assert_eq!(status, Some(FaultStatus::Acknowledged));
}

#[test]
fn at_partition_db_02_duplicate_insert_and_missing_update_fail() {
    let s = KeelStore::new_in_memory();
    let dup = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))?;
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))
    });
    assert!(matches!(dup, Err(StorageError::DuplicateKey { table: "faults", .. })));

    let missing = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Update(EntityRow::Fault(fault(
            yacht(),
            "flt_000099",
            FaultStatus::Open,
        ))))
    });
    assert!(matches!(missing, Err(StorageError::RowMissing { .. })));
}

#[test]
fn at_partition_db_03_tenant_mismatch_rejected() {
    let s = KeelStore::new_in_memory();
    let other = YachtId::new("yacht_b").unwrap();
    let r = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            other.clone(),
            "flt_000001",
            FaultStatus::Open,
        ))))
    });
    assert!(matches!(r, Err(StorageError::TenantMismatch { .. })));
}

#[test]
fn at_partition_db_04_work_order_fault_fk_enforced() {
    let s = KeelStore::new_in_memory();
    let r = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::WorkOrder(work_order(Some(
            "flt_404",
        )))))
    });
    assert!(matches!(r, Err(StorageError::ForeignKeyViolation { .. })));

    s.transaction::<_, StorageError>(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))?;
        p.apply_entity_write(EntityWrite::Insert(EntityRow::WorkOrder(work_order(Some(
            "flt_000001",
        )))))
    })
    .unwrap();
    let linked = s
        .read(&yacht(), |p| {
            p.work_orders_for_fault(&FaultId::new("flt_000001").unwrap())
                .len()
        })
        .unwrap();
    assert_eq!(linked, 1);
}

#[test]
fn at_partition_db_05_partitions_are_isolated() {
    let s = KeelStore::new_in_memory();
    s.transaction::<_, StorageError>(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))
    })
    .unwrap();
    let other = YachtId::new("yacht_b").unwrap();
    let seen = s
        .read(&other, |p| p.fault(&FaultId::new("flt_000001").unwrap()).is_some())
        .unwrap();
    assert!(!seen);
}

#[test]
fn at_partition_db_06_one_rest_record_per_user_per_day() {
    let s = KeelStore::new_in_memory();
    let r = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::RestRecord(rest(
            "hor_000001",
            "2025-03-01",
            "11",
        ))))?;
        p.apply_entity_write(EntityWrite::Insert(EntityRow::RestRecord(rest(
            "hor_000002",
            "2025-03-01",
            "9",
        ))))
    });
    assert!(matches!(r, Err(StorageError::DuplicateKey { .. })));

    s.transaction::<_, StorageError>(&yacht(), |p| {
        for (id, date) in [
            ("hor_000001", "2025-03-01"),
            ("hor_000002", "2025-03-31"),
            ("hor_000003", "2025-04-01"),
        ] {
            p.apply_entity_write(EntityWrite::Insert(EntityRow::RestRecord(rest(id, date, "10"))))?;
        }
        Ok(())
    })
    .unwrap();
    let march = s
        .read(&yacht(), |p| {
            p.rest_records_for_month(&user(), CalendarMonth::parse("m", "2025-03").unwrap())
                .len()
        })
        .unwrap();
    assert_eq!(march, 2);
}

#[test]
fn at_partition_db_07_inventory_transactions_append_only() {
    let s = KeelStore::new_in_memory();
    let mut stock = BTreeMap::new();
    stock.insert("engine_room".to_string(), 5);
    let part = PartRecord {
        yacht_id: yacht(),
        part_id: PartId::new("prt_000001").unwrap(),
        name: "Impeller".to_string(),
        part_number: None,
        unit: "ea".to_string(),
        stock_by_location: stock,
        status: PartStatus::Active,
        source_item_id: None,
        created_at: MonotonicTimeNs(1),
        updated_at: MonotonicTimeNs(1),
    };
    let tx = InventoryTransaction {
        yacht_id: yacht(),
        transaction_id: InventoryTransactionId::new("itx_000001").unwrap(),
        part_id: PartId::new("prt_000001").unwrap(),
        kind: InventoryTransactionKind::Receive,
        location: "engine_room".to_string(),
        quantity: 5,
        work_order_id: None,
        resulting_stock_level: 5,
        performed_by: user(),
        created_at: MonotonicTimeNs(2),
    };
    s.transaction::<_, StorageError>(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Part(part.clone())))?;
        p.apply_entity_write(EntityWrite::AppendInventoryTransaction(tx.clone()))
    })
    .unwrap();
    let again = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::AppendInventoryTransaction(tx.clone()))
    });
    assert!(matches!(again, Err(StorageError::DuplicateKey { .. })));
    let overwrite = s.transaction(&yacht(), |p| {
        p.attempt_overwrite_inventory_transaction("itx_000001")
    });
    assert_eq!(
        overwrite,
        Err(StorageError::AppendOnlyViolation {
            table: "inventory_transactions"
        })
    );
}

#[test]
fn at_partition_db_08_rollback_restores_updated_rows_and_drops_inserted_ones() {
    let s = KeelStore::new_in_memory();
    s.transaction::<_, StorageError>(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))
    })
    .unwrap();

    let r = s.transaction(&yacht(), |p| {
        p.apply_entity_write(EntityWrite::Update(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Acknowledged,
        ))))?;
        p.apply_entity_write(EntityWrite::Insert(EntityRow::WorkOrder(work_order(Some(
            "flt_000001",
        )))))?;
        p.apply_entity_write(EntityWrite::Insert(EntityRow::Fault(fault(
            yacht(),
            "flt_000001",
            FaultStatus::Open,
        ))))
    });
    assert!(matches!(r, Err(StorageError::DuplicateKey { .. })));

    let (status, has_work_order) = s
        .read(&yacht(), |p| {
            (
                p.fault(&FaultId::new("flt_000001").unwrap()).map(|f| f.status),
                p.work_order(&WorkOrderId::new("wo_000001").unwrap()).is_some(),
            )
        })
        .unwrap();
    assert_eq!(status, Some(FaultStatus::Open));
    assert!(!has_work_order);
}
