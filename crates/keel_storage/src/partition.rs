#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use keel_kernel_contracts::action::EntityType;
use keel_kernel_contracts::audit::{AuditEntry, AuditEntryId, AuditEntryInput};
use keel_kernel_contracts::certificate::{CertificateId, CertificateRecord};
use keel_kernel_contracts::common::{CalendarDate, CalendarMonth};
use keel_kernel_contracts::fault::{FaultId, FaultRecord};
use keel_kernel_contracts::handover::{
    HandoverDraftId, HandoverDraftRecord, HandoverExportId, HandoverExportRecord,
};
use keel_kernel_contracts::hours_of_rest::{
    HoursOfRestRecord, MonthlySignoffId, MonthlySignoffRecord, RestRecordId, RestWarningId,
    RestWarningRecord,
};
use keel_kernel_contracts::idempotency::{IdempotencyKey, IdempotencyRecord};
use keel_kernel_contracts::inventory::{InventoryTransaction, PartId, PartRecord};
use keel_kernel_contracts::shopping_list::{ShoppingListItemId, ShoppingListItemRecord};
use keel_kernel_contracts::tenancy::{UserId, YachtId};
use keel_kernel_contracts::warranty::{WarrantyClaimId, WarrantyClaimRecord};
use keel_kernel_contracts::work_order::{WorkOrderId, WorkOrderRecord};
use keel_kernel_contracts::{MonotonicTimeNs, Validate};

use crate::store::StorageError;

/// One entity row, tagged by family.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRow {
    Fault(FaultRecord),
    WorkOrder(WorkOrderRecord),
    Part(PartRecord),
    ShoppingListItem(ShoppingListItemRecord),
    Certificate(CertificateRecord),
    WarrantyClaim(WarrantyClaimRecord),
    RestRecord(HoursOfRestRecord),
    RestWarning(RestWarningRecord),
    MonthlySignoff(MonthlySignoffRecord),
    HandoverDraft(HandoverDraftRecord),
    HandoverExport(HandoverExportRecord),
}

impl EntityRow {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRow::Fault(_) => EntityType::Fault,
            EntityRow::WorkOrder(_) => EntityType::WorkOrder,
            EntityRow::Part(_) => EntityType::Part,
            EntityRow::ShoppingListItem(_) => EntityType::ShoppingListItem,
            EntityRow::Certificate(_) => EntityType::Certificate,
            EntityRow::WarrantyClaim(_) => EntityType::WarrantyClaim,
            EntityRow::RestRecord(_) => EntityType::HoursOfRestRecord,
            EntityRow::RestWarning(_) => EntityType::RestWarning,
            EntityRow::MonthlySignoff(_) => EntityType::MonthlySignoff,
            EntityRow::HandoverDraft(_) => EntityType::HandoverDraft,
            EntityRow::HandoverExport(_) => EntityType::HandoverExport,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            EntityRow::Fault(r) => r.fault_id.as_str(),
            EntityRow::WorkOrder(r) => r.work_order_id.as_str(),
            EntityRow::Part(r) => r.part_id.as_str(),
            EntityRow::ShoppingListItem(r) => r.item_id.as_str(),
            EntityRow::Certificate(r) => r.certificate_id.as_str(),
            EntityRow::WarrantyClaim(r) => r.claim_id.as_str(),
            EntityRow::RestRecord(r) => r.record_id.as_str(),
            EntityRow::RestWarning(r) => r.warning_id.as_str(),
            EntityRow::MonthlySignoff(r) => r.signoff_id.as_str(),
            EntityRow::HandoverDraft(r) => r.draft_id.as_str(),
            EntityRow::HandoverExport(r) => r.export_id.as_str(),
        }
    }

    fn yacht_id(&self) -> &YachtId {
        match self {
            EntityRow::Fault(r) => &r.yacht_id,
            EntityRow::WorkOrder(r) => &r.yacht_id,
            EntityRow::Part(r) => &r.yacht_id,
            EntityRow::ShoppingListItem(r) => &r.yacht_id,
            EntityRow::Certificate(r) => &r.yacht_id,
            EntityRow::WarrantyClaim(r) => &r.yacht_id,
            EntityRow::RestRecord(r) => &r.yacht_id,
            EntityRow::RestWarning(r) => &r.yacht_id,
            EntityRow::MonthlySignoff(r) => &r.yacht_id,
            EntityRow::HandoverDraft(r) => &r.yacht_id,
            EntityRow::HandoverExport(r) => &r.yacht_id,
        }
    }

    fn validate(&self) -> Result<(), StorageError> {
        match self {
            EntityRow::Fault(r) => r.validate()?,
            EntityRow::WorkOrder(r) => r.validate()?,
            EntityRow::Part(r) => r.validate()?,
            EntityRow::ShoppingListItem(r) => r.validate()?,
            EntityRow::Certificate(r) => r.validate()?,
            EntityRow::WarrantyClaim(r) => r.validate()?,
            EntityRow::RestRecord(r) => r.validate()?,
            EntityRow::RestWarning(r) => r.validate()?,
            EntityRow::MonthlySignoff(r) => r.validate()?,
            EntityRow::HandoverDraft(r) => r.validate()?,
            EntityRow::HandoverExport(r) => r.validate()?,
        }
        Ok(())
    }
}

/// Staged write produced by a handler and applied by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityWrite {
    Insert(EntityRow),
    Update(EntityRow),
    AppendInventoryTransaction(InventoryTransaction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Update,
}

fn put<K: Ord + Clone + ToString, V>(
    table: &'static str,
    map: &mut BTreeMap<K, V>,
    key: K,
    row: V,
    mode: WriteMode,
) -> Result<(), StorageError> {
    match (mode, map.contains_key(&key)) {
        (WriteMode::Insert, true) => Err(StorageError::DuplicateKey {
            table,
            key: key.to_string(),
        }),
        (WriteMode::Update, false) => Err(StorageError::RowMissing {
            table,
            key: key.to_string(),
        }),
        _ => {
            map.insert(key, row);
            Ok(())
        }
    }
}

fn restore_entry<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(v) => {
            map.insert(key, v);
        }
        None => {
            map.remove(&key);
        }
    }
}

/// Inverse of one change made since the last commit.
#[derive(Debug)]
enum Undo {
    Row {
        entity_type: EntityType,
        entity_id: String,
        prior: Option<EntityRow>,
    },
    RestRecordIndex {
        key: (UserId, CalendarDate),
        prior: Option<RestRecordId>,
    },
    SignoffIndex {
        key: (UserId, CalendarMonth),
        prior: Option<MonthlySignoffId>,
    },
    InventoryTransactionAppended,
    IdempotencyReserved((String, IdempotencyKey)),
    IdempotencyCompleted((String, IdempotencyKey)),
    AuditAppended { prior_next_id: u64 },
}

/// All rows owned by one yacht.
///
/// Every mutation records its inverse in a journal. The store commits (clears) the journal when a
/// transaction succeeds and replays it backwards when one fails, so a rollback touches only the
/// rows the transaction wrote.
#[derive(Debug)]
pub struct TenantPartition {
    yacht_id: YachtId,
    faults: BTreeMap<FaultId, FaultRecord>,
    work_orders: BTreeMap<WorkOrderId, WorkOrderRecord>,
    parts: BTreeMap<PartId, PartRecord>,
    inventory_transactions: Vec<InventoryTransaction>,
    shopping_list_items: BTreeMap<ShoppingListItemId, ShoppingListItemRecord>,
    certificates: BTreeMap<CertificateId, CertificateRecord>,
    warranty_claims: BTreeMap<WarrantyClaimId, WarrantyClaimRecord>,
    rest_records: BTreeMap<RestRecordId, HoursOfRestRecord>,
    // (user_id, record_date) -> record_id; one record per user per day.
    rest_record_index: BTreeMap<(UserId, CalendarDate), RestRecordId>,
    rest_warnings: BTreeMap<RestWarningId, RestWarningRecord>,
    monthly_signoffs: BTreeMap<MonthlySignoffId, MonthlySignoffRecord>,
    // (user_id, month) -> signoff_id; one sign-off per user per month.
    signoff_index: BTreeMap<(UserId, CalendarMonth), MonthlySignoffId>,
    handover_drafts: BTreeMap<HandoverDraftId, HandoverDraftRecord>,
    handover_exports: BTreeMap<HandoverExportId, HandoverExportRecord>,
    // (action_id, idempotency_key) -> record; the tenant is the partition itself.
    idempotency_records: BTreeMap<(String, IdempotencyKey), IdempotencyRecord>,
    audit_entries: Vec<AuditEntry>,
    next_audit_id: u64,
    journal: Vec<Undo>,
}

impl TenantPartition {
    pub fn new(yacht_id: YachtId) -> Self {
        Self {
            yacht_id,
            faults: BTreeMap::new(),
            work_orders: BTreeMap::new(),
            parts: BTreeMap::new(),
            inventory_transactions: Vec::new(),
            shopping_list_items: BTreeMap::new(),
            certificates: BTreeMap::new(),
            warranty_claims: BTreeMap::new(),
            rest_records: BTreeMap::new(),
            rest_record_index: BTreeMap::new(),
            rest_warnings: BTreeMap::new(),
            monthly_signoffs: BTreeMap::new(),
            signoff_index: BTreeMap::new(),
            handover_drafts: BTreeMap::new(),
            handover_exports: BTreeMap::new(),
            idempotency_records: BTreeMap::new(),
            audit_entries: Vec::new(),
            next_audit_id: 1,
            journal: Vec::new(),
        }
    }

    pub fn yacht_id(&self) -> &YachtId {
        &self.yacht_id
    }

    fn check_tenant(&self, table: &'static str, yacht_id: &YachtId) -> Result<(), StorageError> {
        if yacht_id != &self.yacht_id {
            return Err(StorageError::TenantMismatch { table });
        }
        Ok(())
    }

    pub fn apply(&mut self, write: EntityWrite) -> Result<(), StorageError> {
        match write {
            EntityWrite::Insert(row) => self.write_row(row, WriteMode::Insert),
            EntityWrite::Update(row) => self.write_row(row, WriteMode::Update),
            EntityWrite::AppendInventoryTransaction(tx) => self.append_inventory_transaction(tx),
        }
    }

    fn write_row(&mut self, row: EntityRow, mode: WriteMode) -> Result<(), StorageError> {
        row.validate()?;
        self.check_tenant(row.entity_type().as_str(), row.yacht_id())?;
        let entity_type = row.entity_type();
        let entity_id = row.entity_id().to_string();
        let prior = self.row(entity_type, &entity_id);
        self.put_row(row, mode)?;
        self.journal.push(Undo::Row {
            entity_type,
            entity_id,
            prior,
        });
        Ok(())
    }

    fn put_row(&mut self, row: EntityRow, mode: WriteMode) -> Result<(), StorageError> {
        match row {
            EntityRow::Fault(r) => put("faults", &mut self.faults, r.fault_id.clone(), r, mode),
            EntityRow::WorkOrder(r) => {
                if let Some(f) = &r.fault_id {
                    if !self.faults.contains_key(f) {
                        return Err(StorageError::ForeignKeyViolation {
                            table: "work_orders.fault_id",
                            key: f.to_string(),
                        });
                    }
                }
                put("work_orders", &mut self.work_orders, r.work_order_id.clone(), r, mode)
            }
            EntityRow::Part(r) => put("parts", &mut self.parts, r.part_id.clone(), r, mode),
            EntityRow::ShoppingListItem(r) => {
                if let Some(p) = &r.promoted_part_id {
                    if !self.parts.contains_key(p) {
                        return Err(StorageError::ForeignKeyViolation {
                            table: "shopping_list_items.promoted_part_id",
                            key: p.to_string(),
                        });
                    }
                }
                put(
                    "shopping_list_items",
                    &mut self.shopping_list_items,
                    r.item_id.clone(),
                    r,
                    mode,
                )
            }
            EntityRow::Certificate(r) => put(
                "certificates",
                &mut self.certificates,
                r.certificate_id.clone(),
                r,
                mode,
            ),
            EntityRow::WarrantyClaim(r) => put(
                "warranty_claims",
                &mut self.warranty_claims,
                r.claim_id.clone(),
                r,
                mode,
            ),
            EntityRow::RestRecord(r) => {
                let idx = (r.user_id.clone(), r.record_date);
                match (mode, self.rest_record_index.get(&idx)) {
                    (WriteMode::Insert, Some(_)) => {
                        return Err(StorageError::DuplicateKey {
                            table: "hours_of_rest_records.user_date",
                            key: format!("{}:{}", r.user_id, r.record_date),
                        })
                    }
                    (WriteMode::Update, Some(existing)) if existing != &r.record_id => {
                        return Err(StorageError::DuplicateKey {
                            table: "hours_of_rest_records.user_date",
                            key: format!("{}:{}", r.user_id, r.record_date),
                        })
                    }
                    _ => {}
                }
                let id = r.record_id.clone();
                put("hours_of_rest_records", &mut self.rest_records, id.clone(), r, mode)?;
                let prior = self.rest_record_index.insert(idx.clone(), id);
                self.journal.push(Undo::RestRecordIndex { key: idx, prior });
                Ok(())
            }
            EntityRow::RestWarning(r) => {
                if !self.rest_records.contains_key(&r.record_id) {
                    return Err(StorageError::ForeignKeyViolation {
                        table: "rest_warnings.record_id",
                        key: r.record_id.to_string(),
                    });
                }
                put("rest_warnings", &mut self.rest_warnings, r.warning_id.clone(), r, mode)
            }
            EntityRow::MonthlySignoff(r) => {
                let idx = (r.user_id.clone(), r.month);
                if mode == WriteMode::Insert && self.signoff_index.contains_key(&idx) {
                    return Err(StorageError::DuplicateKey {
                        table: "monthly_signoffs.user_month",
                        key: format!("{}:{}", r.user_id, r.month),
                    });
                }
                let id = r.signoff_id.clone();
                put("monthly_signoffs", &mut self.monthly_signoffs, id.clone(), r, mode)?;
                let prior = self.signoff_index.insert(idx.clone(), id);
                self.journal.push(Undo::SignoffIndex { key: idx, prior });
                Ok(())
            }
            EntityRow::HandoverDraft(r) => put(
                "handover_drafts",
                &mut self.handover_drafts,
                r.draft_id.clone(),
                r,
                mode,
            ),
            EntityRow::HandoverExport(r) => {
                if !self.handover_drafts.contains_key(&r.draft_id) {
                    return Err(StorageError::ForeignKeyViolation {
                        table: "handover_exports.draft_id",
                        key: r.draft_id.to_string(),
                    });
                }
                put(
                    "handover_exports",
                    &mut self.handover_exports,
                    r.export_id.clone(),
                    r,
                    mode,
                )
            }
        }
    }

    fn append_inventory_transaction(&mut self, tx: InventoryTransaction) -> Result<(), StorageError> {
        tx.validate()?;
        self.check_tenant("inventory_transactions", &tx.yacht_id)?;
        if !self.parts.contains_key(&tx.part_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "inventory_transactions.part_id",
                key: tx.part_id.to_string(),
            });
        }
        if self
            .inventory_transactions
            .iter()
            .any(|t| t.transaction_id == tx.transaction_id)
        {
            return Err(StorageError::DuplicateKey {
                table: "inventory_transactions",
                key: tx.transaction_id.to_string(),
            });
        }
        self.inventory_transactions.push(tx);
        self.journal.push(Undo::InventoryTransactionAppended);
        Ok(())
    }

    /// Clone of one entity row, used to journal the value a write replaces.
    fn row(&self, entity_type: EntityType, entity_id: &str) -> Option<EntityRow> {
        fn get<K: Ord, V: Clone>(map: &BTreeMap<K, V>, key: Option<K>) -> Option<V> {
            key.and_then(|k| map.get(&k).cloned())
        }
        match entity_type {
            EntityType::Fault => get(&self.faults, FaultId::new(entity_id).ok()).map(EntityRow::Fault),
            EntityType::WorkOrder => {
                get(&self.work_orders, WorkOrderId::new(entity_id).ok()).map(EntityRow::WorkOrder)
            }
            EntityType::Part => get(&self.parts, PartId::new(entity_id).ok()).map(EntityRow::Part),
            EntityType::ShoppingListItem => get(
                &self.shopping_list_items,
                ShoppingListItemId::new(entity_id).ok(),
            )
            .map(EntityRow::ShoppingListItem),
            EntityType::Certificate => get(&self.certificates, CertificateId::new(entity_id).ok())
                .map(EntityRow::Certificate),
            EntityType::WarrantyClaim => {
                get(&self.warranty_claims, WarrantyClaimId::new(entity_id).ok())
                    .map(EntityRow::WarrantyClaim)
            }
            EntityType::HoursOfRestRecord => {
                get(&self.rest_records, RestRecordId::new(entity_id).ok()).map(EntityRow::RestRecord)
            }
            EntityType::RestWarning => get(&self.rest_warnings, RestWarningId::new(entity_id).ok())
                .map(EntityRow::RestWarning),
            EntityType::MonthlySignoff => {
                get(&self.monthly_signoffs, MonthlySignoffId::new(entity_id).ok())
                    .map(EntityRow::MonthlySignoff)
            }
            EntityType::HandoverDraft => {
                get(&self.handover_drafts, HandoverDraftId::new(entity_id).ok())
                    .map(EntityRow::HandoverDraft)
            }
            EntityType::HandoverExport => {
                get(&self.handover_exports, HandoverExportId::new(entity_id).ok())
                    .map(EntityRow::HandoverExport)
            }
            EntityType::AuditEntry => None,
        }
    }

    fn restore_row(&mut self, row: EntityRow) {
        match row {
            EntityRow::Fault(r) => {
                self.faults.insert(r.fault_id.clone(), r);
            }
            EntityRow::WorkOrder(r) => {
                self.work_orders.insert(r.work_order_id.clone(), r);
            }
            EntityRow::Part(r) => {
                self.parts.insert(r.part_id.clone(), r);
            }
            EntityRow::ShoppingListItem(r) => {
                self.shopping_list_items.insert(r.item_id.clone(), r);
            }
            EntityRow::Certificate(r) => {
                self.certificates.insert(r.certificate_id.clone(), r);
            }
            EntityRow::WarrantyClaim(r) => {
                self.warranty_claims.insert(r.claim_id.clone(), r);
            }
            EntityRow::RestRecord(r) => {
                self.rest_records.insert(r.record_id.clone(), r);
            }
            EntityRow::RestWarning(r) => {
                self.rest_warnings.insert(r.warning_id.clone(), r);
            }
            EntityRow::MonthlySignoff(r) => {
                self.monthly_signoffs.insert(r.signoff_id.clone(), r);
            }
            EntityRow::HandoverDraft(r) => {
                self.handover_drafts.insert(r.draft_id.clone(), r);
            }
            EntityRow::HandoverExport(r) => {
                self.handover_exports.insert(r.export_id.clone(), r);
            }
        }
    }

    fn remove_row(&mut self, entity_type: EntityType, entity_id: &str) {
        fn remove<K: Ord, V>(map: &mut BTreeMap<K, V>, key: Option<K>) {
            if let Some(k) = key {
                map.remove(&k);
            }
        }
        match entity_type {
            EntityType::Fault => remove(&mut self.faults, FaultId::new(entity_id).ok()),
            EntityType::WorkOrder => remove(&mut self.work_orders, WorkOrderId::new(entity_id).ok()),
            EntityType::Part => remove(&mut self.parts, PartId::new(entity_id).ok()),
            EntityType::ShoppingListItem => remove(
                &mut self.shopping_list_items,
                ShoppingListItemId::new(entity_id).ok(),
            ),
            EntityType::Certificate => {
                remove(&mut self.certificates, CertificateId::new(entity_id).ok())
            }
            EntityType::WarrantyClaim => {
                remove(&mut self.warranty_claims, WarrantyClaimId::new(entity_id).ok())
            }
            EntityType::HoursOfRestRecord => {
                remove(&mut self.rest_records, RestRecordId::new(entity_id).ok())
            }
            EntityType::RestWarning => {
                remove(&mut self.rest_warnings, RestWarningId::new(entity_id).ok())
            }
            EntityType::MonthlySignoff => {
                remove(&mut self.monthly_signoffs, MonthlySignoffId::new(entity_id).ok())
            }
            EntityType::HandoverDraft => {
                remove(&mut self.handover_drafts, HandoverDraftId::new(entity_id).ok())
            }
            EntityType::HandoverExport => {
                remove(&mut self.handover_exports, HandoverExportId::new(entity_id).ok())
            }
            EntityType::AuditEntry => {}
        }
    }

    /// Makes every change since the last commit permanent.
    pub(crate) fn commit(&mut self) {
        self.journal.clear();
    }

    /// Reverts every change since the last commit, newest first.
    pub(crate) fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Row {
                    prior: Some(row), ..
                } => self.restore_row(row),
                Undo::Row {
                    entity_type,
                    entity_id,
                    prior: None,
                } => self.remove_row(entity_type, &entity_id),
                Undo::RestRecordIndex { key, prior } => {
                    restore_entry(&mut self.rest_record_index, key, prior)
                }
                Undo::SignoffIndex { key, prior } => {
                    restore_entry(&mut self.signoff_index, key, prior)
                }
                Undo::InventoryTransactionAppended => {
                    self.inventory_transactions.pop();
                }
                Undo::IdempotencyReserved(key) => {
                    self.idempotency_records.remove(&key);
                }
                Undo::IdempotencyCompleted(key) => {
                    if let Some(record) = self.idempotency_records.get_mut(&key) {
                        record.result_snapshot = None;
                    }
                }
                Undo::AuditAppended { prior_next_id } => {
                    self.audit_entries.pop();
                    self.next_audit_id = prior_next_id;
                }
            }
        }
    }

    pub fn attempt_overwrite_inventory_transaction(
        &mut self,
        _transaction_id: &str,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "inventory_transactions",
        })
    }

    pub fn fault(&self, id: &FaultId) -> Option<&FaultRecord> {
        self.faults.get(id)
    }

    pub fn work_order(&self, id: &WorkOrderId) -> Option<&WorkOrderRecord> {
        self.work_orders.get(id)
    }

    pub fn work_orders_for_fault(&self, fault_id: &FaultId) -> Vec<&WorkOrderRecord> {
        self.work_orders
            .values()
            .filter(|w| w.fault_id.as_ref() == Some(fault_id))
            .collect()
    }

    pub fn part(&self, id: &PartId) -> Option<&PartRecord> {
        self.parts.get(id)
    }

    pub fn inventory_transactions_for(&self, part_id: &PartId) -> Vec<&InventoryTransaction> {
        self.inventory_transactions
            .iter()
            .filter(|t| &t.part_id == part_id)
            .collect()
    }

    pub fn inventory_transactions(&self) -> &[InventoryTransaction] {
        &self.inventory_transactions
    }

    pub fn shopping_list_item(&self, id: &ShoppingListItemId) -> Option<&ShoppingListItemRecord> {
        self.shopping_list_items.get(id)
    }

    pub fn certificate(&self, id: &CertificateId) -> Option<&CertificateRecord> {
        self.certificates.get(id)
    }

    pub fn warranty_claim(&self, id: &WarrantyClaimId) -> Option<&WarrantyClaimRecord> {
        self.warranty_claims.get(id)
    }

    pub fn rest_record(&self, id: &RestRecordId) -> Option<&HoursOfRestRecord> {
        self.rest_records.get(id)
    }

    pub fn rest_record_for_day(
        &self,
        user_id: &UserId,
        date: CalendarDate,
    ) -> Option<&HoursOfRestRecord> {
        self.rest_record_index
            .get(&(user_id.clone(), date))
            .and_then(|id| self.rest_records.get(id))
    }

    pub fn rest_records_for_month(
        &self,
        user_id: &UserId,
        month: CalendarMonth,
    ) -> Vec<&HoursOfRestRecord> {
        self.rest_record_index
            .range((user_id.clone(), CalendarDate { year: month.year, month: month.month, day: 1 })..)
            .take_while(|((u, d), _)| u == user_id && d.month() == month)
            .filter_map(|(_, id)| self.rest_records.get(id))
            .collect()
    }

    pub fn rest_warning(&self, id: &RestWarningId) -> Option<&RestWarningRecord> {
        self.rest_warnings.get(id)
    }

    pub fn rest_warnings_for_record(&self, record_id: &RestRecordId) -> Vec<&RestWarningRecord> {
        self.rest_warnings
            .values()
            .filter(|w| &w.record_id == record_id)
            .collect()
    }

    pub fn monthly_signoff(&self, id: &MonthlySignoffId) -> Option<&MonthlySignoffRecord> {
        self.monthly_signoffs.get(id)
    }

    pub fn signoff_for_month(
        &self,
        user_id: &UserId,
        month: CalendarMonth,
    ) -> Option<&MonthlySignoffRecord> {
        self.signoff_index
            .get(&(user_id.clone(), month))
            .and_then(|id| self.monthly_signoffs.get(id))
    }

    pub fn handover_draft(&self, id: &HandoverDraftId) -> Option<&HandoverDraftRecord> {
        self.handover_drafts.get(id)
    }

    pub fn handover_export(&self, id: &HandoverExportId) -> Option<&HandoverExportRecord> {
        self.handover_exports.get(id)
    }

    pub(crate) fn reserve_idempotency_record(
        &mut self,
        action_id: &str,
        key: IdempotencyKey,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError> {
        let idx = (action_id.to_string(), key.clone());
        if self.idempotency_records.contains_key(&idx) {
            return Err(StorageError::DuplicateKey {
                table: "idempotency_records",
                key: key.as_str().to_string(),
            });
        }
        let record = IdempotencyRecord {
            yacht_id: self.yacht_id.clone(),
            action_id: action_id.to_string(),
            idempotency_key: key,
            created_at: now,
            result_snapshot: None,
        };
        record.validate()?;
        self.idempotency_records.insert(idx.clone(), record);
        self.journal.push(Undo::IdempotencyReserved(idx));
        Ok(())
    }

    pub(crate) fn complete_idempotency_record(
        &mut self,
        action_id: &str,
        key: &IdempotencyKey,
        result_snapshot: String,
    ) -> Result<(), StorageError> {
        let idx = (action_id.to_string(), key.clone());
        let Some(record) = self.idempotency_records.get_mut(&idx) else {
            return Err(StorageError::RowMissing {
                table: "idempotency_records",
                key: key.as_str().to_string(),
            });
        };
        if record.result_snapshot.is_some() {
            return Err(StorageError::AppendOnlyViolation {
                table: "idempotency_records",
            });
        }
        record.result_snapshot = Some(result_snapshot);
        self.journal.push(Undo::IdempotencyCompleted(idx));
        Ok(())
    }

    pub(crate) fn idempotency_record_row(
        &self,
        action_id: &str,
        key: &IdempotencyKey,
    ) -> Option<&IdempotencyRecord> {
        self.idempotency_records
            .get(&(action_id.to_string(), key.clone()))
    }

    pub(crate) fn idempotency_record_count(&self) -> usize {
        self.idempotency_records.len()
    }

    pub fn attempt_overwrite_idempotency_record(
        &mut self,
        _action_id: &str,
        _key: &IdempotencyKey,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "idempotency_records",
        })
    }

    pub(crate) fn append_audit_entry(
        &mut self,
        input: AuditEntryInput,
    ) -> Result<AuditEntryId, StorageError> {
        input.validate()?;
        self.check_tenant("audit_entries", &input.yacht_id)?;
        let audit_id = AuditEntryId(self.next_audit_id);
        let entry = AuditEntry::from_input_v1(audit_id, input)?;
        self.journal.push(Undo::AuditAppended {
            prior_next_id: self.next_audit_id,
        });
        self.next_audit_id = self.next_audit_id.saturating_add(1);
        self.audit_entries.push(entry);
        Ok(audit_id)
    }

    pub(crate) fn audit_entries(&self) -> &[AuditEntry] {
        &self.audit_entries
    }

    pub(crate) fn audit_entries_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Vec<&AuditEntry> {
        self.audit_entries
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .collect()
    }

    pub fn attempt_overwrite_audit_entry(
        &mut self,
        _audit_id: AuditEntryId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "audit_entries",
        })
    }

    /// Whether `entity_type/entity_id` names a row in this partition.
    pub fn entity_exists(&self, entity_type: EntityType, entity_id: &str) -> bool {
        fn has<K: Ord, V>(map: &BTreeMap<K, V>, key: Option<K>) -> bool {
            key.map(|k| map.contains_key(&k)).unwrap_or(false)
        }
        match entity_type {
            EntityType::Fault => has(&self.faults, FaultId::new(entity_id).ok()),
            EntityType::WorkOrder => has(&self.work_orders, WorkOrderId::new(entity_id).ok()),
            EntityType::Part => has(&self.parts, PartId::new(entity_id).ok()),
            EntityType::ShoppingListItem => has(
                &self.shopping_list_items,
                ShoppingListItemId::new(entity_id).ok(),
            ),
            EntityType::Certificate => {
                has(&self.certificates, CertificateId::new(entity_id).ok())
            }
            EntityType::WarrantyClaim => {
                has(&self.warranty_claims, WarrantyClaimId::new(entity_id).ok())
            }
            EntityType::HoursOfRestRecord => {
                has(&self.rest_records, RestRecordId::new(entity_id).ok())
            }
            EntityType::RestWarning => {
                has(&self.rest_warnings, RestWarningId::new(entity_id).ok())
            }
            EntityType::MonthlySignoff => {
                has(&self.monthly_signoffs, MonthlySignoffId::new(entity_id).ok())
            }
            EntityType::HandoverDraft => {
                has(&self.handover_drafts, HandoverDraftId::new(entity_id).ok())
            }
            EntityType::HandoverExport => {
                has(&self.handover_exports, HandoverExportId::new(entity_id).ok())
            }
            EntityType::AuditEntry => entity_id
                .parse::<u64>()
                .map(|n| self.audit_entries.iter().any(|e| e.audit_id.0 == n))
                .unwrap_or(false),
        }
    }
}
