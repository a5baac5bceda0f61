#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use keel_kernel_contracts::tenancy::YachtId;
use keel_kernel_contracts::ContractViolation;
use thiserror::Error;

use crate::directory::MasterDirectory;
use crate::partition::TenantPartition;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("foreign key violation on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },
    #[error("duplicate key on {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("append-only violation on {table}")]
    AppendOnlyViolation { table: &'static str },
    #[error("no row in {table} for {key}")]
    RowMissing { table: &'static str, key: String },
    #[error("row in {table} belongs to another tenant")]
    TenantMismatch { table: &'static str },
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),
}

/// Process-wide entity id sequence. Ids are never reused, so a rolled-back transaction leaves a gap.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// `prefix_000042` style id.
    pub fn next(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{n:06}")
    }
}

/// Locks one partition. A poisoned lock means a transaction panicked part-way; its journal still
/// holds the partial writes, so they are rolled back before anyone sees them.
fn lock_partition(handle: &Mutex<TenantPartition>) -> MutexGuard<'_, TenantPartition> {
    match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            guard.rollback();
            handle.clear_poison();
            guard
        }
    }
}

/// Tenant-partitioned in-memory store.
///
/// Each yacht owns one partition behind its own mutex. A transaction runs directly against the
/// locked partition; the partition journals every change and the store commits the journal on
/// `Ok` or replays it backwards on `Err`.
#[derive(Debug)]
pub struct KeelStore {
    partitions: RwLock<BTreeMap<YachtId, Arc<Mutex<TenantPartition>>>>,
    directory: RwLock<MasterDirectory>,
    ids: IdAllocator,
}

impl Default for KeelStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl KeelStore {
    pub fn new_in_memory() -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            directory: RwLock::new(MasterDirectory::new()),
            ids: IdAllocator::new(),
        }
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    fn partition(&self, yacht_id: &YachtId) -> Result<Arc<Mutex<TenantPartition>>, StorageError> {
        {
            let map = self
                .partitions
                .read()
                .map_err(|_| StorageError::LockPoisoned("partitions"))?;
            if let Some(p) = map.get(yacht_id) {
                return Ok(Arc::clone(p));
            }
        }
        let mut map = self
            .partitions
            .write()
            .map_err(|_| StorageError::LockPoisoned("partitions"))?;
        let p = map
            .entry(yacht_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(TenantPartition::new(yacht_id.clone()))));
        Ok(Arc::clone(p))
    }

    /// Read-only view of one tenant. Unknown tenants read as empty.
    pub fn read<T>(
        &self,
        yacht_id: &YachtId,
        f: impl FnOnce(&TenantPartition) -> T,
    ) -> Result<T, StorageError> {
        let handle = {
            let map = self
                .partitions
                .read()
                .map_err(|_| StorageError::LockPoisoned("partitions"))?;
            map.get(yacht_id).map(Arc::clone)
        };
        match handle {
            Some(h) => Ok(f(&lock_partition(&h))),
            None => Ok(f(&TenantPartition::new(yacht_id.clone()))),
        }
    }

    /// Runs `f` as one isolated unit against `yacht_id`'s partition. Concurrent transactions on
    /// the same tenant serialize; transactions on different tenants never contend.
    pub fn transaction<T, E>(
        &self,
        yacht_id: &YachtId,
        f: impl FnOnce(&mut TenantPartition) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let handle = self.partition(yacht_id)?;
        let mut guard = lock_partition(&handle);
        match f(&mut guard) {
            Ok(out) => {
                guard.commit();
                Ok(out)
            }
            Err(e) => {
                guard.rollback();
                Err(e)
            }
        }
    }

    pub fn directory<T>(&self, f: impl FnOnce(&MasterDirectory) -> T) -> Result<T, StorageError> {
        let d = self
            .directory
            .read()
            .map_err(|_| StorageError::LockPoisoned("directory"))?;
        Ok(f(&d))
    }

    pub fn directory_mut<T>(
        &self,
        f: impl FnOnce(&mut MasterDirectory) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut d = self
            .directory
            .write()
            .map_err(|_| StorageError::LockPoisoned("directory"))?;
        let mut staged = d.clone();
        let out = f(&mut staged)?;
        *d = staged;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_kernel_contracts::idempotency::IdempotencyKey;
    use keel_kernel_contracts::MonotonicTimeNs;

    #[test]
    fn at_store_01_ids_are_unique_and_prefixed() {
        let s = KeelStore::new_in_memory();
        let a = s.ids().next("flt");
        let b = s.ids().next("flt");
        assert_ne!(a, b);
        assert!(a.starts_with("flt_"));
        assert_eq!(a.len(), "flt_000001".len());
    }

    #[test]
    fn at_store_02_failed_transaction_leaves_partition_untouched() {
        let s = KeelStore::new_in_memory();
        let y = YachtId::new("yacht_a").unwrap();
        let key = IdempotencyKey::new("K1").unwrap();
        let r: Result<(), StorageError> = s.transaction(&y, |p| {
            p.reserve_idempotency_record("receive_part", key.clone(), MonotonicTimeNs(1))?;
            Err(StorageError::AppendOnlyViolation { table: "t" })
        });
        assert!(r.is_err());
        assert_eq!(s.read(&y, |p| p.idempotency_record_count()).unwrap(), 0);

        s.transaction::<_, StorageError>(&y, |p| {
            p.reserve_idempotency_record("receive_part", key.clone(), MonotonicTimeNs(1))
        })
        .unwrap();
        assert_eq!(s.read(&y, |p| p.idempotency_record_count()).unwrap(), 1);
    }

    #[test]
    fn at_store_03_unknown_tenant_reads_empty() {
        let s = KeelStore::new_in_memory();
        let y = YachtId::new("yacht_nobody").unwrap();
        assert_eq!(s.read(&y, |p| p.audit_entries().len()).unwrap(), 0);
    }

    #[test]
    fn at_store_04_rollback_restores_only_what_the_transaction_wrote() {
        let s = KeelStore::new_in_memory();
        let y = YachtId::new("yacht_a").unwrap();
        let kept = IdempotencyKey::new("K-kept").unwrap();
        s.transaction::<_, StorageError>(&y, |p| {
            p.reserve_idempotency_record("receive_part", kept.clone(), MonotonicTimeNs(1))?;
            p.complete_idempotency_record("receive_part", &kept, "{}".to_string())
        })
        .unwrap();

        let dropped = IdempotencyKey::new("K-dropped").unwrap();
        let r: Result<(), StorageError> = s.transaction(&y, |p| {
            p.reserve_idempotency_record("consume_part", dropped.clone(), MonotonicTimeNs(2))?;
            p.complete_idempotency_record("consume_part", &dropped, "{}".to_string())?;
            Err(StorageError::AppendOnlyViolation { table: "t" })
        });
        assert!(r.is_err());
        s.read(&y, |p| {
            assert_eq!(p.idempotency_record_count(), 1);
            assert!(p.idempotency_record_row("consume_part", &dropped).is_none());
            let row = p.idempotency_record_row("receive_part", &kept).unwrap();
            assert_eq!(row.result_snapshot.as_deref(), Some("{}"));
        })
        .unwrap();
    }

    #[test]
    fn at_store_05_panicking_transaction_is_rolled_back_for_the_next_caller() {
        let s = std::sync::Arc::new(KeelStore::new_in_memory());
        let y = YachtId::new("yacht_a").unwrap();
        let panicked = {
            let s = std::sync::Arc::clone(&s);
            let y = y.clone();
            std::thread::spawn(move || {
                let _: Result<(), StorageError> = s.transaction(&y, |p| {
                    p.reserve_idempotency_record(
                        "receive_part",
                        IdempotencyKey::new("K-half").unwrap(),
                        MonotonicTimeNs(1),
                    )?;
                    panic!("handler bug");
                });
            })
            .join()
        };
        assert!(panicked.is_err());
        let count = s
            .transaction::<_, StorageError>(&y, |p| Ok(p.idempotency_record_count()))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(s.read(&y, |p| p.idempotency_record_count()).unwrap(), 0);
    }
}
