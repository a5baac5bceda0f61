#![forbid(unsafe_code)]

pub mod audit;
pub mod directory;
pub mod partition;
pub mod repo;
pub mod store;

pub use partition::{EntityRow, EntityWrite, TenantPartition};
pub use store::{KeelStore, StorageError};
