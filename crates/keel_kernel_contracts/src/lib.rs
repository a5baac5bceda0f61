#![forbid(unsafe_code)]

pub mod action;
pub mod audit;
pub mod certificate;
pub mod common;
pub mod fault;
pub mod handover;
pub mod hours_of_rest;
pub mod idempotency;
pub mod inventory;
pub mod lifecycle;
pub mod shopping_list;
pub mod tenancy;
pub mod warranty;
pub mod work_order;

pub use common::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};
