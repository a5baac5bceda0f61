#![forbid(unsafe_code)]

pub mod handover_digest;
pub mod registry;
pub mod rest_compliance;
