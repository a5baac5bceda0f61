#![forbid(unsafe_code)]

pub mod availability;
pub mod document;
pub mod error;
pub mod executor;
pub mod gate;
pub mod handlers;
pub mod payload;

#[cfg(test)]
mod testkit;

pub use error::ActionError;
pub use executor::{ActionEngine, ActionOutcome, ActionRequest};
