#![forbid(unsafe_code)]

use keel_engines::registry::RegistryError;
use keel_kernel_contracts::lifecycle::IllegalTransition;
use keel_kernel_contracts::ContractViolation;
use keel_storage::StorageError;
use thiserror::Error;

use crate::document::DocumentStoreError;

/// Every way an action can fail. Each variant maps to exactly one wire code and HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MissingField(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    AlreadyPromoted(String),
    #[error("{0}")]
    InsufficientStock(String),
    #[error("{0}")]
    IntegrityFailure(String),
    #[error("duplicate idempotency key '{key}' for action '{action}'")]
    IdempotencyConflict { action: String, key: String },
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::Unauthorized(_) => "UNAUTHORIZED",
            ActionError::Forbidden(_) => "FORBIDDEN",
            ActionError::NotFound(_) => "NOT_FOUND",
            ActionError::MissingField(_) => "MISSING_REQUIRED_FIELD",
            ActionError::Validation(_) => "VALIDATION_FAILED",
            ActionError::InvalidTransition(_) => "INVALID_STATE_TRANSITION",
            ActionError::AlreadyPromoted(_) => "ALREADY_PROMOTED",
            ActionError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            ActionError::IntegrityFailure(_) => "INTEGRITY_FAILURE",
            ActionError::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            ActionError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ActionError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ActionError::Unauthorized(_) => 401,
            ActionError::Forbidden(_) => 403,
            ActionError::NotFound(_) => 404,
            ActionError::MissingField(_) => 400,
            ActionError::Validation(_) => 422,
            ActionError::InvalidTransition(_)
            | ActionError::AlreadyPromoted(_)
            | ActionError::InsufficientStock(_)
            | ActionError::IntegrityFailure(_)
            | ActionError::IdempotencyConflict { .. } => 409,
            ActionError::UpstreamUnavailable(_) => 503,
            ActionError::Internal(_) => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ActionError::Internal(_))
    }

    pub(crate) fn not_found(kind: &str, id: &str) -> Self {
        ActionError::NotFound(format!("{kind} '{id}' not found"))
    }
}

impl From<ContractViolation> for ActionError {
    fn from(v: ContractViolation) -> Self {
        ActionError::Validation(v.to_string())
    }
}

impl From<IllegalTransition> for ActionError {
    fn from(t: IllegalTransition) -> Self {
        ActionError::InvalidTransition(t.message())
    }
}

impl From<RegistryError> for ActionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownAction(id) => {
                ActionError::NotFound(format!("unknown action '{id}'"))
            }
            other => ActionError::Internal(other.to_string()),
        }
    }
}

impl From<DocumentStoreError> for ActionError {
    fn from(e: DocumentStoreError) -> Self {
        ActionError::UpstreamUnavailable(e.to_string())
    }
}

impl From<StorageError> for ActionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ContractViolation(v) => v.into(),
            StorageError::RowMissing { table, key } => {
                ActionError::NotFound(format!("no {table} row '{key}'"))
            }
            StorageError::ForeignKeyViolation { table, key } => {
                ActionError::Validation(format!("{table} references unknown '{key}'"))
            }
            StorageError::DuplicateKey { table, key } => {
                ActionError::Validation(format!("{table} already holds '{key}'"))
            }
            e @ (StorageError::AppendOnlyViolation { .. }
            | StorageError::TenantMismatch { .. }
            | StorageError::LockPoisoned(_)) => ActionError::Internal(e.to_string()),
        }
    }
}
