//! Clinic ledger: the operations staff perform, with the accounting rules
//! that keep charges, payments and shifts consistent.
//!
//! Pipeline for every mutating call: Actor check → Permission check →
//! Transaction (change + activity entry) → Commit

mod allocation;
mod reconcile;
mod service;

pub use allocation::*;
pub use reconcile::*;
pub use service::*;

use thiserror::Error;

use crate::audit::AuditError;
use crate::db::DbError;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Over-allocation: {0}")]
    OverAllocation(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
