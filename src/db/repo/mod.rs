//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `balances.rs` - balance rows and the CAS balance+record transaction
//! - `billing.rs` - append-only billing record queries
//! - `prices.rs` - price catalog rows
//! - `commission.rs` - commission accounts and idempotent accruals
//! - `settlements.rs` - settlement rows and state transitions
//! - `resources.rs` - billable resources for the daily tick

mod balances;
mod billing;
mod commission;
mod prices;
mod resources;
mod settlements;

use crate::domain::Decimal;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::str::FromStr;

/// Result of an idempotent per-level commission accrual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Idempotency key inserted and account credited.
    Applied,
    /// A row for this (bill, level) already existed; nothing changed.
    AlreadyApplied,
    /// The commission account version moved underneath us; retry.
    VersionConflict,
}

/// Result of a settlement application attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// PENDING settlement created with this id.
    Applied(i64),
    /// requested + already-pending requests would exceed available commission.
    ExceedsAvailable { available: Decimal, pending: Decimal },
    /// The commission account version moved underneath us; retry.
    VersionConflict,
}

/// Result of a settlement state transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Done,
    /// The settlement was not in PENDING.
    NotPending,
    /// The commission account version moved underneath us; retry.
    VersionConflict,
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a decimal column stored as a canonical string.
pub(super) fn decimal_col(row: &sqlx::sqlite::SqliteRow, col: &str) -> Decimal {
    let s: String = row.get(col);
    Decimal::from_str(&s).unwrap_or_default()
}

/// Parse a nullable decimal column.
pub(super) fn opt_decimal_col(row: &sqlx::sqlite::SqliteRow, col: &str) -> Option<Decimal> {
    let s: Option<String> = row.get(col);
    s.and_then(|s| Decimal::from_str(&s).ok())
}
