//! Typed errors for batch state operations
//!
//! `BatchNotFound` is deliberately a distinct variant: operator-facing
//! callers map it to a not-found response instead of a generic failure.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch state not found for id {0}")]
    BatchNotFound(i64),

    #[error("no batch state exists for date {0}")]
    BatchNotFoundForDate(NaiveDate),

    #[error("invalid page range: {start}-{end}")]
    InvalidPageRange { start: u32, end: u32 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type BatchResult<T> = Result<T, BatchError>;
