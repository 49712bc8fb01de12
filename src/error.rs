// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Error taxonomy for the telemetry core

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the core
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced to callers of the core.
///
/// Detection itself never produces one of these: a sample without a crash or
/// theft signature is simply "no event".
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or out-of-range input; nothing was recorded
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown device, vehicle, crash, theft or route reference
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Caller lacks rights over the referenced vehicle or event
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Operation not valid for the current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Confirmation arrived after the window closed; the crash was escalated
    #[error("confirmation window for crash {crash_id} closed at {deadline}")]
    DeadlineExceeded {
        crash_id: Uuid,
        deadline: DateTime<Utc>,
    },

    /// Persistence failed; the operation left no partial mutation and may be retried
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }
}

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("{0}")]
    Backend(String),
}
