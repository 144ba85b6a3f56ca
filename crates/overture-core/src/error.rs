// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for overture-core.
//!
//! Provides a unified error type that maps to transport-layer error codes.

use std::fmt;

use uuid::Uuid;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during submission and bookkeeping.
///
/// Engine failures are *not* represented here: a failing engine call is a
/// recorded outcome (`InvocationState::Failed` plus a
/// [`FailureDetail`](crate::invocation::FailureDetail)), not an error on the
/// caller's path.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// No invocation with the given id exists in the store.
    InvocationNotFound {
        /// The invocation id that was not found.
        invocation_id: Uuid,
    },

    /// An operation name outside the closed operation set was supplied.
    ///
    /// Raised at submission time, before anything is enqueued. The worker
    /// loop never sees an unknown operation.
    UnknownOperation {
        /// The rejected operation name.
        operation: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// A store read or write failed.
    PersistenceError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// The invocation queue is closed because the runtime is shutting down.
    QueueClosed,
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvocationNotFound { .. } => "INVOCATION_NOT_FOUND",
            Self::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::PersistenceError { .. } => "PERSISTENCE_ERROR",
            Self::QueueClosed => "QUEUE_CLOSED",
        }
    }

    /// Build a persistence error from a failed store operation.
    pub(crate) fn persistence(operation: &str, err: impl fmt::Display) -> Self {
        Self::PersistenceError {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvocationNotFound { invocation_id } => {
                write!(f, "Invocation '{}' not found", invocation_id)
            }
            Self::UnknownOperation { operation } => {
                write!(f, "Unknown operation '{}'", operation)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::PersistenceError { operation, details } => {
                write!(f, "Persistence error during '{}': {}", operation, details)
            }
            Self::QueueClosed => {
                write!(f, "Invocation queue is closed")
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::PersistenceError {
            operation: "io".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::PersistenceError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
