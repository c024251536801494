// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! Two families of errors live here. [`ServerError`] covers process-level
//! failures owned by the lifecycle manager: configuration, binding, the store
//! connection and signal handling. [`AppError`] covers failures inside a
//! request; it never renders a body itself but travels in the response
//! extensions until the error translator picks it up.

use std::{backtrace::Backtrace, net::SocketAddr};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use collaborators::{BillingError, StoreError};
use shared_types::ErrorValue;
use thiserror::Error;

/// Comprehensive error types for server operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server shutdown errors
    #[error("Server shutdown failed: {source}")]
    Shutdown {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Store connection could not be established
    #[error("Store connection failed: {source}")]
    Store {
        /// Underlying store error
        #[from]
        source: StoreError,
    },

    /// Runtime errors during server operation
    #[error("Runtime error: {message}")]
    Runtime {
        /// Error message
        message: String,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },

    /// Signal handling errors
    #[error("Signal handling error: {message}")]
    Signal {
        /// Error message
        message: String,
    },
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<tokio::task::JoinError> for ServerError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

/// An error raised while serving a request
///
/// Converting an `AppError` into a response yields an empty response with the
/// right status and the error attached as an extension. The error translator
/// replaces it with the rendered body.
#[derive(Error, Debug, Clone)]
#[error("{value}")]
pub struct AppError {
    /// Status, message and operational flag
    pub value: ErrorValue,
    /// Captured stack for programming faults
    pub stack: Option<String>,
}

impl AppError {
    /// An expected, user-facing error
    pub fn operational(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            value: ErrorValue::operational(status.as_u16(), message),
            stack: None,
        }
    }

    /// No route, asset or entry document matched `original_url`
    pub fn not_found(original_url: &str) -> Self {
        Self::operational(
            StatusCode::NOT_FOUND,
            format!("Can't find {original_url} on this server!"),
        )
    }

    /// Malformed client input
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, message)
    }

    /// A programming fault; captures the current stack
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            value: ErrorValue::fault(message),
            stack: Some(Backtrace::force_capture().to_string()),
        }
    }

    /// HTTP status of the error
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.value.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Whether the message is safe to show to clients
    pub fn is_operational(&self) -> bool {
        self.value.operational
    }
}

impl From<ErrorValue> for AppError {
    fn from(value: ErrorValue) -> Self {
        let stack = (!value.operational).then(|| Backtrace::force_capture().to_string());
        Self { value, stack }
    }
}

impl From<BillingError> for AppError {
    fn from(error: BillingError) -> Self {
        Self::from(error.to_error_value())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(self);
        response
    }
}
