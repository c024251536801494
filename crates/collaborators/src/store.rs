// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Store connection contract
//!
//! The store is connected once at startup and the resulting handle is shared
//! by every resource router for the life of the process.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::BoxFuture;

/// A connected store
pub trait Store: Send + Sync + fmt::Debug {
    /// Description safe to log; never includes credentials
    fn describe(&self) -> String;

    /// Check that the store is still reachable
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the store cannot be reached.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Shared handle to the process-wide store connection
pub type StoreHandle = Arc<dyn Store>;

/// Opens the store connection
pub trait StoreConnector: Send + Sync + fmt::Debug {
    /// Connect using a fully resolved connection string
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the connection string is invalid or the
    /// store is unreachable.
    fn connect<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<StoreHandle, StoreError>>;
}

/// Errors raised while connecting to the store
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StoreError {
    /// Connection string could not be parsed
    #[error("invalid store connection string: {message}")]
    InvalidUri { message: String },

    /// Store refused or dropped the connection
    #[error("store at {address} is unreachable: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Store did not answer within the connect deadline
    #[error("store at {address} did not answer within {timeout_seconds} seconds")]
    Timeout {
        address: String,
        timeout_seconds: u64,
    },
}
