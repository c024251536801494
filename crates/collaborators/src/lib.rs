// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Collaborator traits for the marketplace gateway
//!
//! The gateway owns request plumbing and process lifecycle; everything with
//! business meaning lives behind the traits in this crate.
//!
//! # Core Abstractions
//!
//! - **`BillingService`**: verifies and handles payment-provider webhooks from the exact raw body
//! - **`StoreConnector`**: opens the single store connection shared by every resource router
//! - **`Store`**: the connected handle, shared read-only through [`StoreHandle`]
//!
//! Methods return boxed futures so implementations can be injected as trait
//! objects and swapped for test doubles.

use std::{future::Future, pin::Pin};

pub mod billing;
pub mod store;

pub use billing::{BillingError, BillingService, WebhookReceipt};
pub use store::{Store, StoreConnector, StoreError, StoreHandle};

/// Boxed, sendable future returned by collaborator methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
