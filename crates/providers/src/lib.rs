// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Concrete collaborators for the marketplace gateway
//!
//! This crate provides the implementations of the `collaborators` traits that
//! the gateway binary wires in by default.
//!
//! # Architecture
//!
//! - [`stripe`]: webhook signature verification over the exact raw body
//! - [`store`]: TCP-level store connector that confirms reachability at startup

pub mod store;
pub mod stripe;

pub use store::{StoreTarget, TcpStore, TcpStoreConnector};
pub use stripe::{StripeConfig, StripeWebhookVerifier, sign_payload};
