// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the marketplace gateway
//!
//! This crate provides common types that are shared across multiple crates
//! in the gateway workspace, avoiding circular dependencies.

pub mod error_value;
pub mod resources;

pub use error_value::ErrorValue;
pub use resources::{API_PREFIX, ResourceKind, ResourceParseError};
