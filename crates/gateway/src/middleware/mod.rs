// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Request-processing stages
//!
//! Each submodule implements one stage of the pipeline, or a closely related
//! group of stages. Stages communicate through the [`input::RequestInput`]
//! request extension and, on the way out, through the [`AppError`] response
//! extension read by the error translator.
//!
//! [`AppError`]: crate::error::AppError

pub mod access_log;
pub mod cors;
pub mod input;
pub mod pollution;
pub mod sanitize;
pub mod security;
pub mod timeout;

pub use access_log::access_log;
pub use cors::credentialed_cors;
pub use input::{BodyKind, BodyLimit, RequestInput, materialize_input, parse_input};
pub use pollution::{DEFAULT_WHITELIST, ParameterWhitelist, control_pollution};
pub use sanitize::{escape_markup, strip_operators};
pub use security::harden_headers;
pub use timeout::bound_request;
