// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Transport-neutral error value shared by the gateway and its collaborators

use serde::{Deserialize, Serialize};
use thiserror::Error;

const INTERNAL_SERVER_ERROR: u16 = 500;

/// An error raised while serving a request
///
/// Operational errors are expected conditions whose message is safe to show
/// to clients. Anything else is a programming fault and is rendered without
/// detail outside development.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ErrorValue {
    /// HTTP status code to respond with
    pub status_code: u16,
    /// Human-readable message
    pub message: String,
    /// Whether the error is expected and user-facing
    pub operational: bool,
}

impl ErrorValue {
    /// An expected, user-facing error
    pub fn operational(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            operational: true,
        }
    }

    /// An unexpected fault; always answered with 500
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            status_code: INTERNAL_SERVER_ERROR,
            message: message.into(),
            operational: false,
        }
    }

    /// `"fail"` for client errors, `"error"` for everything else
    pub fn status_label(&self) -> &'static str {
        if (400..500).contains(&self.status_code) {
            "fail"
        } else {
            "error"
        }
    }
}
