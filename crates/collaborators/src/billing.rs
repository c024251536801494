// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Billing collaborator contract

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared_types::ErrorValue;
use thiserror::Error;

use crate::BoxFuture;

/// Handles webhooks sent by the payment provider
///
/// Implementations verify `signature` against `payload` exactly as received.
/// The gateway never re-encodes the payload before calling this.
pub trait BillingService: Send + Sync + fmt::Debug {
    /// Verify and handle one webhook delivery
    ///
    /// # Errors
    ///
    /// Returns `BillingError::SignatureVerification` when the signature does
    /// not match the payload, or another variant when handling fails.
    fn handle_webhook(
        &self,
        payload: Bytes,
        signature: String,
    ) -> BoxFuture<'_, Result<WebhookReceipt, BillingError>>;
}

/// Acknowledgement returned to the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    /// Always `true` once the event has been accepted
    pub received: bool,
    /// Provider event identifier, when the payload carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Provider event type, e.g. `checkout.session.completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl WebhookReceipt {
    /// Receipt for an accepted event
    pub fn accepted(event_id: Option<String>, event_type: Option<String>) -> Self {
        Self {
            received: true,
            event_id,
            event_type,
        }
    }
}

/// Errors raised while handling a webhook
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum BillingError {
    /// Signature header is malformed or does not match the payload
    #[error("Webhook Error: {message}")]
    SignatureVerification { message: String },

    /// Signature is valid but the payload is not a provider event
    #[error("Webhook Error: malformed event payload: {message}")]
    MalformedPayload { message: String },

    /// Billing is not configured to verify webhooks
    #[error("billing is not configured: {message}")]
    Configuration { message: String },

    /// Handling the event failed after verification
    #[error("failed to handle billing event: {message}")]
    Handling { message: String },
}

impl BillingError {
    /// Map to the error value reported to the client
    pub fn to_error_value(&self) -> ErrorValue {
        match self {
            Self::SignatureVerification { .. } | Self::MalformedPayload { .. } => {
                ErrorValue::operational(400, self.to_string())
            }
            Self::Configuration { .. } | Self::Handling { .. } => {
                ErrorValue::fault(self.to_string())
            }
        }
    }
}

impl From<BillingError> for ErrorValue {
    fn from(error: BillingError) -> Self {
        error.to_error_value()
    }
}
