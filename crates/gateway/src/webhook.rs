// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Payment webhook ingress
//!
//! The route is mounted ahead of the body parsers and buffers the body
//! itself, so the billing collaborator verifies the signature over exactly
//! the bytes the provider sent.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::HeaderMap,
};
use collaborators::{BillingService, WebhookReceipt};
use tracing::debug;

use crate::error::AppError;

/// Path the payment provider posts to
pub const WEBHOOK_PATH: &str = "/webhook";

/// Header carrying the provider signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Forward the raw body and signature to the billing collaborator
pub async fn ingest_webhook(
    State(billing): State<Arc<dyn BillingService>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<WebhookReceipt>, AppError> {
    let payload = body.map_err(|rejection| {
        AppError::operational(rejection.status(), rejection.body_text())
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::bad_request(format!("Webhook Error: missing {SIGNATURE_HEADER} header"))
        })?
        .to_string();

    debug!(bytes = payload.len(), "forwarding webhook to billing");

    let receipt = billing.handle_webhook(payload, signature).await?;
    Ok(Json(receipt))
}
