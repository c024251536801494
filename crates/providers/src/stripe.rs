// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Payment-provider webhook verification
//!
//! Signatures arrive in a header of the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`.
//! Each `v1` value is an HMAC-SHA256 of `"{t}." + raw body` keyed with the
//! endpoint secret. Verification runs over the body exactly as received.

use bytes::Bytes;
use chrono::Utc;
use collaborators::{BillingError, BillingService, BoxFuture, WebhookReceipt};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_SCHEME: &str = "v1";
const TIMESTAMP_KEY: &str = "t";
const DEFAULT_TOLERANCE_SECONDS: u64 = 300;

/// Configuration for webhook verification
#[derive(Clone)]
pub struct StripeConfig {
    /// Endpoint signing secret
    pub webhook_secret: String,
    /// Maximum age of a signature in seconds; 0 disables the check
    pub tolerance_seconds: u64,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }
}

/// Billing collaborator that verifies provider signatures
#[derive(Debug, Clone)]
pub struct StripeWebhookVerifier {
    config: StripeConfig,
}

#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
}

impl StripeWebhookVerifier {
    /// Create a verifier from configuration
    pub fn new(config: StripeConfig) -> Self {
        Self { config }
    }

    /// Verify `header` against `payload` at time `now` (unix seconds)
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Configuration` when no secret is configured and
    /// `BillingError::SignatureVerification` when the header is malformed,
    /// stale, or matches none of the expected signatures.
    pub fn verify(&self, payload: &[u8], header: &str, now: i64) -> Result<(), BillingError> {
        if self.config.webhook_secret.is_empty() {
            return Err(BillingError::Configuration {
                message: "webhook signing secret is empty".to_string(),
            });
        }

        let header = SignatureHeader::parse(header)?;

        let tolerance = self.config.tolerance_seconds;
        if tolerance > 0 && now.abs_diff(header.timestamp) > tolerance {
            return Err(BillingError::SignatureVerification {
                message: "timestamp outside the tolerance zone".to_string(),
            });
        }

        let mac = signed_mac(&self.config.webhook_secret, header.timestamp, payload)?;
        let matched = header
            .signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(BillingError::SignatureVerification {
                message: "no signatures found matching the expected signature for payload"
                    .to_string(),
            })
        }
    }
}

impl BillingService for StripeWebhookVerifier {
    fn handle_webhook(
        &self,
        payload: Bytes,
        signature: String,
    ) -> BoxFuture<'_, Result<WebhookReceipt, BillingError>> {
        Box::pin(async move {
            if let Err(error) = self.verify(&payload, &signature, Utc::now().timestamp()) {
                warn!(error = %error, "rejected billing webhook");
                return Err(error);
            }

            let envelope: EventEnvelope =
                serde_json::from_slice(&payload).map_err(|e| BillingError::MalformedPayload {
                    message: e.to_string(),
                })?;

            info!(
                event_id = envelope.id.as_deref().unwrap_or("unknown"),
                event_type = envelope.event_type.as_deref().unwrap_or("unknown"),
                "billing webhook verified"
            );

            Ok(WebhookReceipt::accepted(envelope.id, envelope.event_type))
        })
    }
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self, BillingError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for item in header.split(',') {
            let Some((key, value)) = item.trim().split_once('=') else {
                continue;
            };
            match key {
                TIMESTAMP_KEY => timestamp = value.parse::<i64>().ok(),
                SIGNATURE_SCHEME => match hex::decode(value) {
                    Ok(bytes) => signatures.push(bytes),
                    Err(e) => debug!(error = %e, "skipping undecodable signature"),
                },
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            return Err(BillingError::SignatureVerification {
                message: "unable to extract timestamp and signatures from header".to_string(),
            });
        };

        if signatures.is_empty() {
            return Err(BillingError::SignatureVerification {
                message: format!("no signatures found with expected scheme {SIGNATURE_SCHEME}"),
            });
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BillingError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| BillingError::Configuration {
            message: format!("invalid signing secret: {e}"),
        })?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    Ok(mac)
}

/// Produce a signature header for `payload`, as the provider would
///
/// # Errors
///
/// Returns `BillingError::Configuration` if the secret cannot key an HMAC.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, BillingError> {
    let mac = signed_mac(secret, timestamp, payload)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{TIMESTAMP_KEY}={timestamp},{SIGNATURE_SCHEME}={signature}"))
}
