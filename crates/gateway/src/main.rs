// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Marketplace gateway
//!
//! Exit code 0 after a drain triggered by SIGTERM or SIGINT, 1 after an
//! unhandled rejection, a failed startup or an uncaught fault.

use std::{process::ExitCode, sync::Arc};

use anyhow::Result;
use collaborators::StoreHandle;
use gateway::{Collaborators, Lifecycle, RouteTable, ServerConfig, ShutdownConfig};
use providers::{StripeConfig, StripeWebhookVerifier, TcpStoreConnector};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    info!(environment = %config.environment, "configuration loaded");

    let billing = StripeWebhookVerifier::new(StripeConfig {
        webhook_secret: config.billing.webhook_secret.expose().to_string(),
        tolerance_seconds: config.billing.signature_tolerance_seconds,
    });
    let store = TcpStoreConnector::new(config.connect_timeout());

    let lifecycle = Lifecycle::new(
        config,
        ShutdownConfig::default(),
        Collaborators {
            billing: Arc::new(billing),
            store: Arc::new(store),
            // Resource routers are mounted by their own services
            routes: Box::new(|_store: StoreHandle| RouteTable::placeholders()),
        },
    );
    lifecycle.faults().install_panic_hook();

    // NOTE: the `#[tokio::main]` task does not run a worker future, we must spawn
    let trigger = tokio::spawn(lifecycle.run()).await??;

    Ok(trigger.exit_code())
}
