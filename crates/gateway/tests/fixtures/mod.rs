// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Test doubles and builders shared by the gateway integration tests

#![allow(dead_code)]

use std::{
    io,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::Bytes,
    response::IntoResponse,
    routing::{get, post},
};
use collaborators::{
    BillingError, BillingService, BoxFuture, Store, StoreConnector, StoreError, StoreHandle,
    WebhookReceipt,
};
use gateway::{
    AppError, Collaborators, Environment, Input, Lifecycle, Pipeline, ResourceKind, RouteTable,
    ServerConfig, ShutdownConfig, config::AssetsConfig,
};
use serde_json::{Value, json};

/// Signature accepted by [`RecordingBilling`]
pub const VALID_SIGNATURE: &str = "t=1700000000,v1=valid";

/// Billing double that records every payload it accepts
#[derive(Debug, Default)]
pub struct RecordingBilling {
    payloads: Mutex<Vec<Bytes>>,
}

impl RecordingBilling {
    pub fn payloads(&self) -> Vec<Bytes> {
        self.payloads.lock().expect("payload lock").clone()
    }
}

impl BillingService for RecordingBilling {
    fn handle_webhook(
        &self,
        payload: Bytes,
        signature: String,
    ) -> BoxFuture<'_, Result<WebhookReceipt, BillingError>> {
        Box::pin(async move {
            if signature != VALID_SIGNATURE {
                return Err(BillingError::SignatureVerification {
                    message: "no signatures found matching the expected signature".to_string(),
                });
            }
            self.payloads.lock().expect("payload lock").push(payload);
            Ok(WebhookReceipt::accepted(
                Some("evt_test".to_string()),
                Some("checkout.session.completed".to_string()),
            ))
        })
    }
}

/// Store that is always reachable
#[derive(Debug)]
pub struct MemoryStore;

impl Store for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Connector that fails `failures` times, then hands out a [`MemoryStore`]
#[derive(Debug, Default)]
pub struct FlakyConnector {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyConnector {
    pub fn reachable() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StoreConnector for FlakyConnector {
    fn connect<'a>(&'a self, _uri: &'a str) -> BoxFuture<'a, Result<StoreHandle, StoreError>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let fail = attempt < self.failures;
        Box::pin(async move {
            if fail {
                Err(StoreError::Unreachable {
                    address: "localhost:27017".to_string(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                })
            } else {
                let store: StoreHandle = Arc::new(MemoryStore);
                Ok(store)
            }
        })
    }
}

/// Resource router echoing what handlers see through [`Input`]
pub fn echo_router() -> Router {
    Router::new()
        .route("/echo", get(echo).post(echo).patch(echo))
        .route("/raw", post(|body: Bytes| async move { body }))
        .route("/typed", post(|Json(body): Json<Value>| async move { Json(body) }))
        .route("/items/{id}", get(echo))
        .route(
            "/explode",
            get(|| async { AppError::internal("product cache was not initialised") }),
        )
        .route(
            "/missing",
            get(|| async { AppError::not_found("/api/v1/product/missing") }),
        )
        .route("/panic", get(panicking))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                "done"
            }),
        )
        .route(
            "/stall",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(300)).await;
                "never"
            }),
        )
}

#[allow(clippy::panic)]
async fn panicking() -> &'static str {
    panic!("product image index out of range")
}

async fn echo(input: Input) -> impl IntoResponse {
    Json(json!({
        "body": input.body,
        "query": input.query,
        "params": input.params,
        "cookies": input.cookies,
    }))
}

/// Route table with [`echo_router`] at the products prefix
pub fn echo_routes() -> RouteTable {
    let mut table = RouteTable::new();
    table
        .mount(ResourceKind::Products, echo_router())
        .expect("products mounted once");
    table
}

pub fn config(environment: Environment) -> ServerConfig {
    ServerConfig {
        environment,
        ..ServerConfig::for_testing()
    }
}

pub fn config_with_assets(environment: Environment, dir: &Path) -> ServerConfig {
    ServerConfig {
        assets: AssetsConfig {
            dir: Some(dir.to_path_buf()),
        },
        ..config(environment)
    }
}

/// In-process pipeline with the echo routes mounted
pub fn pipeline(config: &ServerConfig, billing: Arc<RecordingBilling>) -> Router {
    Pipeline::builder(config, billing)
        .routes(echo_routes())
        .build()
        .into_router()
}

/// Lifecycle manager over a real socket with the echo routes mounted
pub fn lifecycle(
    config: ServerConfig,
    shutdown_config: ShutdownConfig,
    store: Arc<FlakyConnector>,
) -> Lifecycle {
    Lifecycle::new(
        config,
        shutdown_config,
        Collaborators {
            billing: Arc::new(RecordingBilling::default()),
            store,
            routes: Box::new(|_store: StoreHandle| echo_routes()),
        },
    )
}
