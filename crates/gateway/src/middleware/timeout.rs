// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Per-request time bound

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::timeout;
use tracing::warn;

use crate::error::AppError;

/// Answers 408 through the error translator when `limit` elapses first
pub async fn bound_request(State(limit): State<Duration>, req: Request, next: Next) -> Response {
    let uri = req.uri().clone();
    match timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(uri = %uri, limit_ms = limit.as_millis(), "request exceeded its time bound");
            AppError::operational(
                StatusCode::REQUEST_TIMEOUT,
                format!("request did not complete within {} ms", limit.as_millis()),
            )
            .into_response()
        }
    }
}
