// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error translation
//!
//! Every stage reports failures by returning an [`AppError`], which travels
//! in the response extensions. [`translate_errors`] is the only place that
//! turns one into a body.
//!
//! Error responses built outside the gateway's own stages (axum's method and
//! extractor rejections, file-system failures in the static asset service)
//! carry no [`AppError`]. When such a response has no body or a plain-text
//! one, the translator adopts it as an error with the same status.

use std::any::Any;

use axum::{
    Json,
    body::to_bytes,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use crate::{error::AppError, pipeline::PipelineVariant};

/// Message shown for programming faults in production
pub const GENERIC_FAULT_MESSAGE: &str = "Something went very wrong!";

/// Largest plain-text error body read back as a message
const ADOPTED_BODY_LIMIT: usize = 4 * 1024;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a str>,
}

/// Render `error` for the given variant
///
/// Operational errors keep their status and message. Programming faults
/// become 500; production hides their message and stack.
pub fn render(error: &AppError, variant: PipelineVariant) -> Response {
    let status = error.status();
    let body = if error.is_operational() {
        ErrorBody {
            status: error.value.status_label(),
            message: &error.value.message,
            stack: None,
        }
    } else if variant.is_production() {
        ErrorBody {
            status: "error",
            message: GENERIC_FAULT_MESSAGE,
            stack: None,
        }
    } else {
        ErrorBody {
            status: "error",
            message: &error.value.message,
            stack: error.stack.as_deref(),
        }
    };

    (status, Json(body)).into_response()
}

/// Replace responses carrying an [`AppError`] with the rendered error
pub async fn translate_errors(
    State(variant): State<PipelineVariant>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let mut response = next.run(req).await;

    let mut allow = None;
    let app_error = match response.extensions_mut().remove::<AppError>() {
        Some(app_error) => app_error,
        None if is_bare_error(&response) => {
            allow = response.headers().get(header::ALLOW).cloned();
            adopt(response).await
        }
        None => return response,
    };

    if app_error.is_operational() {
        debug!(
            method = %method,
            uri = %uri,
            status = app_error.status().as_u16(),
            message = %app_error.value.message,
            "operational error"
        );
    } else {
        error!(
            method = %method,
            uri = %uri,
            message = %app_error.value.message,
            stack = app_error.stack.as_deref().unwrap_or_default(),
            "programming fault while serving request"
        );
    }

    let mut rendered = render(&app_error, variant);
    if let Some(allow) = allow {
        rendered.headers_mut().insert(header::ALLOW, allow);
    }
    rendered
}

fn is_bare_error(response: &Response) -> bool {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return false;
    }

    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_none_or(|content_type| content_type.starts_with("text/plain"))
}

async fn adopt(response: Response) -> AppError {
    let status = response.status();
    let message = to_bytes(response.into_body(), ADOPTED_BODY_LIMIT)
        .await
        .ok()
        .map(|body| String::from_utf8_lossy(&body).trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    if status.is_server_error() {
        AppError::internal(format!("{status}: {message}"))
    } else {
        AppError::operational(status, message)
    }
}

/// Turn a caught handler panic into a programming fault
pub fn fault_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::internal(format!("request handler panicked: {detail}")).into_response()
}
