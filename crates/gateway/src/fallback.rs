// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Terminal handler for requests no route matched

use std::{path::PathBuf, sync::Arc};

use axum::{
    http::{Method, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{error::AppError, pipeline::PipelineVariant};

/// Resolves unmatched requests according to the pipeline variant
///
/// Production answers unmatched `GET` and `HEAD` requests with the
/// single-page application's entry document. Everything else becomes an
/// operational 404 naming the original URL.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    variant: PipelineVariant,
    spa_entry: Arc<PathBuf>,
}

impl FallbackResolver {
    /// Resolver serving `spa_entry` in production
    pub fn new(variant: PipelineVariant, spa_entry: PathBuf) -> Self {
        Self {
            variant,
            spa_entry: Arc::new(spa_entry),
        }
    }

    /// Produce the fallback response for `method` and `original_uri`
    ///
    /// # Errors
    ///
    /// Returns an operational 404 outside the SPA case, and a programming
    /// fault when the entry document cannot be read.
    pub async fn resolve(&self, method: &Method, original_uri: &Uri) -> Result<Response, AppError> {
        let serves_spa =
            self.variant.is_production() && (method == Method::GET || method == Method::HEAD);

        if !serves_spa {
            let url = original_uri
                .path_and_query()
                .map_or_else(|| original_uri.path(), |pq| pq.as_str());
            return Err(AppError::not_found(url));
        }

        debug!(uri = %original_uri, "serving single-page application entry");
        let document = tokio::fs::read(self.spa_entry.as_path())
            .await
            .map_err(|e| {
                AppError::internal(format!(
                    "failed to read {}: {e}",
                    self.spa_entry.display()
                ))
            })?;

        Ok((
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            document,
        )
            .into_response())
    }
}
