// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Extractors for resource routers
//!
//! Resource routers read sanitized request input through [`Input`] instead of
//! re-parsing the body themselves.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, RawPathParams},
    http::request::Parts,
};
use serde_json::{Map, Value};

use crate::middleware::{
    RequestInput,
    sanitize::{escape_fields, remove_operator_fields},
};

/// Sanitized body, query, path parameters and cookies of a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Input {
    /// Parsed body, `Null` when there is none or it was not JSON or a form
    pub body: Value,
    /// Query parameters after pollution control
    pub query: Map<String, Value>,
    /// Path parameters of the matched route
    pub params: Map<String, Value>,
    /// Cookies by name
    pub cookies: Map<String, Value>,
}

impl<S> FromRequestParts<S> for Input
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let input = parts
            .extensions
            .get::<RequestInput>()
            .cloned()
            .unwrap_or_default();

        let mut params: Map<String, Value> = match RawPathParams::from_request_parts(parts, state)
            .await
        {
            Ok(raw) => raw
                .iter()
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect(),
            Err(_) => Map::new(),
        };
        remove_operator_fields(&mut params);
        escape_fields(&mut params);

        Ok(Self {
            body: input.body,
            query: input.query,
            params,
            cookies: input.cookies,
        })
    }
}
