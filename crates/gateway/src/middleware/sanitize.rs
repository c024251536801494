// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Input sanitization
//!
//! Two stages run over the body and query held in [`RequestInput`]:
//!
//! - operator sanitization removes every object key that starts with `$` or
//!   contains `.`, at any depth, so input can never smuggle store query
//!   operators
//! - markup sanitization replaces `<` with `&lt;` in keys and string values
//!
//! Path parameters are only known after routing; the [`Input`] extractor
//! applies the same functions to them.
//!
//! [`Input`]: crate::extractors::Input

use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::{Map, Value};
use tracing::warn;

use super::input::RequestInput;

/// Remove operator-like keys from `value`; returns how many were removed
pub fn remove_operator_keys(value: &mut Value) -> usize {
    match value {
        Value::Object(fields) => remove_operator_fields(fields),
        Value::Array(items) => items.iter_mut().map(remove_operator_keys).sum(),
        _ => 0,
    }
}

/// [`remove_operator_keys`] for a map
pub fn remove_operator_fields(fields: &mut Map<String, Value>) -> usize {
    let before = fields.len();
    fields.retain(|key, _| !is_operator_key(key));
    let removed = before - fields.len();
    removed
        + fields
            .values_mut()
            .map(remove_operator_keys)
            .sum::<usize>()
}

fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Escape markup in keys and string values of `value`
pub fn escape_value(value: &mut Value) {
    match value {
        Value::String(text) => escape_text(text),
        Value::Array(items) => items.iter_mut().for_each(escape_value),
        Value::Object(fields) => escape_fields(fields),
        _ => {}
    }
}

/// [`escape_value`] for a map
pub fn escape_fields(fields: &mut Map<String, Value>) {
    if fields.keys().any(|key| key.contains('<')) {
        *fields = std::mem::take(fields)
            .into_iter()
            .map(|(key, value)| (key.replace('<', "&lt;"), value))
            .collect();
    }
    fields.values_mut().for_each(escape_value);
}

fn escape_text(text: &mut String) {
    if text.contains('<') {
        *text = text.replace('<', "&lt;");
    }
}

/// Operator sanitization stage
pub async fn strip_operators(mut req: Request, next: Next) -> Response {
    if let Some(input) = req.extensions_mut().get_mut::<RequestInput>() {
        let removed =
            remove_operator_keys(&mut input.body) + remove_operator_fields(&mut input.query);
        if removed > 0 {
            warn!(removed, uri = %req.uri(), "removed operator keys from request input");
        }
    }
    next.run(req).await
}

/// Markup sanitization stage
pub async fn escape_markup(mut req: Request, next: Next) -> Response {
    if let Some(input) = req.extensions_mut().get_mut::<RequestInput>() {
        escape_value(&mut input.body);
        escape_fields(&mut input.query);
    }
    next.run(req).await
}
