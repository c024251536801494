// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Body, query and cookie parsing
//!
//! [`parse_input`] reads JSON and URL-encoded bodies, the query string and
//! cookies into a [`RequestInput`] request extension. The sanitization and
//! pollution stages edit that extension in place, and [`materialize_input`]
//! writes the result back into the request so that ordinary extractors
//! (`Json`, `Form`, `Query`) downstream see the cleaned input too.
//!
//! Query strings and forms use bracket notation for nesting:
//! `price[gte]=10` parses to `{"price": {"gte": "10"}}`, `tag[]=a` to
//! `{"tag": ["a"]}`, and repeating a plain key collects its values into an
//! array in arrival order. Nesting stops after [`MAX_DEPTH`] bracket
//! segments; whatever brackets remain are kept as one literal key, so
//! `a[b][c][d][e][f][g][h]=1` nests five levels and ends in a `"[g][h]"` key.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    middleware::Next,
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Map, Value};
use tracing::debug;
use url::form_urlencoded;

use crate::error::AppError;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Deepest bracket nesting parsed from a query string or form key
pub const MAX_DEPTH: usize = 5;

/// Largest body the parsers will buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

/// How the request body was handled by the parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyKind {
    /// No content type; the body was left untouched
    #[default]
    Absent,
    /// JSON, parsed into [`RequestInput::body`]
    Json,
    /// URL-encoded form, parsed into [`RequestInput::body`]
    Form,
    /// Any other content type (multipart uploads and the like), left untouched
    Passthrough,
}

/// Parsed request input shared by the parsing and sanitization stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInput {
    /// Parsed body, `Null` when there is none
    pub body: Value,
    /// Parsed query string
    pub query: Map<String, Value>,
    /// Cookies by name
    pub cookies: Map<String, Value>,
    /// Query keys whose repeated values were collapsed, with the original values
    pub polluted_query: Map<String, Value>,
    /// Form keys whose repeated values were collapsed, with the original values
    pub polluted_body: Map<String, Value>,
    /// How the body was parsed
    pub body_kind: BodyKind,
}

impl RequestInput {
    /// Body fields when the body is an object
    pub fn body_fields(&self) -> Option<&Map<String, Value>> {
        self.body.as_object()
    }
}

/// Parse body, query and cookies into a [`RequestInput`]
pub async fn parse_input(
    State(limit): State<BodyLimit>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    let query = parts
        .uri
        .query()
        .map(|raw| parse_params(raw.as_bytes()))
        .unwrap_or_default();
    let cookies = parse_cookies(&parts.headers);
    let body_kind = body_kind(&parts.headers);

    let (value, body) = match body_kind {
        BodyKind::Json | BodyKind::Form => {
            let bytes = read_limited(body, limit).await?;
            let value = if bytes.is_empty() {
                Value::Null
            } else if body_kind == BodyKind::Json {
                serde_json::from_slice(&bytes)
                    .map_err(|e| AppError::bad_request(format!("Invalid JSON body: {e}")))?
            } else {
                Value::Object(parse_params(&bytes))
            };
            (value, Body::from(bytes))
        }
        BodyKind::Absent | BodyKind::Passthrough => (Value::Null, body),
    };

    parts.extensions.insert(RequestInput {
        body: value,
        query,
        cookies,
        body_kind,
        ..RequestInput::default()
    });

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Write the sanitized [`RequestInput`] back into the query string and body
pub async fn materialize_input(req: Request, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let Some(input) = parts.extensions.get::<RequestInput>().cloned() else {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };

    if parts.uri.query().is_some() {
        parts.uri = with_query(&parts.uri, &encode_params(&input.query))?;
    }

    let encoded = match input.body_kind {
        BodyKind::Json if input.body.is_null() => Some(Bytes::new()),
        BodyKind::Json => Some(Bytes::from(serde_json::to_vec(&input.body).map_err(|e| {
            AppError::internal(format!("failed to re-encode request body: {e}"))
        })?)),
        BodyKind::Form => Some(Bytes::from(match input.body_fields() {
            Some(fields) => encode_params(fields),
            None => String::new(),
        })),
        BodyKind::Absent | BodyKind::Passthrough => None,
    };

    let body = match encoded {
        Some(bytes) => {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Body::from(bytes)
        }
        None => body,
    };

    Ok(next.run(Request::from_parts(parts, body)).await)
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return BodyKind::Absent;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == JSON_CONTENT_TYPE || essence.ends_with("+json") {
        BodyKind::Json
    } else if essence == FORM_CONTENT_TYPE {
        BodyKind::Form
    } else {
        BodyKind::Passthrough
    }
}

async fn read_limited(body: Body, BodyLimit(limit): BodyLimit) -> Result<Bytes, AppError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(error) if error.is::<LengthLimitError>() => Err(AppError::operational(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {limit} bytes"),
        )),
        Err(error) => Err(AppError::bad_request(format!(
            "failed to read request body: {error}"
        ))),
    }
}

/// Parse `application/x-www-form-urlencoded` pairs with bracket nesting
pub fn parse_params(raw: &[u8]) -> Map<String, Value> {
    let mut params = Map::new();
    for (key, value) in form_urlencoded::parse(raw) {
        let segments = key_segments(&key);
        insert_param(&mut params, &segments, value.into_owned());
    }
    params
}

fn key_segments(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[').filter(|&open| open > 0 && key.ends_with(']')) else {
        return vec![key];
    };

    let mut segments = vec![&key[..open]];
    let mut rest = &key[open..];
    while segments.len() <= MAX_DEPTH {
        let Some((segment, tail)) = rest
            .strip_prefix('[')
            .and_then(|inner| inner.split_once(']'))
        else {
            break;
        };
        segments.push(segment);
        rest = tail;
    }

    if !rest.is_empty() {
        segments.push(rest);
    }
    segments
}

fn insert_param(target: &mut Map<String, Value>, segments: &[&str], value: String) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match rest.first() {
        None => append_value(target, head, Value::String(value)),
        Some(next) if next.is_empty() => match target
            .entry((*head).to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => items.push(Value::String(value)),
            other => {
                let previous = other.take();
                *other = Value::Array(vec![previous, Value::String(value)]);
            }
        },
        Some(_) => match target
            .entry((*head).to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(nested) => insert_param(nested, rest, value),
            _ => debug!(key = *head, "ignoring nested parameter that conflicts with a flat one"),
        },
    }
}

fn append_value(target: &mut Map<String, Value>, key: &str, value: Value) {
    match target.get_mut(key) {
        None => {
            target.insert(key.to_string(), value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
    }
}

/// Encode parameters back to `application/x-www-form-urlencoded`
pub fn encode_params(params: &Map<String, Value>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        encode_value(&mut serializer, key, value);
    }
    serializer.finish()
}

fn encode_value(serializer: &mut form_urlencoded::Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Null => {
            serializer.append_pair(key, "");
        }
        Value::String(text) => {
            serializer.append_pair(key, text);
        }
        Value::Array(items) => {
            for item in items {
                encode_value(serializer, key, item);
            }
        }
        Value::Object(fields) => {
            for (field, nested) in fields {
                // A literal remainder already carries its brackets
                let nested_key = if field.starts_with('[') {
                    format!("{key}{field}")
                } else {
                    format!("{key}[{field}]")
                };
                encode_value(serializer, &nested_key, nested);
            }
        }
        Value::Bool(_) | Value::Number(_) => {
            serializer.append_pair(key, &value.to_string());
        }
    }
}

fn with_query(uri: &Uri, query: &str) -> Result<Uri, AppError> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{query}", uri.path())
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|e| AppError::internal(format!("failed to rebuild request uri: {e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| AppError::internal(format!("failed to rebuild request uri: {e}")))
}

/// Parse the `Cookie` header into name/value pairs
pub fn parse_cookies(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| {
            (
                name.trim().to_string(),
                Value::String(value.trim().trim_matches('"').to_string()),
            )
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}
