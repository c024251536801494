// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Parameter-pollution control
//!
//! A repeated query or form key is collapsed to its last value unless the key
//! is whitelisted, in which case the values stay an ordered array. Collapsed
//! arrays are kept in [`RequestInput::polluted_query`] and
//! [`RequestInput::polluted_body`]. JSON bodies are left alone because arrays
//! are legitimate there.

use std::{collections::BTreeSet, sync::Arc};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};
use tracing::debug;

use super::input::{BodyKind, RequestInput};

/// Keys allowed to carry several values
pub const DEFAULT_WHITELIST: [&str; 7] = [
    "ratingsQuantity",
    "ratingsAverage",
    "maxGroupSize",
    "price",
    "date",
    "numberOfViewers",
    "sort",
];

/// Set of keys exempt from collapsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterWhitelist {
    keys: Arc<BTreeSet<String>>,
}

impl ParameterWhitelist {
    /// Whitelist exactly `keys`
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: Arc::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `key` may carry several values
    pub fn allows(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Collapse non-whitelisted arrays in `params` to their last value
    ///
    /// Returns the original arrays of every collapsed key.
    pub fn collapse(&self, params: &mut Map<String, Value>) -> Map<String, Value> {
        let mut polluted = Map::new();
        for (key, value) in params.iter_mut() {
            if self.allows(key) {
                continue;
            }
            if let Value::Array(items) = value {
                let last = items.last().cloned().unwrap_or(Value::Null);
                polluted.insert(key.clone(), std::mem::replace(value, last));
            }
        }
        polluted
    }
}

impl Default for ParameterWhitelist {
    fn default() -> Self {
        Self::new(DEFAULT_WHITELIST)
    }
}

/// Parameter-pollution stage
pub async fn control_pollution(
    State(whitelist): State<ParameterWhitelist>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(input) = req.extensions_mut().get_mut::<RequestInput>() {
        input.polluted_query = whitelist.collapse(&mut input.query);
        if input.body_kind == BodyKind::Form
            && let Value::Object(fields) = &mut input.body
        {
            input.polluted_body = whitelist.collapse(fields);
        }

        if !input.polluted_query.is_empty() || !input.polluted_body.is_empty() {
            debug!(
                query_keys = ?input.polluted_query.keys().collect::<Vec<_>>(),
                body_keys = ?input.polluted_body.keys().collect::<Vec<_>>(),
                "collapsed repeated parameters"
            );
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn whitelisted_keys_keep_every_value() {
        let mut params = json!({ "sort": ["asc", "desc"], "foo": ["1", "2"], "page": "3" })
            .as_object()
            .cloned()
            .expect("object literal");

        let polluted = ParameterWhitelist::default().collapse(&mut params);

        assert_eq!(
            Value::Object(params),
            json!({ "sort": ["asc", "desc"], "foo": "2", "page": "3" })
        );
        assert_eq!(Value::Object(polluted), json!({ "foo": ["1", "2"] }));
    }

    #[test]
    fn custom_whitelist_replaces_default() {
        let whitelist = ParameterWhitelist::new(["foo"]);
        assert!(whitelist.allows("foo"));
        assert!(!whitelist.allows("sort"));
    }
}
