// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Router dispatcher
//!
//! The route table maps each resource prefix under `/api/v1` to the router
//! of its external collaborator. Requests are handed over unmodified; the
//! table holds no other state.

use std::collections::BTreeMap;

use axum::{Router, http::StatusCode};
use shared_types::ResourceKind;
use thiserror::Error;

use crate::error::AppError;

/// Errors raised while building the route table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Two routers were mounted for the same resource
    #[error("a router is already mounted at {prefix}")]
    AlreadyMounted {
        /// Prefix of the resource
        prefix: &'static str,
    },
}

/// Resource prefixes and the routers serving them
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: BTreeMap<ResourceKind, Router>,
}

impl RouteTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with a placeholder mounted for every resource
    ///
    /// Each placeholder answers 503 until a real router replaces it.
    pub fn placeholders() -> Self {
        let entries = ResourceKind::ALL
            .into_iter()
            .map(|resource| (resource, placeholder(resource)))
            .collect();
        Self { entries }
    }

    /// Mount `router` under the prefix of `resource`
    ///
    /// # Errors
    ///
    /// Returns `RouteError::AlreadyMounted` if the resource already has a router.
    pub fn mount(&mut self, resource: ResourceKind, router: Router) -> Result<(), RouteError> {
        if self.entries.contains_key(&resource) {
            return Err(RouteError::AlreadyMounted {
                prefix: resource.prefix(),
            });
        }
        self.entries.insert(resource, router);
        Ok(())
    }

    /// Mounted resources in table order
    pub fn resources(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.entries.keys().copied()
    }

    /// One router nesting every entry under its prefix
    pub fn into_router(self) -> Router {
        self.entries
            .into_iter()
            .fold(Router::new(), |router, (resource, resource_router)| {
                router.nest(resource.prefix(), resource_router)
            })
    }
}

fn placeholder(resource: ResourceKind) -> Router {
    let name = resource.name();
    Router::new().fallback(move || async move {
        AppError::operational(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("the {name} service is not available"),
        )
    })
}
