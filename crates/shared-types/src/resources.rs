// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Resource identifiers for the versioned API surface
//!
//! Every resource collaborator is mounted under `/api/v1/{segment}`. Segments
//! are unique, so prefixes never overlap below the API root.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root under which every resource router is mounted
pub const API_PREFIX: &str = "/api/v1";

/// Resources served by external routers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Product catalogue
    Products,
    /// User accounts and authentication
    Users,
    /// Social posts
    Posts,
    /// Events and their attendees
    Events,
    /// Product and event reviews
    Reviews,
    /// Shopping bag
    Bag,
    /// Saved items
    Wishlist,
    /// User notifications
    Notifications,
    /// Location lookup
    Locations,
    /// Checkout sessions and billing history
    Billing,
}

/// Error returned when a path segment does not name a resource
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource segment: {0}")]
pub struct ResourceParseError(pub String);

impl ResourceKind {
    /// Every resource, in mount order
    pub const ALL: [Self; 10] = [
        Self::Products,
        Self::Users,
        Self::Posts,
        Self::Events,
        Self::Reviews,
        Self::Bag,
        Self::Wishlist,
        Self::Notifications,
        Self::Locations,
        Self::Billing,
    ];

    /// Path segment directly below [`API_PREFIX`]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Products => "product",
            Self::Users => "users",
            Self::Posts => "posts",
            Self::Events => "events",
            Self::Reviews => "reviews",
            Self::Bag => "bag",
            Self::Wishlist => "wishlist",
            Self::Notifications => "notification",
            Self::Locations => "location",
            Self::Billing => "billing",
        }
    }

    /// Full mount prefix, e.g. `/api/v1/product`
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Products => "/api/v1/product",
            Self::Users => "/api/v1/users",
            Self::Posts => "/api/v1/posts",
            Self::Events => "/api/v1/events",
            Self::Reviews => "/api/v1/reviews",
            Self::Bag => "/api/v1/bag",
            Self::Wishlist => "/api/v1/wishlist",
            Self::Notifications => "/api/v1/notification",
            Self::Locations => "/api/v1/location",
            Self::Billing => "/api/v1/billing",
        }
    }

    /// Human-readable name used in log lines and error messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Users => "users",
            Self::Posts => "posts",
            Self::Events => "events",
            Self::Reviews => "reviews",
            Self::Bag => "bag",
            Self::Wishlist => "wishlist",
            Self::Notifications => "notifications",
            Self::Locations => "locations",
            Self::Billing => "billing",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = ResourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.segment() == s)
            .ok_or_else(|| ResourceParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn prefixes_are_built_from_segments() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.prefix(), format!("{API_PREFIX}/{}", kind.segment()));
        }
    }

    #[test]
    fn segments_are_disjoint() {
        let segments: HashSet<_> = ResourceKind::ALL.iter().map(|k| k.segment()).collect();
        assert_eq!(segments.len(), ResourceKind::ALL.len());
    }

    #[test]
    fn parse_from_segment() {
        assert_eq!("bag".parse::<ResourceKind>(), Ok(ResourceKind::Bag));
        assert_eq!(
            "notification".parse::<ResourceKind>(),
            Ok(ResourceKind::Notifications)
        );
        assert!("cart".parse::<ResourceKind>().is_err());
    }
}
