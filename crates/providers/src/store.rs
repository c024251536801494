// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! TCP-level store connector
//!
//! Resolves the first host of a store connection string and confirms it
//! accepts connections. Credentials are never retained or logged.

use std::{fmt, sync::Arc, time::Duration};

use collaborators::{BoxFuture, Store, StoreConnector, StoreError, StoreHandle};
use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, info};
use url::Url;

const DEFAULT_STORE_PORT: u16 = 27017;
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Where the store lives, without credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    /// Connection scheme, e.g. `mongodb`
    pub scheme: String,
    /// First host of the connection string
    pub host: String,
    /// Port, defaulting to 27017
    pub port: u16,
    /// Database name from the path, if any
    pub database: Option<String>,
}

impl StoreTarget {
    /// Parse a connection string
    ///
    /// Multi-host strings resolve to their first host.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidUri` when the string has no scheme or host.
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let (scheme, rest) = uri.split_once("://").ok_or_else(|| StoreError::InvalidUri {
            message: "missing scheme separator".to_string(),
        })?;
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let hosts = authority
            .rsplit_once('@')
            .map_or(authority, |(_, hosts)| hosts);
        let first_host = hosts.split(',').next().unwrap_or_default();

        let url = Url::parse(&format!("{scheme}://{first_host}/{path}")).map_err(|e| {
            StoreError::InvalidUri {
                message: e.to_string(),
            }
        })?;

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| StoreError::InvalidUri {
                message: "missing host".to_string(),
            })?
            .to_string();

        let database = Some(url.path().trim_matches('/'))
            .filter(|db| !db.is_empty())
            .map(ToString::to_string);

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port: url.port().unwrap_or(DEFAULT_STORE_PORT),
            database,
        })
    }

    /// `host:port` for connecting and error messages
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn probe(&self, connect_timeout: Duration) -> Result<(), StoreError> {
        let address = self.address();
        match timeout(connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => {
                debug!(address = %address, "store accepted connection");
                Ok(())
            }
            Ok(Err(source)) => Err(StoreError::Unreachable { address, source }),
            Err(_) => Err(StoreError::Timeout {
                address,
                timeout_seconds: connect_timeout.as_secs(),
            }),
        }
    }
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address())?;
        if let Some(database) = &self.database {
            write!(f, "/{database}")?;
        }
        Ok(())
    }
}

/// Connector that confirms TCP reachability of the store
#[derive(Debug, Clone)]
pub struct TcpStoreConnector {
    connect_timeout: Duration,
}

impl TcpStoreConnector {
    /// Create a connector with the given connect deadline
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpStoreConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS))
    }
}

impl StoreConnector for TcpStoreConnector {
    fn connect<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, Result<StoreHandle, StoreError>> {
        Box::pin(async move {
            let target = StoreTarget::parse(uri)?;
            target.probe(self.connect_timeout).await?;
            info!(store = %target, "store connection established");

            Ok(Arc::new(TcpStore {
                target,
                connect_timeout: self.connect_timeout,
            }) as StoreHandle)
        })
    }
}

/// Handle to a reachable store
#[derive(Debug)]
pub struct TcpStore {
    target: StoreTarget,
    connect_timeout: Duration,
}

impl TcpStore {
    /// Where this handle points
    pub fn target(&self) -> &StoreTarget {
        &self.target
    }
}

impl Store for TcpStore {
    fn describe(&self) -> String {
        self.target.to_string()
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.target.probe(self.connect_timeout))
    }
}
