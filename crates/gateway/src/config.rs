// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! This module provides configuration structures and logic for the gateway,
//! supporting different environments and validation of configuration parameters.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{ServerError, ServerResult};

/// Placeholder in the store connection string replaced by the store password
pub const PASSWORD_PLACEHOLDER: &str = "<PASSWORD>";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BODY_LIMIT_BYTES: usize = 100 * 1024;
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_SIGNATURE_TOLERANCE_SECONDS: u64 = 300;
const DEVELOPMENT_ASSET_DIR: &str = "../client/public";
const PRODUCTION_ASSET_DIR: &str = "dist";
const SPA_ENTRY_DOCUMENT: &str = "index.html";

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// The platform default port
    pub const fn default_development() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::Development,
        }
    }

    /// Create a safe testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // Validated against the real environment during load
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated timeout duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(seconds <= 300, "timeout cannot exceed 300");
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Create a safe default timeout (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Create a safe testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// A configuration value that must never be logged
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no value was configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

/// Store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string, possibly containing [`PASSWORD_PLACEHOLDER`]
    pub url: String,
    /// Password substituted into the connection string
    pub password: Option<Secret>,
    /// Deadline for a single connection attempt
    pub connect_timeout_seconds: u64,
    /// Attempts before startup fails
    pub connect_attempts: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            password: None,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }
}

/// Payment provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Webhook endpoint signing secret
    pub webhook_secret: Secret,
    /// Maximum signature age; 0 disables the check
    pub signature_tolerance_seconds: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: Secret::default(),
            signature_tolerance_seconds: DEFAULT_SIGNATURE_TOLERANCE_SECONDS,
        }
    }
}

/// Static asset settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Overrides the environment's build-output directory
    pub dir: Option<PathBuf>,
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Per-request time bound (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Environment type
    pub environment: Environment,
    /// Largest JSON or form body accepted by the parsers
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Store connection
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Payment provider
    #[serde(default)]
    pub billing: BillingConfig,
    /// Static assets
    #[serde(default)]
    pub assets: AssetsConfig,
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: ServerPort::default_development(),
            timeout_seconds: TimeoutSeconds::default(),
            environment: Environment::Development,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            database: DatabaseConfig::default(),
            billing: BillingConfig::default(),
            assets: AssetsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with `SERVER_` prefix, `__` between nested keys
    /// 5. The platform variables `ENVIRONMENT`, `PORT`, `DATABASE` and `PASSWORD`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("timeout_seconds", 30)?
            .set_default("environment", "development")?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("port", std::env::var("PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE").ok())?
            .set_override_option("database.password", std::env::var("PASSWORD").ok())?;

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        let mut server_config: Self = config.try_deserialize()?;

        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Create configuration optimized for testing
    pub fn for_testing() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(), // let OS choose available port
            timeout_seconds: TimeoutSeconds::testing(),
            environment: Environment::Testing,
            database: DatabaseConfig {
                url: "mongodb://localhost:27017/marketplace-test".to_string(),
                connect_timeout_seconds: 1,
                connect_attempts: 1,
                ..DatabaseConfig::default()
            },
            billing: BillingConfig {
                webhook_secret: Secret::new("whsec_testing"),
                ..BillingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }

    /// Store connection string with the password substituted
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if no connection string is set, or if it
    /// contains the password placeholder and no password is configured.
    pub fn connection_string(&self) -> ServerResult<String> {
        let url = self.database.url.trim();
        if url.is_empty() {
            return Err(ServerError::Config {
                message: "database.url is not set".to_string(),
            });
        }

        if !url.contains(PASSWORD_PLACEHOLDER) {
            return Ok(url.to_string());
        }

        match &self.database.password {
            Some(password) if !password.is_empty() => {
                Ok(url.replace(PASSWORD_PLACEHOLDER, password.expose()))
            }
            _ => Err(ServerError::Config {
                message: format!(
                    "database.url contains {PASSWORD_PLACEHOLDER} but no database password is set"
                ),
            }),
        }
    }

    /// Directory static assets are served from
    pub fn asset_dir(&self) -> PathBuf {
        self.assets.dir.clone().unwrap_or_else(|| {
            PathBuf::from(match self.environment {
                Environment::Production => PRODUCTION_ASSET_DIR,
                Environment::Development | Environment::Testing => DEVELOPMENT_ASSET_DIR,
            })
        })
    }

    /// Entry document of the single-page application
    pub fn spa_entry(&self) -> PathBuf {
        self.asset_dir().join(SPA_ENTRY_DOCUMENT)
    }

    /// Deadline for one store connection attempt
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_seconds.max(1))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}
