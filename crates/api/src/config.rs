// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! This module provides configuration structures and logic for the swap API server,
//! supporting different environments and validation of configuration parameters.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use external_apis::{AptosConfig, MiraConfig};
use serde::{Deserialize, Deserializer, Serialize, de};
use url::Url;

use crate::error::{ServerError, ServerResult};

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

    /// Create a safe default port for development
    pub const fn default_development() -> Self {
        Self {
            port: 3000,
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
        // We'll validate this during configuration loading when we know the environment
        Ok(Self {
            port,
            environment: Environment::Development, // temporary, will be fixed during load
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

    /// Get the timeout value in seconds
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

/// Wraps a known-good client default in the validated timeout type.
fn default_timeout(seconds: u64) -> TimeoutSeconds {
    TimeoutSeconds::new(seconds).expect("default timeout is in range")
}

/// Settings for the Aptos indexer client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AptosSettings {
    /// Whether the Aptos client is constructed at startup
    pub enabled: bool,
    /// Indexer GraphQL endpoint for metadata queries
    pub indexer_url: Url,
    /// Fullnode REST endpoint used by health checks
    pub fullnode_url: Url,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Health check timeout in seconds (validated range: 1-300)
    pub health_check_timeout_seconds: TimeoutSeconds,
    /// Maximum retry attempts for indexer queries
    pub max_retries: u32,
}

impl Default for AptosSettings {
    fn default() -> Self {
        let defaults = AptosConfig::default();
        Self {
            enabled: true,
            indexer_url: defaults.indexer_url,
            fullnode_url: defaults.fullnode_url,
            timeout_seconds: default_timeout(defaults.timeout_seconds),
            health_check_timeout_seconds: default_timeout(defaults.health_check_timeout_seconds),
            max_retries: defaults.max_retries,
        }
    }
}

/// Settings for the Mira routing client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiraSettings {
    /// Whether the Mira client is constructed at startup
    pub enabled: bool,
    /// Base URL of the route aggregator
    pub base_url: Url,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Health check timeout in seconds (validated range: 1-300)
    pub health_check_timeout_seconds: TimeoutSeconds,
    /// Maximum retry attempts for route queries
    pub max_retries: u32,
}

impl Default for MiraSettings {
    fn default() -> Self {
        let defaults = MiraConfig::default();
        Self {
            enabled: true,
            base_url: defaults.base_url,
            timeout_seconds: default_timeout(defaults.timeout_seconds),
            health_check_timeout_seconds: default_timeout(defaults.health_check_timeout_seconds),
            max_retries: defaults.max_retries,
        }
    }
}

/// Settings for the Telegram notification client
///
/// Disabled by default because the bot token and chat id carry no usable
/// defaults; enabling the integration without both is a configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Whether the Telegram client is constructed at startup
    pub enabled: bool,
    /// Bot API token
    pub token: String,
    /// Chat that receives notifications
    pub chat_id: String,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Health check timeout in seconds (validated range: 1-300)
    pub health_check_timeout_seconds: TimeoutSeconds,
    /// Maximum retry attempts for message delivery
    pub max_retries: u32,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            chat_id: String::new(),
            timeout_seconds: default_timeout(10),
            health_check_timeout_seconds: default_timeout(5),
            max_retries: 2,
        }
    }
}

/// External integration settings grouped by provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Aptos indexer client settings
    pub aptos: AptosSettings,
    /// Mira routing client settings
    pub mira: MiraSettings,
    /// Telegram notification client settings
    pub telegram: TelegramSettings,
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Environment type
    pub environment: Environment,
    /// External integration settings
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::default_development(),
            timeout_seconds: TimeoutSeconds::default(),
            environment: Environment::Development,
            integrations: IntegrationsConfig::default(),
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
    /// 4. Environment variables with `SWAP_API_` prefix, `__` separating nested keys
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            // Start with default values
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000)?
            .set_default("timeout_seconds", 30)?
            .set_default("environment", "development")?
            // Add optional configuration files
            .add_source(File::with_name("config.json").required(false))
            // Add environment-specific config file
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            // Add environment variables, e.g. SWAP_API_INTEGRATIONS__APTOS__MAX_RETRIES
            .add_source(Self::env_source());

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        let mut server_config: Self = config.try_deserialize()?;

        // Fix the ServerPort to have the correct environment context
        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Environment variable source with the `SWAP_API_` prefix
    ///
    /// Nested keys use `__`, so `SWAP_API_INTEGRATIONS__APTOS__MAX_RETRIES`
    /// addresses `integrations.aptos.max_retries`. The prefix separator stays a
    /// single underscore; without it the separator would double up and demand
    /// `SWAP_API__...` forms.
    fn env_source() -> ConfigEnv {
        ConfigEnv::with_prefix("SWAP_API")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Create configuration optimized for testing
    ///
    /// All integrations are disabled so tests never construct clients that
    /// reach for the network.
    pub fn for_testing() -> Self {
        let mut integrations = IntegrationsConfig::default();
        integrations.aptos.enabled = false;
        integrations.mira.enabled = false;
        integrations.telegram.enabled = false;

        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(), // let OS choose available port
            timeout_seconds: TimeoutSeconds::testing(),
            environment: Environment::Testing,
            integrations,
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}
