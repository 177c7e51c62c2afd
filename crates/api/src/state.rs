// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server state management module
//!
//! This module provides shared application state for the swap API server,
//! including configuration, client wiring, metrics, and coordinated cancellation.

use std::{collections::HashMap, sync::Arc};

use external_apis::ClientSet;
use metrics_registry::MetricsRegistry;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{Environment, ServerConfig};

/// Shared application state with cancellation token support
#[derive(Debug, Clone)]
pub struct ServerState {
    /// Server configuration
    config: ServerConfig,
    /// Configured external API clients
    clients: Arc<ClientSet>,
    /// Registry backing the metrics exposition endpoint
    metrics: Arc<MetricsRegistry>,
    /// Cancellation token for coordinated shutdown
    pub cancellation_token: CancellationToken,
}

impl ServerState {
    /// Create new server state
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `clients` - Configured external API clients
    /// * `metrics` - Registry backing the metrics endpoint
    /// * `cancellation_token` - Token for coordinated cancellation
    pub fn new(
        config: ServerConfig,
        clients: Arc<ClientSet>,
        metrics: Arc<MetricsRegistry>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            clients,
            metrics,
            cancellation_token,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the configured external API clients
    pub fn clients(&self) -> &Arc<ClientSet> {
        &self.clients
    }

    /// Get the metrics registry
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Assemble the application status from concurrent client health checks
    ///
    /// The service counts as ready while no configured client reports down;
    /// degraded clients keep it ready because they still answer requests.
    pub async fn health_check(&self) -> AppStatus {
        let client_health = self.clients.get_overall_health().await;

        let mut failures: Vec<String> = client_health
            .iter()
            .filter_map(|(name, status)| match status {
                api_client::HealthStatus::Down { reason } => Some(format!("{name}: {reason}")),
                api_client::HealthStatus::Up | api_client::HealthStatus::Degraded { .. } => None,
            })
            .collect();
        // HashMap iteration order is arbitrary; sort so the error text is stable.
        failures.sort();

        let clients = client_health
            .into_iter()
            .map(|(name, status)| (name, Self::convert_health_status(status)))
            .collect();

        AppStatus {
            ready: failures.is_empty(),
            error: failures.join("; "),
            version: Box::from(env!("CARGO_PKG_VERSION")),
            environment: self.config.environment,
            timestamp: chrono::Utc::now().to_rfc3339(),
            clients,
        }
    }

    /// Convert external API health status to internal health status
    fn convert_health_status(external_status: api_client::HealthStatus) -> HealthStatus {
        match external_status {
            api_client::HealthStatus::Up => HealthStatus::Up,
            api_client::HealthStatus::Degraded { reason } => HealthStatus::Degraded {
                reason: reason.into_boxed_str(),
            },
            api_client::HealthStatus::Down { reason } => HealthStatus::Down {
                reason: reason.into_boxed_str(),
            },
        }
    }
}

/// Health status of a service or dependency
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthStatus {
    /// Service is fully operational and responding normally
    Up,

    /// Service is not operational or has critical failures
    Down {
        /// Human-readable explanation of why the service is down
        reason: Box<str>,
    },

    /// Service is operational but experiencing performance issues or partial failures
    Degraded {
        /// Human-readable explanation of the degradation condition
        reason: Box<str>,
    },
}

/// Application status served by the readiness endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct AppStatus {
    /// Whether every configured client is reachable
    pub ready: bool,
    /// Joined failure descriptions, empty while ready
    pub error: String,
    /// Service version
    pub version: Box<str>,
    /// Environment
    pub environment: Environment,
    /// Timestamp
    pub timestamp: String,
    /// Status of individual API clients
    pub clients: HashMap<String, HealthStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_state() -> ServerState {
        ServerState::new(
            ServerConfig::for_testing(),
            Arc::new(ClientSet::new()),
            Arc::new(MetricsRegistry::new()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn server_state_creation() {
        let state = empty_state();

        assert!(!state.cancellation_token.is_cancelled());
        assert_eq!(state.clients().client_count(), 0);
    }

    #[test]
    fn server_state_with_cancellation_token() {
        let config = ServerConfig::for_testing();
        let token = CancellationToken::new();
        let state = ServerState::new(
            config,
            Arc::new(ClientSet::new()),
            Arc::new(MetricsRegistry::new()),
            token.clone(),
        );

        assert!(!state.cancellation_token.is_cancelled());

        // Test that the tokens are linked
        token.cancel();
        assert!(state.cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn health_check_without_clients_is_ready() {
        let status = empty_state().health_check().await;

        assert!(status.ready);
        assert!(status.error.is_empty());
        assert_eq!(status.environment, Environment::Testing);
        assert_eq!(&*status.version, env!("CARGO_PKG_VERSION"));
        assert!(status.clients.is_empty());
    }
}
