// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Mira DEX aggregator integration
//!
//! This module provides route discovery against the Mira aggregator API and
//! preparation of swap orders from discovered routes. A missing route is a
//! normal outcome rather than an error: the aggregator answers 404, and the
//! client returns an empty route without retrying.

use std::{sync::Arc, time::Duration};

use api_client::{ApiClient, ApiError, HealthStatus};
use metrics_registry::{LabelSet, MetricsRegistry};
use reqwest::{Client, StatusCode};
use retry::{RetryError, RetryOutcome, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use url::Url;

/// Counter of Mira aggregator requests that failed after exhausting retries.
pub const MIRA_REQUEST_ERRORS_METRIC: &str = "swap_api_mira_request_errors_total";

const MIRA_REQUEST_ERRORS_HELP: &str =
    "Number of Mira aggregator requests that failed after exhausting all retries";

const FIND_ROUTE_OPERATION: &str = "find_route";

/// Gas limit applied to every swap transaction.
const SWAP_GAS_LIMIT: u64 = 999_999;

/// Fee ceiling applied to every swap transaction.
const SWAP_MAX_FEE: u64 = 99_999;

/// Configuration for the Mira client
#[derive(Debug, Clone)]
pub struct MiraConfig {
    /// Base URL of the aggregator API
    pub base_url: Url,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Health check timeout in seconds
    pub health_check_timeout_seconds: u64,
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between attempts; the wait grows linearly per attempt
    pub retry_base_delay: Duration,
}

impl Default for MiraConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://prod.api.mira.ly")
                .expect("default aggregator URL is valid"),
            timeout_seconds: 10,
            health_check_timeout_seconds: 5,
            max_retries: retry::DEFAULT_RETRIES,
            retry_base_delay: Duration::from_secs(10),
        }
    }
}

/// Mira aggregator client
#[derive(Debug)]
pub struct MiraClient {
    client: Client,
    config: MiraConfig,
    metrics: Arc<MetricsRegistry>,
    retry_policy: RetryPolicy,
}

/// Errors specific to the Mira client
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum MiraError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an unexpected status
    #[error("API error: {status} - {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// No route exists for the requested pair
    #[error("no route found for the requested pair")]
    NoRoute,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metric registration failed
    #[error("metric registration failed: {0}")]
    Metrics(#[from] metrics_registry::MetricsError),

    /// Timeout error
    #[error("Request timeout")]
    Timeout { seconds: u64 },

    /// Every retry attempt failed
    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<MiraError>,
    },
}

impl From<MiraError> for ApiError {
    fn from(value: MiraError) -> Self {
        match value {
            MiraError::Http(error) => ApiError::Http {
                message: error.to_string(),
            },
            MiraError::UnexpectedStatus { status, message } => ApiError::Custom {
                error: anyhow::Error::msg(format!("{status}: {message}")),
            },
            rate_limited @ MiraError::RateLimited => ApiError::ServiceUnavailable {
                message: rate_limited.to_string(),
            },
            no_route @ MiraError::NoRoute => ApiError::InvalidResponse {
                message: no_route.to_string(),
            },
            MiraError::Config(message) => ApiError::Configuration { message },
            MiraError::Metrics(error) => ApiError::Configuration {
                message: error.to_string(),
            },
            MiraError::Timeout { seconds } => ApiError::Timeout {
                timeout_seconds: seconds,
            },
            exhausted @ MiraError::Exhausted { .. } => ApiError::ServiceUnavailable {
                message: exhausted.to_string(),
            },
        }
    }
}

/// Which leg of a trade the quoted amount pins down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    /// The input amount is fixed; the route maximizes output
    ExactInput,
    /// The output amount is fixed; the route minimizes input
    #[default]
    ExactOutput,
}

/// One hop of a route: input asset, output asset, and the stable flag of the
/// pool connecting them. Asset ids come unprefixed from the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep(pub String, pub String, pub bool);

impl PathStep {
    /// Input asset id of this hop.
    pub fn input(&self) -> &str {
        &self.0
    }

    /// Output asset id of this hop.
    pub fn output(&self) -> &str {
        &self.1
    }

    /// Whether the hop's pool uses the stable curve.
    pub fn is_stable(&self) -> bool {
        self.2
    }
}

/// The aggregator's best route for a trade.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BestRoute {
    /// Hops to traverse in order; empty when no route exists
    pub path: Vec<PathStep>,
    /// Total input amount, as a raw integer string
    pub input_amount: String,
    /// Total output amount, as a raw integer string
    pub output_amount: String,
}

impl BestRoute {
    fn empty() -> Self {
        Self {
            path: Vec::new(),
            input_amount: "0".to_string(),
            output_amount: "0".to_string(),
        }
    }

    /// Whether the aggregator found no path for the trade.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Identifies a pool by its two assets and stability curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolId {
    /// Input asset id, `0x`-prefixed
    pub input: String,
    /// Output asset id, `0x`-prefixed
    pub output: String,
    /// Whether the pool uses the stable curve
    pub stable: bool,
}

/// A fully specified swap, ready for a wallet to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOrder {
    /// Which leg the amount pins down
    pub kind: TradeType,
    /// Raw amount for the pinned leg
    pub amount: u64,
    /// Input asset id
    pub input: String,
    /// Output asset id
    pub output: String,
    /// Pools to route through, in order
    pub pools: Vec<PoolId>,
    /// Gas limit for the transaction
    pub gas_limit: u64,
    /// Fee ceiling for the transaction
    pub max_fee: u64,
}

#[derive(Debug, Serialize)]
struct RouteRequest<'a> {
    input: &'a str,
    output: &'a str,
    amount: u64,
    trade_type: TradeType,
}

impl MiraClient {
    /// Create a new Mira client and register its error counter
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the
    /// error-counter series is already claimed in the registry.
    pub fn new(config: MiraConfig, metrics: Arc<MetricsRegistry>) -> Result<Self, MiraError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("swap-api/0.1.0")
            .build()
            .map_err(MiraError::Http)?;

        metrics.register_counter(
            MIRA_REQUEST_ERRORS_METRIC,
            MIRA_REQUEST_ERRORS_HELP,
            LabelSet::from([("operation", FIND_ROUTE_OPERATION)]),
        )?;

        let retry_policy = RetryPolicy::new(config.max_retries, config.retry_base_delay);
        Ok(Self {
            client,
            config,
            metrics,
            retry_policy,
        })
    }

    /// Find the best route for trading `amount` between two assets
    ///
    /// Returns an empty route when the aggregator knows no path between the
    /// pair; callers should check [`BestRoute::is_empty`] before building a
    /// swap order.
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted or the response
    /// cannot be interpreted.
    pub async fn find_route(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        trade_type: TradeType,
    ) -> Result<BestRoute, MiraError> {
        debug!(
            input,
            output,
            amount,
            ?trade_type,
            "requesting best route from Mira aggregator"
        );

        let outcome = self
            .retry_policy
            .run(|| self.request_route(input, output, amount, trade_type))
            .await;
        self.unwrap_retry(outcome, FIND_ROUTE_OPERATION)
    }

    /// Build a swap order from a discovered route
    ///
    /// Pool asset ids are `0x`-prefixed here; the aggregator reports them
    /// bare, while execution expects the prefixed form.
    ///
    /// # Errors
    ///
    /// Returns [`MiraError::NoRoute`] when the path is empty.
    pub fn swap_order(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        path: &[PathStep],
        kind: TradeType,
    ) -> Result<SwapOrder, MiraError> {
        if path.is_empty() {
            return Err(MiraError::NoRoute);
        }

        let pools = path
            .iter()
            .map(|step| PoolId {
                input: format!("0x{}", step.input()),
                output: format!("0x{}", step.output()),
                stable: step.is_stable(),
            })
            .collect();

        Ok(SwapOrder {
            kind,
            amount,
            input: input.to_string(),
            output: output.to_string(),
            pools,
            gas_limit: SWAP_GAS_LIMIT,
            max_fee: SWAP_MAX_FEE,
        })
    }

    async fn request_route(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        trade_type: TradeType,
    ) -> Result<BestRoute, MiraError> {
        let url = self.endpoint_url("find_route")?;
        let body = RouteRequest {
            input,
            output,
            amount,
            trade_type,
        };

        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            self.client.post(url).json(&body).send(),
        )
        .await
        .map_err(|_| MiraError::Timeout {
            seconds: self.config.timeout_seconds,
        })?
        .map_err(MiraError::Http)?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(MiraError::Http),
            // No pool connects the pair; nothing to retry.
            StatusCode::NOT_FOUND => Ok(BestRoute::empty()),
            StatusCode::TOO_MANY_REQUESTS => Err(MiraError::RateLimited),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!(
                    "Mira aggregator error: {} - {}",
                    status.as_u16(),
                    error_text
                );
                Err(MiraError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Ensure base URL ends with slash for proper joining
    fn endpoint_url(&self, path: &str) -> Result<Url, MiraError> {
        let mut base_url = self.config.base_url.clone();
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        base_url
            .join(path)
            .map_err(|error| MiraError::Config(format!("Invalid base URL: {error}")))
    }

    /// Folds a retry outcome into the client error type, counting terminal
    /// failures under the error metric for `operation`.
    fn unwrap_retry<T>(
        &self,
        outcome: Result<RetryOutcome<T>, RetryError<MiraError>>,
        operation: &str,
    ) -> Result<T, MiraError> {
        match outcome {
            Ok(outcome) => Ok(outcome.value),
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                error!(
                    operation,
                    attempts,
                    error = %last_error,
                    "Mira request failed after exhausting retries"
                );
                self.count_request_error(operation);
                Err(MiraError::Exhausted {
                    attempts,
                    source: Box::new(last_error),
                })
            }
            Err(RetryError::Configuration { retries }) => Err(MiraError::Config(format!(
                "number of retries must be at least 1, got {retries}"
            ))),
        }
    }

    fn count_request_error(&self, operation: &str) {
        let labels = LabelSet::from([("operation", operation)]);
        if let Err(error) = self.metrics.increment(MIRA_REQUEST_ERRORS_METRIC, &labels) {
            error!(%error, "failed to record Mira request error metric");
        }
    }
}

impl ApiClient for MiraClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let url = self.config.base_url.clone();

        debug!(%url, "performing health check on Mira aggregator");

        let start_time = std::time::Instant::now();
        let response = timeout(
            Duration::from_secs(self.config.health_check_timeout_seconds),
            self.client.get(url).send(),
        )
        .await
        .map_err(|_| MiraError::Timeout {
            seconds: self.config.health_check_timeout_seconds,
        })?
        .map_err(MiraError::Http)?;

        let status = response.status();
        if status.is_server_error() {
            Ok(HealthStatus::Down {
                reason: format!("aggregator returned status {}", status.as_u16()),
            })
        } else {
            // Any non-5xx answer proves the aggregator is reachable.
            info!("Mira health check passed in {:?}", start_time.elapsed());
            Ok(HealthStatus::Up)
        }
    }

    fn name(&self) -> &'static str {
        "mira"
    }
}
