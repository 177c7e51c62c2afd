// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Aptos indexer integration
//!
//! This module provides coin and fungible-asset metadata lookups against the
//! Aptos GraphQL indexer. Requests are batched into single queries, retried
//! with the shared retry policy, and terminal failures are counted in the
//! metrics registry before they propagate.

use std::{sync::Arc, time::Duration};

use api_client::{ApiClient, ApiError, HealthStatus};
use metrics_registry::{LabelSet, MetricsRegistry};
use reqwest::{Client, StatusCode};
use retry::{RetryError, RetryOutcome, RetryPolicy};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use url::Url;

/// Counter of Aptos indexer requests that failed after exhausting retries.
pub const APTOS_REQUEST_ERRORS_METRIC: &str = "swap_api_aptos_request_errors_total";

const APTOS_REQUEST_ERRORS_HELP: &str =
    "Number of Aptos indexer requests that failed after exhausting all retries";

const COIN_INFOS_OPERATION: &str = "coin_infos";
const FUNGIBLE_ASSETS_OPERATION: &str = "fungible_assets";

/// Asset type of the native coin; the indexer has no metadata row for it.
const NATIVE_ASSET_TYPE: &str = "0xa";

const COIN_INFOS_QUERY: &str = r"
query CoinInfos($coinTypes: [String!]!) {
  coin_infos(where: { coin_type: { _in: $coinTypes } }) {
    decimals
    name
    symbol
    coin_type
  }
}
";

const FUNGIBLE_ASSETS_QUERY: &str = r"
query FungibleAssetMetadata($assetTypes: [String!]!) {
  fungible_asset_metadata(where: { asset_type: { _in: $assetTypes } }) {
    asset_type
    decimals
    name
    symbol
  }
}
";

/// The indexer carries unhelpful names for these bridged coins; keep the
/// conventional tickers instead.
fn overridden_name(coin_type: &str) -> Option<&'static str> {
    match coin_type {
        "0x5e156f1207d0ebfa19a9eeff00d62a282278fb8719f4fab3a586a0a2c0fffbea::coin::T" => {
            Some("wUSDC")
        }
        "0xcc8a89c8dce9693d354449f1f73e60e14e347417854f029db5bc8e7454008abb::coin::T" => {
            Some("zWETH")
        }
        _ => None,
    }
}

/// Configuration for the Aptos client
#[derive(Debug, Clone)]
pub struct AptosConfig {
    /// GraphQL indexer endpoint
    pub indexer_url: Url,
    /// Fullnode REST base, used for health checks
    pub fullnode_url: Url,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Health check timeout in seconds
    pub health_check_timeout_seconds: u64,
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between attempts; the wait grows linearly per attempt
    pub retry_base_delay: Duration,
}

impl Default for AptosConfig {
    fn default() -> Self {
        Self {
            indexer_url: Url::parse("https://api.mainnet.aptoslabs.com/v1/graphql")
                .expect("default indexer URL is valid"),
            fullnode_url: Url::parse("https://api.mainnet.aptoslabs.com/v1")
                .expect("default fullnode URL is valid"),
            timeout_seconds: 10,
            health_check_timeout_seconds: 5,
            max_retries: retry::DEFAULT_RETRIES,
            retry_base_delay: retry::DEFAULT_BASE_DELAY,
        }
    }
}

/// Aptos indexer client
#[derive(Debug)]
pub struct AptosClient {
    client: Client,
    config: AptosConfig,
    metrics: Arc<MetricsRegistry>,
    retry_policy: RetryPolicy,
}

/// Errors specific to the Aptos client
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AptosError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The indexer rejected the query
    #[error("indexer error: {message}")]
    Indexer { message: String },

    /// API returned an unexpected status
    #[error("API error: {status} - {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed")]
    Unauthorized,

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
        source: Box<AptosError>,
    },
}

impl From<AptosError> for ApiError {
    fn from(value: AptosError) -> Self {
        match value {
            AptosError::Http(error) => ApiError::Http {
                message: error.to_string(),
            },
            AptosError::Indexer { message } => ApiError::InvalidResponse { message },
            AptosError::UnexpectedStatus { status, message } => ApiError::Custom {
                error: anyhow::Error::msg(format!("{status}: {message}")),
            },
            AptosError::Unauthorized => ApiError::Authentication {
                message: value.to_string(),
            },
            AptosError::Config(message) => ApiError::Configuration { message },
            AptosError::Metrics(error) => ApiError::Configuration {
                message: error.to_string(),
            },
            AptosError::Timeout { seconds } => ApiError::Timeout {
                timeout_seconds: seconds,
            },
            exhausted @ AptosError::Exhausted { .. } => ApiError::ServiceUnavailable {
                message: exhausted.to_string(),
            },
        }
    }
}

/// Metadata for one coin under the legacy coin standard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoinInfo {
    /// Number of decimal places
    pub decimals: u8,
    /// Display name, after local overrides
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
    /// Fully qualified coin type
    pub coin_type: String,
}

/// Metadata for one fungible asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FungibleAssetMetadata {
    /// Fully qualified asset type, or `0xa` for the native coin
    pub asset_type: String,
    /// Number of decimal places
    pub decimals: u8,
    /// Display name
    pub name: String,
    /// Ticker symbol
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CoinInfosData {
    coin_infos: Vec<CoinInfo>,
}

#[derive(Debug, Deserialize)]
struct FungibleAssetsData {
    fungible_asset_metadata: Vec<FungibleAssetMetadata>,
}

impl AptosClient {
    /// Create a new Aptos client and register its error counters
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or one of the
    /// error-counter series is already claimed in the registry.
    pub fn new(config: AptosConfig, metrics: Arc<MetricsRegistry>) -> Result<Self, AptosError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("swap-api/0.1.0")
            .build()
            .map_err(AptosError::Http)?;

        for operation in [COIN_INFOS_OPERATION, FUNGIBLE_ASSETS_OPERATION] {
            metrics.register_counter(
                APTOS_REQUEST_ERRORS_METRIC,
                APTOS_REQUEST_ERRORS_HELP,
                LabelSet::from([("operation", operation)]),
            )?;
        }

        let retry_policy = RetryPolicy::new(config.max_retries, config.retry_base_delay);
        Ok(Self {
            client,
            config,
            metrics,
            retry_policy,
        })
    }

    /// Fetch coin metadata for the given coin types in a single query
    ///
    /// Names of a handful of bridged coins are overridden locally after the
    /// fetch; everything else comes back as the indexer reports it.
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted or the response
    /// cannot be interpreted.
    pub async fn coin_infos(&self, coin_types: &[String]) -> Result<Vec<CoinInfo>, AptosError> {
        debug!(
            count = coin_types.len(),
            "fetching coin infos from Aptos indexer"
        );

        let outcome = self
            .retry_policy
            .run(|| self.query_coin_infos(coin_types))
            .await;
        let rows = self.unwrap_retry(outcome, COIN_INFOS_OPERATION)?;

        Ok(rows
            .into_iter()
            .map(|mut coin| {
                if let Some(name) = overridden_name(&coin.coin_type) {
                    coin.name = name.to_string();
                }
                coin
            })
            .collect())
    }

    /// Fetch fungible-asset metadata for the given asset types
    ///
    /// The native coin (`0xa`) has no indexer row; requested occurrences are
    /// injected locally ahead of the indexer results.
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted or the response
    /// cannot be interpreted.
    pub async fn fungible_assets(
        &self,
        asset_types: &[String],
    ) -> Result<Vec<FungibleAssetMetadata>, AptosError> {
        let native: Vec<FungibleAssetMetadata> = asset_types
            .iter()
            .filter(|asset_type| asset_type.eq_ignore_ascii_case(NATIVE_ASSET_TYPE))
            .map(|_| FungibleAssetMetadata {
                asset_type: NATIVE_ASSET_TYPE.to_string(),
                decimals: 8,
                name: "Aptos".to_string(),
                symbol: "APT".to_string(),
            })
            .collect();

        debug!(
            count = asset_types.len(),
            "fetching fungible asset metadata from Aptos indexer"
        );

        let outcome = self
            .retry_policy
            .run(|| self.query_fungible_assets(asset_types))
            .await;
        let rows = self.unwrap_retry(outcome, FUNGIBLE_ASSETS_OPERATION)?;

        Ok(native.into_iter().chain(rows).collect())
    }

    async fn query_coin_infos(&self, coin_types: &[String]) -> Result<Vec<CoinInfo>, AptosError> {
        let data: CoinInfosData = self
            .query_indexer(COIN_INFOS_QUERY, json!({ "coinTypes": coin_types }))
            .await?;
        Ok(data.coin_infos)
    }

    async fn query_fungible_assets(
        &self,
        asset_types: &[String],
    ) -> Result<Vec<FungibleAssetMetadata>, AptosError> {
        let data: FungibleAssetsData = self
            .query_indexer(FUNGIBLE_ASSETS_QUERY, json!({ "assetTypes": asset_types }))
            .await?;
        Ok(data.fungible_asset_metadata)
    }

    async fn query_indexer<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, AptosError> {
        let request = self
            .client
            .post(self.config.indexer_url.clone())
            .json(&json!({ "query": query, "variables": variables }));

        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request.send(),
        )
        .await
        .map_err(|_| AptosError::Timeout {
            seconds: self.config.timeout_seconds,
        })?
        .map_err(AptosError::Http)?;

        match response.status() {
            StatusCode::OK => {
                let body: GraphQlResponse<T> = response.json().await.map_err(AptosError::Http)?;
                if let Some(error) = body.errors.first() {
                    return Err(AptosError::Indexer {
                        message: error.message.clone(),
                    });
                }
                body.data.ok_or_else(|| AptosError::Indexer {
                    message: "response carried no data".to_string(),
                })
            }
            StatusCode::UNAUTHORIZED => Err(AptosError::Unauthorized),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                warn!("Aptos indexer error: {} - {}", status.as_u16(), error_text);
                Err(AptosError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Folds a retry outcome into the client error type, counting terminal
    /// failures under the error metric for `operation`.
    fn unwrap_retry<T>(
        &self,
        outcome: Result<RetryOutcome<T>, RetryError<AptosError>>,
        operation: &str,
    ) -> Result<T, AptosError> {
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
                    "Aptos request failed after exhausting retries"
                );
                self.count_request_error(operation);
                Err(AptosError::Exhausted {
                    attempts,
                    source: Box::new(last_error),
                })
            }
            Err(RetryError::Configuration { retries }) => Err(AptosError::Config(format!(
                "number of retries must be at least 1, got {retries}"
            ))),
        }
    }

    fn count_request_error(&self, operation: &str) {
        let labels = LabelSet::from([("operation", operation)]);
        if let Err(error) = self
            .metrics
            .increment(APTOS_REQUEST_ERRORS_METRIC, &labels)
        {
            error!(%error, "failed to record Aptos request error metric");
        }
    }
}

impl ApiClient for AptosClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let url = self.config.fullnode_url.clone();

        debug!(%url, "performing health check on Aptos fullnode");

        let start_time = std::time::Instant::now();
        let response = timeout(
            Duration::from_secs(self.config.health_check_timeout_seconds),
            self.client.get(url).send(),
        )
        .await
        .map_err(|_| AptosError::Timeout {
            seconds: self.config.health_check_timeout_seconds,
        })?
        .map_err(AptosError::Http)?;

        match response.status() {
            StatusCode::OK => {
                info!(
                    "Aptos fullnode health check passed in {:?}",
                    start_time.elapsed()
                );
                Ok(HealthStatus::Up)
            }
            StatusCode::UNAUTHORIZED => Ok(HealthStatus::Down {
                reason: "Authentication failed".to_string(),
            }),
            status => Ok(HealthStatus::Degraded {
                reason: format!("fullnode returned status {}", status.as_u16()),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "aptos"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_registers_error_counters() {
        let metrics = Arc::new(MetricsRegistry::new());
        let client = AptosClient::new(AptosConfig::default(), Arc::clone(&metrics));

        assert!(client.is_ok());
        assert_eq!(metrics.series_count(APTOS_REQUEST_ERRORS_METRIC), 2);
    }

    #[test]
    fn second_client_on_same_registry_is_rejected() {
        let metrics = Arc::new(MetricsRegistry::new());
        let _first = AptosClient::new(AptosConfig::default(), Arc::clone(&metrics)).unwrap();

        let second = AptosClient::new(AptosConfig::default(), Arc::clone(&metrics));

        assert!(matches!(second.unwrap_err(), AptosError::Metrics(_)));
    }

    #[test]
    fn bridged_coin_names_are_overridden() {
        assert_eq!(
            overridden_name(
                "0x5e156f1207d0ebfa19a9eeff00d62a282278fb8719f4fab3a586a0a2c0fffbea::coin::T"
            ),
            Some("wUSDC")
        );
        assert_eq!(
            overridden_name(
                "0xcc8a89c8dce9693d354449f1f73e60e14e347417854f029db5bc8e7454008abb::coin::T"
            ),
            Some("zWETH")
        );
        assert_eq!(overridden_name("0x1::aptos_coin::AptosCoin"), None);
    }
}
