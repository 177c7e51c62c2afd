// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Telegram notification integration
//!
//! This module delivers operational notifications through the Telegram Bot
//! API. Messages are sent with Markdown formatting, retried with the shared
//! retry policy, and terminal failures are counted in the metrics registry.

use std::{sync::Arc, time::Duration};

use api_client::{ApiClient, ApiError, HealthStatus};
use metrics_registry::{LabelSet, MetricsRegistry};
use reqwest::{Client, StatusCode};
use retry::{RetryError, RetryOutcome, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info};
use url::Url;

use crate::non_empty_string::NonEmptyString;

/// Counter of Telegram notifications that failed after exhausting retries.
pub const TELEGRAM_SEND_ERRORS_METRIC: &str = "swap_api_telegram_send_errors_total";

const TELEGRAM_SEND_ERRORS_HELP: &str =
    "Number of Telegram notifications that failed after exhausting all retries";

const SEND_MESSAGE_OPERATION: &str = "send_message";

// Telegram Bot API constants
const DEFAULT_TELEGRAM_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_TELEGRAM_HEALTH_CHECK_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_TELEGRAM_MAX_RETRIES: u32 = 2;
const DEFAULT_TELEGRAM_RETRY_BASE_DELAY: Duration = Duration::from_secs(10);

/// Configuration for the Telegram notifier
/// This type is always valid by construction.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token issued by `BotFather`
    pub token: NonEmptyString,
    /// Chat the notifier posts into
    pub chat_id: NonEmptyString,
    /// Base URL of the Bot API
    pub api_base: Url,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Health check timeout in seconds
    pub health_check_timeout_seconds: u64,
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between attempts; the wait grows linearly per attempt
    pub retry_base_delay: Duration,
}

impl TelegramConfig {
    /// Create a new `TelegramConfig` with validation
    ///
    /// # Errors
    ///
    /// Returns an error when the token or chat id is empty.
    #[allow(clippy::missing_panics_doc)]
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            token: NonEmptyString::new(token)?,
            chat_id: NonEmptyString::new(chat_id)?,
            api_base: Url::parse("https://api.telegram.org")
                .expect("default Bot API URL is valid"),
            timeout_seconds: DEFAULT_TELEGRAM_TIMEOUT_SECONDS,
            health_check_timeout_seconds: DEFAULT_TELEGRAM_HEALTH_CHECK_TIMEOUT_SECONDS,
            max_retries: DEFAULT_TELEGRAM_MAX_RETRIES,
            retry_base_delay: DEFAULT_TELEGRAM_RETRY_BASE_DELAY,
        })
    }
}

/// Telegram Bot API client
#[derive(Debug)]
pub struct TelegramClient {
    client: Client,
    config: TelegramConfig,
    metrics: Arc<MetricsRegistry>,
    retry_policy: RetryPolicy,
}

/// Errors specific to the Telegram client
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum TelegramError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API rejected the request
    #[error("Bot API error: {message}")]
    Api { message: String },

    /// Authentication failed
    #[error("Authentication failed")]
    Unauthorized,

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// API returned an unexpected status
    #[error("API error: {status} - {message}")]
    UnexpectedStatus { status: u16, message: String },

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
        source: Box<TelegramError>,
    },
}

impl From<TelegramError> for ApiError {
    fn from(value: TelegramError) -> Self {
        match value {
            TelegramError::Http(error) => ApiError::Http {
                message: error.to_string(),
            },
            TelegramError::Api { message } => ApiError::InvalidResponse { message },
            TelegramError::Unauthorized => ApiError::Authentication {
                message: value.to_string(),
            },
            rate_limited @ TelegramError::RateLimited => ApiError::ServiceUnavailable {
                message: rate_limited.to_string(),
            },
            TelegramError::UnexpectedStatus { status, message } => ApiError::Custom {
                error: anyhow::Error::msg(format!("{status}: {message}")),
            },
            TelegramError::Config(message) => ApiError::Configuration { message },
            TelegramError::Metrics(error) => ApiError::Configuration {
                message: error.to_string(),
            },
            TelegramError::Timeout { seconds } => ApiError::Timeout {
                timeout_seconds: seconds,
            },
            exhausted @ TelegramError::Exhausted { .. } => ApiError::ServiceUnavailable {
                message: exhausted.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramClient {
    /// Create a new Telegram client and register its error counter
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the
    /// error-counter series is already claimed in the registry.
    pub fn new(config: TelegramConfig, metrics: Arc<MetricsRegistry>) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("swap-api/0.1.0")
            .build()
            .map_err(TelegramError::Http)?;

        metrics.register_counter(
            TELEGRAM_SEND_ERRORS_METRIC,
            TELEGRAM_SEND_ERRORS_HELP,
            LabelSet::from([("operation", SEND_MESSAGE_OPERATION)]),
        )?;

        let retry_policy = RetryPolicy::new(config.max_retries, config.retry_base_delay);
        Ok(Self {
            client,
            config,
            metrics,
            retry_policy,
        })
    }

    /// Send a Markdown-formatted message to the configured chat
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted.
    pub async fn send_message(&self, text: &str) -> Result<(), TelegramError> {
        debug!(chars = text.len(), "sending Telegram notification");

        let outcome = self.retry_policy.run(|| self.post_message(text)).await;
        self.unwrap_retry(outcome, SEND_MESSAGE_OPERATION)
    }

    async fn post_message(&self, text: &str) -> Result<(), TelegramError> {
        let url = self.method_url("sendMessage")?;
        let body = SendMessageRequest {
            chat_id: self.config.chat_id.as_str(),
            text,
            parse_mode: "Markdown",
        };

        let response = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            self.client.post(url).json(&body).send(),
        )
        .await
        .map_err(|_| TelegramError::Timeout {
            seconds: self.config.timeout_seconds,
        })?
        .map_err(TelegramError::Http)?;

        match response.status() {
            StatusCode::OK => {
                let body: BotApiResponse =
                    response.json().await.map_err(TelegramError::Http)?;
                if body.ok {
                    Ok(())
                } else {
                    Err(TelegramError::Api {
                        message: body
                            .description
                            .unwrap_or_else(|| "request not ok".to_string()),
                    })
                }
            }
            StatusCode::UNAUTHORIZED => Err(TelegramError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(TelegramError::RateLimited),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(TelegramError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Builds a Bot API method URL. The path carries the bot token, so the
    /// result must stay out of logs.
    fn method_url(&self, method: &str) -> Result<Url, TelegramError> {
        // The token contains a colon, which `Url::join` would read as a
        // scheme separator; build the whole URL in a single parse instead.
        let base = self.config.api_base.as_str().trim_end_matches('/');
        let url = format!("{base}/bot{}/{method}", self.config.token.as_str());
        Url::parse(&url)
            .map_err(|error| TelegramError::Config(format!("Invalid base URL: {error}")))
    }

    /// Folds a retry outcome into the client error type, counting terminal
    /// failures under the error metric for `operation`.
    fn unwrap_retry<T>(
        &self,
        outcome: Result<RetryOutcome<T>, RetryError<TelegramError>>,
        operation: &str,
    ) -> Result<T, TelegramError> {
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
                    "Telegram request failed after exhausting retries"
                );
                self.count_request_error(operation);
                Err(TelegramError::Exhausted {
                    attempts,
                    source: Box::new(last_error),
                })
            }
            Err(RetryError::Configuration { retries }) => Err(TelegramError::Config(format!(
                "number of retries must be at least 1, got {retries}"
            ))),
        }
    }

    fn count_request_error(&self, operation: &str) {
        let labels = LabelSet::from([("operation", operation)]);
        if let Err(error) = self
            .metrics
            .increment(TELEGRAM_SEND_ERRORS_METRIC, &labels)
        {
            error!(%error, "failed to record Telegram send error metric");
        }
    }
}

impl ApiClient for TelegramClient {
    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let url = self.method_url("getMe")?;

        debug!("performing health check on Telegram Bot API");

        let start_time = std::time::Instant::now();
        let response = timeout(
            Duration::from_secs(self.config.health_check_timeout_seconds),
            self.client.get(url).send(),
        )
        .await
        .map_err(|_| TelegramError::Timeout {
            seconds: self.config.health_check_timeout_seconds,
        })?
        .map_err(TelegramError::Http)?;

        match response.status() {
            StatusCode::OK => {
                info!(
                    "Telegram health check passed in {:?}",
                    start_time.elapsed()
                );
                Ok(HealthStatus::Up)
            }
            StatusCode::UNAUTHORIZED => Ok(HealthStatus::Down {
                reason: "Authentication failed".to_string(),
            }),
            status => Ok(HealthStatus::Degraded {
                reason: format!("Bot API returned status {}", status.as_u16()),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn test_config(server: &MockServer) -> TelegramConfig {
        let mut config = TelegramConfig::new("123:abc", "42").unwrap();
        config.api_base = Url::parse(&server.uri()).unwrap();
        config.retry_base_delay = Duration::from_millis(1);
        config
    }

    fn send_error_count(metrics: &MetricsRegistry) -> f64 {
        metrics
            .gather()
            .iter()
            .find(|family| family.get_name() == TELEGRAM_SEND_ERRORS_METRIC)
            .and_then(|family| {
                family
                    .get_metric()
                    .first()
                    .map(|metric| metric.get_counter().value())
            })
            .unwrap_or_default()
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(TelegramConfig::new("", "42").is_err());
        assert!(TelegramConfig::new("123:abc", " ").is_err());
    }

    #[tokio::test]
    async fn notification_posts_markdown_to_the_chat() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": "42",
                "text": "swap *filled*",
                "parse_mode": "Markdown",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let metrics = Arc::new(MetricsRegistry::new());
        let client = TelegramClient::new(test_config(&mock_server), metrics).unwrap();

        client.send_message("swap *filled*").await.unwrap();
    }

    #[tokio::test]
    async fn transient_failure_then_delivery_counts_nothing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let metrics = Arc::new(MetricsRegistry::new());
        let client = TelegramClient::new(test_config(&mock_server), Arc::clone(&metrics)).unwrap();

        client.send_message("still here").await.unwrap();

        assert!((send_error_count(&metrics) - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn bot_api_rejection_exhausts_and_counts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found",
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        let metrics = Arc::new(MetricsRegistry::new());
        let client = TelegramClient::new(test_config(&mock_server), Arc::clone(&metrics)).unwrap();

        let error = client.send_message("lost").await.unwrap_err();

        match error {
            TelegramError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, TelegramError::Api { .. }));
            }
            other => panic!("expected exhausted error, got {other:?}"),
        }
        assert!((send_error_count(&metrics) - 1.0).abs() < f64::EPSILON);
    }
}
