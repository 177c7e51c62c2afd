// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Wallet integration for swap execution
//!
//! This module wraps a chain-specific wallet backend with the shared retry
//! policy and failure accounting. Transaction construction and signing live
//! behind the [`WalletBackend`] trait; the wrapper owns only the retry and
//! metrics concerns, so backends stay free of them.

use std::sync::Arc;
use std::time::Duration;

use metrics_registry::{LabelSet, MetricsRegistry};
use retry::{RetryError, RetryOutcome, RetryPolicy};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::mira::SwapOrder;

/// Counter of wallet operations that failed after exhausting retries.
pub const WALLET_REQUEST_ERRORS_METRIC: &str = "swap_api_wallet_request_errors_total";

const WALLET_REQUEST_ERRORS_HELP: &str =
    "Number of wallet operations that failed after exhausting all retries";

const BALANCE_OPERATION: &str = "balance";
const EXECUTE_SWAP_OPERATION: &str = "execute_swap";

/// A swap resubmitted too eagerly can race its own pending transaction, so
/// submission retries are spaced wider than read retries.
const DEFAULT_SWAP_RETRIES: u32 = 2;
const DEFAULT_SWAP_RETRY_BASE_DELAY: Duration = Duration::from_secs(20);

/// Chain-specific wallet operations.
///
/// Implementations talk to the node and hold the signing key. They should
/// surface failures as-is; retries and metrics belong to [`Wallet`].
pub trait WalletBackend: Send + Sync {
    /// Raw balance of one asset, in base units.
    fn balance(&self, asset_id: &str) -> impl Future<Output = Result<u64, WalletError>> + Send;

    /// Submit a swap, wait for inclusion, and return the transaction id.
    fn execute_swap(
        &self,
        order: &SwapOrder,
    ) -> impl Future<Output = Result<String, WalletError>> + Send;
}

/// Configuration for the wallet wrapper
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Maximum attempts for balance reads
    pub balance_retries: u32,
    /// Base delay between balance attempts
    pub balance_retry_base_delay: Duration,
    /// Maximum attempts for swap submission
    pub swap_retries: u32,
    /// Base delay between swap attempts
    pub swap_retry_base_delay: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            balance_retries: retry::DEFAULT_RETRIES,
            balance_retry_base_delay: retry::DEFAULT_BASE_DELAY,
            swap_retries: DEFAULT_SWAP_RETRIES,
            swap_retry_base_delay: DEFAULT_SWAP_RETRY_BASE_DELAY,
        }
    }
}

/// Errors specific to wallet operations
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum WalletError {
    /// The node rejected the transaction
    #[error("transaction rejected: {message}")]
    Rejected { message: String },

    /// Node communication failed
    #[error("provider error: {message}")]
    Provider { message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metric registration failed
    #[error("metric registration failed: {0}")]
    Metrics(#[from] metrics_registry::MetricsError),

    /// Every retry attempt failed
    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<WalletError>,
    },
}

/// Retrying wallet wrapper around a [`WalletBackend`]
#[derive(Debug)]
pub struct Wallet<B> {
    backend: B,
    metrics: Arc<MetricsRegistry>,
    balance_policy: RetryPolicy,
    swap_policy: RetryPolicy,
}

impl<B: WalletBackend> Wallet<B> {
    /// Create a new wallet wrapper and register its error counters
    ///
    /// # Errors
    ///
    /// Returns an error if one of the error-counter series is already claimed
    /// in the registry.
    pub fn new(
        backend: B,
        config: WalletConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, WalletError> {
        for operation in [BALANCE_OPERATION, EXECUTE_SWAP_OPERATION] {
            metrics.register_counter(
                WALLET_REQUEST_ERRORS_METRIC,
                WALLET_REQUEST_ERRORS_HELP,
                LabelSet::from([("operation", operation)]),
            )?;
        }

        Ok(Self {
            backend,
            metrics,
            balance_policy: RetryPolicy::new(
                config.balance_retries,
                config.balance_retry_base_delay,
            ),
            swap_policy: RetryPolicy::new(config.swap_retries, config.swap_retry_base_delay),
        })
    }

    /// Read the raw balance of one asset
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted.
    pub async fn balance(&self, asset_id: &str) -> Result<u64, WalletError> {
        debug!(asset_id, "reading wallet balance");

        let outcome = self
            .balance_policy
            .run(|| self.backend.balance(asset_id))
            .await;
        self.unwrap_retry(outcome, BALANCE_OPERATION)
    }

    /// Execute a swap and return the confirmed transaction id
    ///
    /// # Errors
    ///
    /// Returns an error once the retry budget is exhausted.
    pub async fn execute_swap(&self, order: &SwapOrder) -> Result<String, WalletError> {
        debug!(
            pools = order.pools.len(),
            amount = order.amount,
            "submitting swap transaction"
        );

        let outcome = self
            .swap_policy
            .run(|| self.backend.execute_swap(order))
            .await;
        let tx_id = self.unwrap_retry(outcome, EXECUTE_SWAP_OPERATION)?;

        info!(%tx_id, "swap transaction confirmed");
        Ok(tx_id)
    }

    /// Folds a retry outcome into the wallet error type, counting terminal
    /// failures under the error metric for `operation`.
    fn unwrap_retry<T>(
        &self,
        outcome: Result<RetryOutcome<T>, RetryError<WalletError>>,
        operation: &str,
    ) -> Result<T, WalletError> {
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
                    "wallet operation failed after exhausting retries"
                );
                self.count_request_error(operation);
                Err(WalletError::Exhausted {
                    attempts,
                    source: Box::new(last_error),
                })
            }
            Err(RetryError::Configuration { retries }) => Err(WalletError::Config(format!(
                "number of retries must be at least 1, got {retries}"
            ))),
        }
    }

    fn count_request_error(&self, operation: &str) {
        let labels = LabelSet::from([("operation", operation)]);
        if let Err(error) = self
            .metrics
            .increment(WALLET_REQUEST_ERRORS_METRIC, &labels)
        {
            error!(%error, "failed to record wallet error metric");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::mira::TradeType;

    use super::*;

    fn order() -> SwapOrder {
        SwapOrder {
            kind: TradeType::ExactOutput,
            amount: 1_000,
            input: "0xaaa".to_string(),
            output: "0xbbb".to_string(),
            pools: Vec::new(),
            gas_limit: 999_999,
            max_fee: 99_999,
        }
    }

    fn error_count(metrics: &MetricsRegistry, operation: &str) -> f64 {
        metrics
            .gather()
            .iter()
            .find(|family| family.get_name() == WALLET_REQUEST_ERRORS_METRIC)
            .and_then(|family| {
                family
                    .get_metric()
                    .iter()
                    .find(|metric| {
                        metric.get_label().iter().any(|label| {
                            label.get_name() == "operation" && label.get_value() == operation
                        })
                    })
                    .map(|metric| metric.get_counter().value())
            })
            .unwrap_or_default()
    }

    /// Fails balance reads a fixed number of times, then settles.
    struct FlakyBackend {
        balance_failures: u32,
        balance_calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new(balance_failures: u32) -> Self {
            Self {
                balance_failures,
                balance_calls: AtomicU32::new(0),
            }
        }
    }

    impl WalletBackend for FlakyBackend {
        async fn balance(&self, _asset_id: &str) -> Result<u64, WalletError> {
            let call = self.balance_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.balance_failures {
                Err(WalletError::Provider {
                    message: format!("connection reset on call {call}"),
                })
            } else {
                Ok(1_234)
            }
        }

        async fn execute_swap(&self, _order: &SwapOrder) -> Result<String, WalletError> {
            Ok("0xdeadbeef".to_string())
        }
    }

    /// Rejects every swap submission.
    #[derive(Debug)]
    struct RejectingBackend;

    impl WalletBackend for RejectingBackend {
        async fn balance(&self, _asset_id: &str) -> Result<u64, WalletError> {
            Ok(0)
        }

        async fn execute_swap(&self, _order: &SwapOrder) -> Result<String, WalletError> {
            Err(WalletError::Rejected {
                message: "insufficient gas".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn balance_retries_transient_backend_failures() {
        let metrics = Arc::new(MetricsRegistry::new());
        let wallet = Wallet::new(
            FlakyBackend::new(2),
            WalletConfig::default(),
            Arc::clone(&metrics),
        )
        .unwrap();

        let balance = wallet.balance("0xaaa").await.unwrap();

        assert_eq!(balance, 1_234);
        assert!((error_count(&metrics, BALANCE_OPERATION) - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn swap_returns_transaction_id() {
        let metrics = Arc::new(MetricsRegistry::new());
        let wallet = Wallet::new(
            FlakyBackend::new(0),
            WalletConfig::default(),
            Arc::clone(&metrics),
        )
        .unwrap();

        let tx_id = wallet.execute_swap(&order()).await.unwrap();

        assert_eq!(tx_id, "0xdeadbeef");
        assert!((error_count(&metrics, EXECUTE_SWAP_OPERATION) - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_swap_reports_attempts_and_counts() {
        let metrics = Arc::new(MetricsRegistry::new());
        let wallet = Wallet::new(
            RejectingBackend,
            WalletConfig::default(),
            Arc::clone(&metrics),
        )
        .unwrap();

        let error = wallet.execute_swap(&order()).await.unwrap_err();

        match error {
            WalletError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, WalletError::Rejected { .. }));
            }
            other => panic!("expected exhausted error, got {other:?}"),
        }
        assert!((error_count(&metrics, EXECUTE_SWAP_OPERATION) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn second_wallet_on_same_registry_is_rejected() {
        let metrics = Arc::new(MetricsRegistry::new());
        let _first = Wallet::new(
            FlakyBackend::new(0),
            WalletConfig::default(),
            Arc::clone(&metrics),
        )
        .unwrap();

        let second = Wallet::new(RejectingBackend, WalletConfig::default(), metrics);

        assert!(matches!(second.unwrap_err(), WalletError::Metrics(_)));
    }
}
