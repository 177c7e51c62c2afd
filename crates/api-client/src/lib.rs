// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared abstractions for external API integrations
//!
//! This crate provides the common surface every external integration
//! implements, so the service can monitor and report on heterogeneous
//! clients (chain indexers, DEX route services, notification senders)
//! uniformly.
//!
//! # Core Abstractions
//!
//! - **`ApiClient` Trait**: Common interface for all external API clients with async support
//! - **Health Check System**: Standardized health status reporting across all clients
//! - **Error Handling**: Comprehensive `ApiError` types for different failure scenarios
//!
//! # Key Features
//!
//! - **Async-First Design**: All operations return `impl Future` for efficient async execution
//! - **Health Monitoring**: Built-in health check with `Up`, `Degraded`, and `Down` statuses
//! - **Error Classification**: Detailed error types for authentication, network, and format issues
//! - **Type Safety**: Strong typing prevents runtime errors from invalid configurations

use thiserror::Error;

pub mod health;

pub use health::*;

/// Generic trait for external API clients
///
/// Integrations expose their own domain operations directly; this trait
/// covers the part the service treats uniformly: identifying the client
/// and probing whether it is reachable.
pub trait ApiClient: Send + Sync {
    /// Check the health of this API client
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails
    fn health_check(&self) -> impl Future<Output = Result<HealthStatus, ApiError>> + Send;

    /// Get the name/identifier of this API client
    fn name(&self) -> &'static str;
}

/// Common errors that can occur when working with API clients
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {message}")]
    Http { message: String },

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Invalid response format
    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    /// Service unavailable
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Network timeout
    #[error("Request timeout after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Client independent error
    #[error(transparent)]
    Custom { error: anyhow::Error },
}
