// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Swap API Server Implementation
//!
//! This crate provides the main HTTP server for the swap service, built with Axum
//! and designed for production use with comprehensive configuration, middleware, and
//! graceful shutdown capabilities.
//!
//! # Module Structure
//!
//! - [`config`]: Server configuration and environment management with hierarchical loading
//! - [`error`]: Error types and HTTP response handling with proper status codes
//! - [`state`]: Shared application state management with cancellation token support
//! - [`server`]: Main server implementation, lifecycle, and coordinated shutdown
//! - [`routes`]: Route configuration and HTTP request handlers
//!
//! # Key Features
//!
//! - **External API Integration**: Wires Aptos, Mira, and Telegram clients from configuration
//! - **Graceful Shutdown**: Coordinated termination using `CancellationToken` with timeouts
//! - **Readiness Monitoring**: Aggregated health checks across all configured clients
//! - **Metrics Exposition**: Explicit registry served in Prometheus text format
//! - **Comprehensive Middleware**: Request ids, tracing, and timeouts

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Environment, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownConfig};
pub use state::{AppStatus, ServerState};
