// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! External API integrations for the swap pipeline
//!
//! This crate provides implementations of the `ApiClient` trait for the
//! external services the swap pipeline depends on, along with a client set
//! for service-wide health reporting and a retrying wallet wrapper for swap
//! execution.
//!
//! # Architecture
//!
//! - **Client Implementations**: [`aptos`], [`mira`], [`telegram`] - specific API integrations
//! - **Client Set**: [`clients::ClientSet`] - aggregates configured clients for health reporting
//! - **Wallet Wrapper**: [`wallet::Wallet`] - retrying execution over a chain-specific backend
//! - **Validation Utilities**: [`non_empty_string::NonEmptyString`] - ensures non-empty string constraints
//!
//! # Features
//!
//! - **Batched Metadata Lookups**: Many assets resolve through a single indexer query
//! - **Concurrent Health Checks**: Uses `tokio::join!` for efficient health monitoring
//! - **Retry with Linear Backoff**: Every outbound operation runs under a shared retry policy
//! - **Failure Accounting**: Terminal failures are counted per operation in the metrics registry
//! - **Testing Support**: Comprehensive test coverage using wiremock for HTTP simulation

pub mod aptos;
pub mod clients;
pub mod mira;
pub mod non_empty_string;
pub mod telegram;
pub mod wallet;

pub use aptos::*;
pub use clients::*;
pub use mira::*;
pub use non_empty_string::NonEmptyString;
pub use telegram::*;
pub use wallet::*;
