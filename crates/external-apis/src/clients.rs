// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Client set for service-wide health reporting
//!
//! This module aggregates the configured external API clients and runs their
//! health checks concurrently, so readiness reporting sees every integration
//! in one pass.

use std::collections::HashMap;

use api_client::{ApiClient, HealthStatus};

use crate::{AptosClient, MiraClient, TelegramClient};

/// The set of configured external API clients
#[derive(Debug)]
pub struct ClientSet {
    aptos_client: Option<AptosClient>,
    mira_client: Option<MiraClient>,
    telegram_client: Option<TelegramClient>,
}

impl Default for ClientSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSet {
    /// Create a new empty client set
    pub fn new() -> Self {
        Self {
            aptos_client: None,
            mira_client: None,
            telegram_client: None,
        }
    }

    /// Create a client set with the specified clients
    pub fn with_clients(
        aptos_client: Option<AptosClient>,
        mira_client: Option<MiraClient>,
        telegram_client: Option<TelegramClient>,
    ) -> Self {
        Self {
            aptos_client,
            mira_client,
            telegram_client,
        }
    }

    /// The Aptos client, when configured
    pub fn aptos(&self) -> Option<&AptosClient> {
        self.aptos_client.as_ref()
    }

    /// The Mira client, when configured
    pub fn mira(&self) -> Option<&MiraClient> {
        self.mira_client.as_ref()
    }

    /// The Telegram client, when configured
    pub fn telegram(&self) -> Option<&TelegramClient> {
        self.telegram_client.as_ref()
    }

    /// Get the overall health status of all configured clients
    ///
    /// Health checks are performed concurrently for better performance.
    pub async fn get_overall_health(&self) -> HashMap<String, HealthStatus> {
        let mut health_status = HashMap::new();

        let aptos_future = async {
            if let Some(client) = &self.aptos_client {
                Some((client.name().to_string(), Self::check(client).await))
            } else {
                None
            }
        };

        let mira_future = async {
            if let Some(client) = &self.mira_client {
                Some((client.name().to_string(), Self::check(client).await))
            } else {
                None
            }
        };

        let telegram_future = async {
            if let Some(client) = &self.telegram_client {
                Some((client.name().to_string(), Self::check(client).await))
            } else {
                None
            }
        };

        let (aptos_result, mira_result, telegram_result) =
            tokio::join!(aptos_future, mira_future, telegram_future);

        if let Some((name, status)) = aptos_result {
            health_status.insert(name, status);
        }

        if let Some((name, status)) = mira_result {
            health_status.insert(name, status);
        }

        if let Some((name, status)) = telegram_result {
            health_status.insert(name, status);
        }

        health_status
    }

    async fn check<C: ApiClient>(client: &C) -> HealthStatus {
        match client.health_check().await {
            Ok(status) => status,
            Err(e) => HealthStatus::Down {
                reason: format!("Health check failed: {e}"),
            },
        }
    }

    /// Get the number of configured clients
    pub fn client_count(&self) -> usize {
        let mut count = 0;
        if self.aptos_client.is_some() {
            count += 1;
        }
        if self.mira_client.is_some() {
            count += 1;
        }
        if self.telegram_client.is_some() {
            count += 1;
        }
        count
    }

    /// Get the names of all configured clients
    pub fn client_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.aptos_client.is_some() {
            names.push("aptos");
        }
        if self.mira_client.is_some() {
            names.push("mira");
        }
        if self.telegram_client.is_some() {
            names.push("telegram");
        }
        names
    }
}
