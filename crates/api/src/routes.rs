// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! This module provides route configuration and handlers for the swap API server.

pub mod handlers;

use axum::{Router, routing::get};
use handlers::{healthz_handler, metrics_handler};

use crate::state::ServerState;

/// Create application routes
pub fn create_routes() -> Router<ServerState> {
    // Probe and scrape endpoints live at the root; neither is versioned.
    let health_routes = Router::new().route("/healthz", get(healthz_handler));
    let metrics_routes = Router::new().route("/metrics", get(metrics_handler));

    Router::new().merge(health_routes).merge(metrics_routes)
}
