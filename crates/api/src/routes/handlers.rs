// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP request handlers module
//!
//! This module provides HTTP request handlers for the swap API server:
//! the readiness endpoint consumed by orchestrators and the Prometheus
//! metrics exposition endpoint consumed by scrapers.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::Response,
};
use prometheus::{Encoder, TextEncoder};

use crate::{
    error::{ServerError, ServerResult},
    state::{AppStatus, ServerState},
};

/// Readiness endpoint handler
///
/// Answers 200 while every configured client is reachable and 500 as soon as
/// any client reports down, so orchestrators restart the service instead of
/// letting it limp along. The status body is served either way.
pub async fn healthz_handler(State(state): State<ServerState>) -> (StatusCode, Json<AppStatus>) {
    let status = state.health_check().await;

    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (code, Json(status))
}

/// Metrics exposition endpoint handler
///
/// Renders every registered series in Prometheus text format. Values are read
/// at scrape time, so a scrape always observes the latest counter increments.
pub async fn metrics_handler(State(state): State<ServerState>) -> ServerResult<Response<String>> {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics().gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ServerError::Runtime {
            message: format!("failed to encode metrics: {e}"),
        })?;

    let body = String::from_utf8(buffer).map_err(|e| ServerError::Runtime {
        message: format!("metrics output was not valid UTF-8: {e}"),
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(body)
        .map_err(|e| ServerError::Runtime {
            message: format!("failed to build metrics response: {e}"),
        })
}
