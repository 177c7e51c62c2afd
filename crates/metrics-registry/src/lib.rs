// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! In-process registry of named, labeled counter and gauge series
//!
//! Unlike the macro-driven static metrics most services use, this registry is
//! an explicit object: integrations register their series against a shared
//! handle at construction time, and a scrape renders whatever is registered at
//! that moment. Uniqueness per (name, label-set) is enforced on registration,
//! and rejected duplicates are themselves counted by an always-present
//! self-observing counter so registration bugs show up on dashboards.
//!
//! # Features
//!
//! - **Explicit lifecycle**: one registry built in `main` (or one per test),
//!   shared via `Arc`, with nothing global and no process-wide statics
//! - **Dynamic registration**: series exist only after an explicit
//!   registration call, never implicitly on first update
//! - **Pull-based exposition**: [`MetricsRegistry::gather`] snapshots current
//!   values into Prometheus metric families for text encoding at scrape time

mod export;
mod registry;

pub use registry::{DUPLICATE_REGISTRATION_METRIC, LabelSet, MetricsError, MetricsRegistry};
