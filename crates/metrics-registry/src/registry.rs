// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Registry table, label matching, and registration/update semantics

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

/// Name of the always-present counter of rejected duplicate registrations.
pub const DUPLICATE_REGISTRATION_METRIC: &str = "metrics_registry_duplicate_registrations_total";

const DUPLICATE_REGISTRATION_HELP: &str =
    "Number of rejected duplicate metric registration attempts";

/// Errors surfaced by registry operations.
///
/// Both variants indicate call-site bugs rather than transient conditions:
/// a conflict means two places claimed the same series, a miss means an
/// update targeted a series that was never registered. Neither is ever
/// swallowed by the registry itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// A series with this name and label-set is already registered.
    #[error("duplicate registration for metric {name} with labels {labels}")]
    DuplicateRegistration {
        /// Metric name of the rejected registration.
        name: String,
        /// Label-set of the rejected registration.
        labels: LabelSet,
    },

    /// No registered series matches this name and label-set.
    #[error("metric {name} with labels {labels} not found")]
    NotFound {
        /// Metric name the update targeted.
        name: String,
        /// Label-set the update targeted.
        labels: LabelSet,
    },
}

/// An owned set of label key/value pairs identifying one series of a metric.
///
/// Two label-sets are equal iff they contain the same keys and every key maps
/// to the same value in both; insertion order never matters, and a key present
/// on one side only makes the sets unequal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of label pairs in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the set carries no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates label pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(pairs: I) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (position, (key, value)) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}=\"{value}\"")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetricKind {
    Counter,
    Gauge,
}

#[derive(Debug)]
pub(crate) struct Series {
    pub(crate) labels: LabelSet,
    pub(crate) value: f64,
}

/// One named metric: exposition kind, help text, and its registered series in
/// registration order.
#[derive(Debug)]
pub(crate) struct Family {
    pub(crate) kind: MetricKind,
    pub(crate) help: String,
    pub(crate) series: Vec<Series>,
}

/// Table of named, labeled numeric series with registration-time uniqueness.
///
/// The registry is created once and handed to every integration that records
/// metrics; tests build their own isolated instances. All operations take
/// `&self` and are safe to call concurrently; the table sits behind a single
/// mutex, so a registration's check-then-insert and an update's
/// read-then-write are each one indivisible step.
///
/// Series are registered explicitly, never on first update, and live for the
/// registry's lifetime; there is no deletion.
#[derive(Debug)]
pub struct MetricsRegistry {
    families: Mutex<HashMap<String, Family>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Creates a registry holding only the duplicate-registration
    /// self-counter, at zero.
    pub fn new() -> Self {
        let mut families = HashMap::new();
        families.insert(
            DUPLICATE_REGISTRATION_METRIC.to_string(),
            Family {
                kind: MetricKind::Counter,
                help: DUPLICATE_REGISTRATION_HELP.to_string(),
                series: vec![Series {
                    labels: LabelSet::new(),
                    value: 0.0,
                }],
            },
        );
        Self {
            families: Mutex::new(families),
        }
    }

    /// Registers a zero-valued counter series for `(name, labels)`.
    ///
    /// Rejects the call with [`MetricsError::DuplicateRegistration`] when the
    /// series already exists; the rejection also increments the
    /// self-observing duplicate counter, so registration bugs are visible on
    /// scrapes even if the caller mishandles the error.
    pub fn register_counter(
        &self,
        name: &str,
        help: &str,
        labels: LabelSet,
    ) -> Result<(), MetricsError> {
        self.register(name, help, labels, MetricKind::Counter)
    }

    /// Registers a zero-valued gauge series for `(name, labels)`.
    ///
    /// Same duplicate semantics as [`register_counter`](Self::register_counter).
    pub fn register_gauge(
        &self,
        name: &str,
        help: &str,
        labels: LabelSet,
    ) -> Result<(), MetricsError> {
        self.register(name, help, labels, MetricKind::Gauge)
    }

    /// Idempotent gauge registration.
    ///
    /// When the series already exists this returns without effect, with no
    /// error and no bump of the duplicate counter. Otherwise it registers a
    /// zero-valued gauge series.
    pub fn register_gauge_if_absent(&self, name: &str, help: &str, labels: LabelSet) {
        let mut families = self.table();
        if Self::contains(&families, name, &labels) {
            return;
        }
        Self::insert_series(&mut families, name, help, labels, MetricKind::Gauge);
    }

    /// Adds 1 to the series matching `(name, labels)` exactly.
    pub fn increment(&self, name: &str, labels: &LabelSet) -> Result<(), MetricsError> {
        self.update(name, labels, |value| value + 1.0)
    }

    /// Overwrites the value of the series matching `(name, labels)` exactly.
    pub fn set(&self, name: &str, value: f64, labels: &LabelSet) -> Result<(), MetricsError> {
        self.update(name, labels, |_| value)
    }

    /// Number of distinct label-sets registered under `name`; 0 when the name
    /// is unknown.
    pub fn series_count(&self, name: &str) -> usize {
        self.table()
            .get(name)
            .map_or(0, |family| family.series.len())
    }

    pub(crate) fn table(&self) -> MutexGuard<'_, HashMap<String, Family>> {
        self.families.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        name: &str,
        help: &str,
        labels: LabelSet,
        kind: MetricKind,
    ) -> Result<(), MetricsError> {
        let mut families = self.table();
        if Self::contains(&families, name, &labels) {
            Self::count_rejected_duplicate(&mut families);
            return Err(MetricsError::DuplicateRegistration {
                name: name.to_string(),
                labels,
            });
        }
        Self::insert_series(&mut families, name, help, labels, kind);
        Ok(())
    }

    fn update(
        &self,
        name: &str,
        labels: &LabelSet,
        apply: impl FnOnce(f64) -> f64,
    ) -> Result<(), MetricsError> {
        let mut families = self.table();
        let series = families
            .get_mut(name)
            .and_then(|family| {
                family
                    .series
                    .iter_mut()
                    .find(|series| &series.labels == labels)
            })
            .ok_or_else(|| MetricsError::NotFound {
                name: name.to_string(),
                labels: labels.clone(),
            })?;
        series.value = apply(series.value);
        Ok(())
    }

    fn contains(families: &HashMap<String, Family>, name: &str, labels: &LabelSet) -> bool {
        families.get(name).is_some_and(|family| {
            family
                .series
                .iter()
                .any(|series| &series.labels == labels)
        })
    }

    /// A name's kind and help are fixed by its first registration; later
    /// series under the same name join that family.
    fn insert_series(
        families: &mut HashMap<String, Family>,
        name: &str,
        help: &str,
        labels: LabelSet,
        kind: MetricKind,
    ) {
        let family = families.entry(name.to_string()).or_insert_with(|| Family {
            kind,
            help: help.to_string(),
            series: Vec::new(),
        });
        family.series.push(Series { labels, value: 0.0 });
    }

    fn count_rejected_duplicate(families: &mut HashMap<String, Family>) {
        if let Some(series) = families
            .get_mut(DUPLICATE_REGISTRATION_METRIC)
            .and_then(|family| family.series.first_mut())
        {
            series.value += 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn value_of(registry: &MetricsRegistry, name: &str, labels: &LabelSet) -> Option<f64> {
        registry
            .table()
            .get(name)
            .and_then(|family| {
                family
                    .series
                    .iter()
                    .find(|series| &series.labels == labels)
            })
            .map(|series| series.value)
    }

    fn duplicate_count(registry: &MetricsRegistry) -> f64 {
        value_of(registry, DUPLICATE_REGISTRATION_METRIC, &LabelSet::new()).unwrap()
    }

    #[test]
    fn fresh_registry_carries_zeroed_duplicate_counter() {
        let registry = MetricsRegistry::new();

        assert_eq!(registry.series_count(DUPLICATE_REGISTRATION_METRIC), 1);
        assert_eq!(duplicate_count(&registry), 0.0);
    }

    #[test]
    fn duplicate_registration_rejected_and_counted() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("a", "1")]);

        registry.register_counter("x", "an x", labels.clone()).unwrap();
        let error = registry
            .register_counter("x", "an x", labels.clone())
            .unwrap_err();

        assert_eq!(
            error,
            MetricsError::DuplicateRegistration {
                name: "x".to_string(),
                labels,
            }
        );
        assert_eq!(duplicate_count(&registry), 1.0);
        assert_eq!(registry.series_count("x"), 1);
    }

    #[test]
    fn distinct_label_set_registers_second_series() {
        let registry = MetricsRegistry::new();

        registry
            .register_counter("x", "an x", LabelSet::from([("a", "1")]))
            .unwrap();
        registry
            .register_counter("x", "an x", LabelSet::from([("a", "2")]))
            .unwrap();

        assert_eq!(registry.series_count("x"), 2);
        assert_eq!(duplicate_count(&registry), 0.0);
    }

    #[test]
    fn duplicate_detection_ignores_label_order() {
        let registry = MetricsRegistry::new();

        registry
            .register_gauge("depth", "queue depth", LabelSet::from([("a", "1"), ("b", "2")]))
            .unwrap();
        let error = registry
            .register_gauge("depth", "queue depth", LabelSet::from([("b", "2"), ("a", "1")]))
            .unwrap_err();

        assert!(matches!(error, MetricsError::DuplicateRegistration { .. }));
        assert_eq!(registry.series_count("depth"), 1);
    }

    #[test]
    fn gauge_if_absent_registers_once_without_error() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("asset", "0xa")]);

        registry.register_gauge_if_absent("balance", "wallet balance", labels.clone());
        registry.register_gauge_if_absent("balance", "wallet balance", labels.clone());

        assert_eq!(registry.series_count("balance"), 1);
        assert_eq!(duplicate_count(&registry), 0.0);
        assert_eq!(value_of(&registry, "balance", &labels), Some(0.0));
    }

    #[test]
    fn increment_adds_one_per_call() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("a", "1")]);
        registry.register_counter("x", "an x", labels.clone()).unwrap();

        registry.increment("x", &labels).unwrap();
        assert_eq!(value_of(&registry, "x", &labels), Some(1.0));

        registry.increment("x", &labels).unwrap();
        assert_eq!(value_of(&registry, "x", &labels), Some(2.0));
    }

    #[test]
    fn set_overwrites_regardless_of_prior_value() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("a", "1")]);
        registry.register_gauge("x", "an x", labels.clone()).unwrap();

        registry.increment("x", &labels).unwrap();
        registry.set("x", 42.0, &labels).unwrap();

        assert_eq!(value_of(&registry, "x", &labels), Some(42.0));
    }

    #[test]
    fn update_against_unknown_name_fails_and_changes_nothing() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("a", "1")]);
        registry.register_counter("x", "an x", labels.clone()).unwrap();

        let error = registry.increment("y", &labels).unwrap_err();

        assert_eq!(
            error,
            MetricsError::NotFound {
                name: "y".to_string(),
                labels: labels.clone(),
            }
        );
        assert_eq!(value_of(&registry, "x", &labels), Some(0.0));
    }

    #[test]
    fn update_requires_exact_label_match() {
        let registry = MetricsRegistry::new();
        registry
            .register_counter("x", "an x", LabelSet::from([("a", "1"), ("b", "2")]))
            .unwrap();

        // A subset of the registered labels is not a match.
        let error = registry
            .set("x", 5.0, &LabelSet::from([("a", "1")]))
            .unwrap_err();

        assert!(matches!(error, MetricsError::NotFound { .. }));
        assert_eq!(
            value_of(&registry, "x", &LabelSet::from([("a", "1"), ("b", "2")])),
            Some(0.0)
        );
    }

    #[test]
    fn series_count_is_zero_for_unregistered_names() {
        let registry = MetricsRegistry::new();

        assert_eq!(registry.series_count("missing"), 0);
    }

    #[test]
    fn label_set_displays_sorted_pairs() {
        let labels = LabelSet::from([("b", "2"), ("a", "1")]);

        assert_eq!(labels.to_string(), "{a=\"1\", b=\"2\"}");
        assert_eq!(LabelSet::new().to_string(), "{}");
    }

    #[test]
    fn error_display_names_metric_and_labels() {
        let error = MetricsError::NotFound {
            name: "x".to_string(),
            labels: LabelSet::from([("a", "1")]),
        };

        assert_eq!(error.to_string(), "metric x with labels {a=\"1\"} not found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_registrations_admit_exactly_one() {
        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register_counter(
                    "contended",
                    "raced registration",
                    LabelSet::from([("worker", "shared")]),
                )
            }));
        }

        let mut successes = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(MetricsError::DuplicateRegistration { .. }) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(duplicates, 15);
        assert_eq!(registry.series_count("contended"), 1);
        assert_eq!(duplicate_count(&registry), 15.0);
    }
}
