// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Pull-based exposition: snapshot the table into Prometheus metric families

use prometheus::proto;

use crate::registry::{Family, MetricKind, MetricsRegistry};

impl MetricsRegistry {
    /// Snapshots every registered series into Prometheus metric families.
    ///
    /// Values are read at call time under the table lock, so a scrape
    /// reflects the latest `set`/`increment` calls with no buffering.
    /// Families come out sorted by name for stable scrape output; series
    /// within a family keep registration order.
    pub fn gather(&self) -> Vec<proto::MetricFamily> {
        let families = self.table();
        let mut entries: Vec<(&String, &Family)> = families.iter().collect();
        entries.sort_by(|(left, _), (right, _)| left.cmp(right));
        entries
            .into_iter()
            .map(|(name, family)| build_family(name, family))
            .collect()
    }
}

fn build_family(name: &str, family: &Family) -> proto::MetricFamily {
    let mut out = proto::MetricFamily::default();
    out.set_name(name.to_string());
    out.set_help(family.help.clone());
    out.set_field_type(match family.kind {
        MetricKind::Counter => proto::MetricType::COUNTER,
        MetricKind::Gauge => proto::MetricType::GAUGE,
    });

    for series in &family.series {
        let mut metric = proto::Metric::default();
        for (key, value) in series.labels.iter() {
            let mut pair = proto::LabelPair::default();
            pair.set_name(key.to_string());
            pair.set_value(value.to_string());
            metric.label.push(pair);
        }
        match family.kind {
            MetricKind::Counter => {
                let mut counter = proto::Counter::default();
                counter.set_value(series.value);
                metric.set_counter(counter);
            }
            MetricKind::Gauge => {
                let mut gauge = proto::Gauge::default();
                gauge.set_value(series.value);
                metric.set_gauge(gauge);
            }
        }
        out.mut_metric().push(metric);
    }
    out
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder, proto::MetricType};

    use crate::{DUPLICATE_REGISTRATION_METRIC, LabelSet, MetricsRegistry};

    fn encode(registry: &MetricsRegistry) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn gather_orders_families_by_name() {
        let registry = MetricsRegistry::new();
        registry
            .register_counter("zulu", "last", LabelSet::new())
            .unwrap();
        registry
            .register_gauge("alpha", "first", LabelSet::new())
            .unwrap();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "alpha".to_string(),
                DUPLICATE_REGISTRATION_METRIC.to_string(),
                "zulu".to_string(),
            ]
        );
    }

    #[test]
    fn series_keep_registration_order_within_a_family() {
        let registry = MetricsRegistry::new();
        registry
            .register_counter("hits", "hits", LabelSet::from([("route", "b")]))
            .unwrap();
        registry
            .register_counter("hits", "hits", LabelSet::from([("route", "a")]))
            .unwrap();

        let families = registry.gather();
        let hits = families
            .iter()
            .find(|family| family.get_name() == "hits")
            .unwrap();
        let routes: Vec<&str> = hits
            .get_metric()
            .iter()
            .map(|metric| metric.get_label()[0].get_value())
            .collect();

        assert_eq!(routes, vec!["b", "a"]);
    }

    #[test]
    fn gather_reads_values_at_scrape_time() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("a", "1")]);
        registry.register_counter("x", "an x", labels.clone()).unwrap();

        registry.increment("x", &labels).unwrap();
        let first = registry.gather();
        registry.increment("x", &labels).unwrap();
        let second = registry.gather();

        let read = |families: &[prometheus::proto::MetricFamily]| {
            families
                .iter()
                .find(|family| family.get_name() == "x")
                .map(|family| family.get_metric()[0].get_counter().value())
                .unwrap()
        };
        assert_eq!(read(&first), 1.0);
        assert_eq!(read(&second), 2.0);
    }

    #[test]
    fn family_kind_follows_first_registration() {
        let registry = MetricsRegistry::new();
        registry
            .register_counter("mixed", "first one wins", LabelSet::from([("n", "1")]))
            .unwrap();
        registry
            .register_gauge("mixed", "first one wins", LabelSet::from([("n", "2")]))
            .unwrap();

        let families = registry.gather();
        let mixed = families
            .iter()
            .find(|family| family.get_name() == "mixed")
            .unwrap();

        assert_eq!(mixed.get_field_type(), MetricType::COUNTER);
        assert_eq!(mixed.get_metric().len(), 2);
    }

    #[test]
    fn text_encoding_renders_labels_and_values() {
        let registry = MetricsRegistry::new();
        let labels = LabelSet::from([("operation", "find_route")]);
        registry
            .register_counter("request_errors_total", "errors", labels.clone())
            .unwrap();
        registry.increment("request_errors_total", &labels).unwrap();
        registry.register_gauge_if_absent("pool_depth", "depth", LabelSet::new());
        registry.set("pool_depth", 2.5, &LabelSet::new()).unwrap();

        let text = encode(&registry);

        assert!(text.contains("# TYPE request_errors_total counter"));
        assert!(text.contains("request_errors_total{operation=\"find_route\"} 1"));
        assert!(text.contains("# TYPE pool_depth gauge"));
        assert!(text.contains("pool_depth 2.5"));
        assert!(text.contains(&format!("# TYPE {DUPLICATE_REGISTRATION_METRIC} counter")));
    }
}
