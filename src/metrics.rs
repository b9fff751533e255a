//! Per-field distributions under the active filters
//!
//! [`recompute`] is called on every filter change. Global counts describe the
//! whole loaded graph and must not move while the user filters, so they are
//! carried over from the previous computation whenever it is compatible; only
//! the filtered counts are rescanned.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::fields::{Field, FieldCatalogue, FieldKind, FieldValue};
use crate::filters::{Filter, filtered_nodes};
use crate::model::{GraphStore, Node};

/// Buckets aimed for when partitioning a numeric extent
const TARGET_BUCKETS: f64 = 10.0;

/// Upper bound on bucket count, for extents beyond float precision
const MAX_BUCKETS: usize = 100;

/// Samples kept for content fields
const SAMPLE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermsMetricValue {
    pub id: String,
    pub label: String,
    pub global_count: usize,
    pub filtered_count: usize,
}

/// Half-open bucket `[min, max)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeBucket {
    pub id: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub global_count: usize,
    pub filtered_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metric {
    /// Values sorted by descending global count
    Terms { values: Vec<TermsMetricValue> },
    Range { unit: f64, buckets: Vec<RangeBucket> },
    Search { samples: Vec<String> },
}

/// Output of [`recompute`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsResult {
    /// `None` when no filter is active
    pub filtered_nodes: Option<BTreeSet<String>>,
    /// Keyed by field id
    pub metrics: BTreeMap<String, Metric>,
}

/// Compute the metric of every node field under `filters`
pub fn recompute(
    graph: &GraphStore,
    catalogue: &FieldCatalogue,
    filters: &[Filter],
    previous: Option<&BTreeMap<String, Metric>>,
) -> MetricsResult {
    let filtered = filtered_nodes(graph, filters, catalogue);
    let selection = Selection {
        graph,
        filtered: filtered.as_ref(),
    };

    let mut metrics = BTreeMap::new();
    for field in catalogue.node_fields() {
        let previous = previous.and_then(|p| p.get(&field.id));
        let metric = match &field.kind {
            FieldKind::Qualitative { values } => terms_metric(field, values, &selection, previous),
            FieldKind::Quantitative { min, max } => {
                range_metric(field, *min, *max, &selection, previous)
            }
            FieldKind::Content => match previous {
                Some(metric @ Metric::Search { .. }) => metric.clone(),
                _ => search_metric(field, graph),
            },
        };
        metrics.insert(field.id.clone(), metric);
    }

    tracing::debug!(
        fields = metrics.len(),
        filtered = filtered.as_ref().map(BTreeSet::len),
        "recomputed metrics"
    );
    MetricsResult {
        filtered_nodes: filtered,
        metrics,
    }
}

struct Selection<'a> {
    graph: &'a GraphStore,
    filtered: Option<&'a BTreeSet<String>>,
}

impl Selection<'_> {
    fn all(&self) -> impl Iterator<Item = &Node> {
        self.graph.nodes().iter()
    }

    fn kept(&self) -> impl Iterator<Item = &Node> {
        self.graph
            .nodes()
            .iter()
            .filter(|n| self.filtered.is_none_or(|set| set.contains(&n.id)))
    }
}

fn count_terms<'a>(field: &Field, nodes: impl Iterator<Item = &'a Node>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for node in nodes {
        let ids: HashSet<&str> = field
            .terms(node)
            .iter()
            .filter_map(|term| field.value_id(term))
            .collect();
        for id in ids {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn terms_metric(
    field: &Field,
    values: &BTreeMap<String, FieldValue>,
    selection: &Selection<'_>,
    previous: Option<&Metric>,
) -> Metric {
    let global: HashMap<String, usize> = match previous {
        Some(Metric::Terms { values: known }) if same_values(known, values) => known
            .iter()
            .map(|v| (v.id.clone(), v.global_count))
            .collect(),
        _ => count_terms(field, selection.all()),
    };
    let filtered = count_terms(field, selection.kept());

    let mut out: Vec<TermsMetricValue> = values
        .values()
        .map(|v| TermsMetricValue {
            id: v.id.clone(),
            label: v.label.clone(),
            global_count: global.get(&v.id).copied().unwrap_or(0),
            filtered_count: filtered.get(&v.id).copied().unwrap_or(0),
        })
        .collect();
    out.sort_by(|a, b| {
        (Reverse(a.global_count), &a.label).cmp(&(Reverse(b.global_count), &b.label))
    });
    Metric::Terms { values: out }
}

fn same_values(known: &[TermsMetricValue], values: &BTreeMap<String, FieldValue>) -> bool {
    let known: HashSet<&str> = known.iter().map(|v| v.id.as_str()).collect();
    known.len() == values.len() && values.values().all(|v| known.contains(v.id.as_str()))
}

fn range_metric(
    field: &Field,
    min: f64,
    max: f64,
    selection: &Selection<'_>,
    previous: Option<&Metric>,
) -> Metric {
    let (unit, bounds): (f64, Vec<(f64, f64)>) = match previous {
        Some(Metric::Range { unit, buckets }) => {
            (*unit, buckets.iter().map(|b| (b.min, b.max)).collect())
        }
        _ => bucket_bounds(min, max),
    };

    let bucket_of = |node: &Node| bucket_index(&bounds, field.number(node)?);
    let mut global = vec![0usize; bounds.len()];
    for i in selection.all().filter_map(&bucket_of) {
        global[i] += 1;
    }
    let mut filtered = vec![0usize; bounds.len()];
    for i in selection.kept().filter_map(&bucket_of) {
        filtered[i] += 1;
    }

    let decimals = unit_decimals(unit);
    let buckets = bounds
        .iter()
        .enumerate()
        .map(|(i, &(lo, hi))| RangeBucket {
            id: i.to_string(),
            label: format!("[{lo:.decimals$}, {hi:.decimals$})"),
            min: lo,
            max: hi,
            global_count: global[i],
            filtered_count: filtered[i],
        })
        .collect();
    Metric::Range { unit, buckets }
}

fn search_metric(field: &Field, graph: &GraphStore) -> Metric {
    let mut samples: Vec<String> = Vec::new();
    for term in graph.nodes().iter().filter_map(|n| field.value(n)?.as_term()) {
        if samples.len() == SAMPLE_COUNT {
            break;
        }
        if !samples.contains(&term) {
            samples.push(term);
        }
    }
    Metric::Search { samples }
}

/// Contiguous half-open buckets covering `[min, max]`, with their width
///
/// The width is the "nice" step (1, 2 or 5 times a power of ten) closest
/// above a tenth of the extent. The first bucket starts on a multiple of the
/// width, never above `min`, and the last one ends past `max` (open-ended
/// when float precision runs out).
pub fn bucket_bounds(min: f64, max: f64) -> (f64, Vec<(f64, f64)>) {
    if !min.is_finite() || !max.is_finite() || max < min {
        return (1.0, Vec::new());
    }
    // halved so that extents wider than f64::MAX stay finite
    let half_extent = max / 2.0 - min / 2.0;
    let unit = nice_unit(half_extent / TARGET_BUCKETS * 2.0);
    let start = ((min / unit).floor() * unit).min(min);

    let mut bounds = Vec::new();
    let mut low = start;
    while bounds.len() < MAX_BUCKETS {
        let mut high = start + (bounds.len() + 1) as f64 * unit;
        if high <= low {
            high = f64::INFINITY;
        }
        bounds.push((low, high));
        if high > max {
            break;
        }
        low = high;
    }
    if let Some(last) = bounds.last_mut() {
        if last.1 <= max {
            last.1 = f64::INFINITY;
        }
    }
    (unit, bounds)
}

/// Index of the half-open bucket holding `value`
fn bucket_index(bounds: &[(f64, f64)], value: f64) -> Option<usize> {
    let i = bounds.partition_point(|&(_, hi)| hi <= value);
    bounds.get(i).filter(|&&(lo, _)| value >= lo).map(|_| i)
}

fn nice_unit(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = match raw / magnitude {
        r if r <= 1.0 => 1.0,
        r if r <= 2.0 => 2.0,
        r if r <= 5.0 => 5.0,
        _ => 10.0,
    };
    step * magnitude
}

fn unit_decimals(unit: f64) -> usize {
    if unit >= 1.0 {
        0
    } else {
        (-unit.log10().floor()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldsConfig;
    use crate::fields::infer_fields;
    use crate::model::tests::{attrs, num, store, text};

    fn fixture() -> (GraphStore, FieldCatalogue) {
        let rows = [
            ("rust|cli", 3.0, "first"),
            ("web", 12.0, "second"),
            ("rust", 25.0, "third"),
            ("cli|web", 47.0, "fourth"),
            ("web", 95.0, "fifth"),
            ("rust|web", 50.0, "sixth"),
        ];
        let ids: Vec<String> = (0..rows.len()).map(|i| format!("n{i}")).collect();
        let nodes = ids
            .iter()
            .zip(rows)
            .map(|(id, (topics, stars, note))| {
                (
                    id.as_str(),
                    attrs(&[("topics", text(topics)), ("stars", num(stars)), ("note", text(note))]),
                )
            })
            .collect();
        let g = store(nodes, &[]);
        let catalogue = infer_fields(&g, &FieldsConfig::default(), &[]);
        (g, catalogue)
    }

    fn terms(metric: &Metric) -> Vec<(&str, usize, usize)> {
        match metric {
            Metric::Terms { values } => values
                .iter()
                .map(|v| (v.label.as_str(), v.global_count, v.filtered_count))
                .collect(),
            other => panic!("expected terms metric, got {other:?}"),
        }
    }

    #[test]
    fn unfiltered_metrics_cover_every_node_field() {
        let (g, catalogue) = fixture();
        let result = recompute(&g, &catalogue, &[], None);

        assert_eq!(result.filtered_nodes, None);
        assert_eq!(result.metrics.len(), 3);
        assert_eq!(
            terms(&result.metrics["t"]),
            vec![("web", 4, 4), ("rust", 3, 3), ("cli", 2, 2)]
        );
    }

    #[test]
    fn filtered_counts_follow_filters() {
        let (g, catalogue) = fixture();
        let filters = [Filter::range("s", None, Some(30.0))];
        let result = recompute(&g, &catalogue, &filters, None);

        assert_eq!(result.filtered_nodes.as_ref().map(BTreeSet::len), Some(3));
        assert_eq!(
            terms(&result.metrics["t"]),
            vec![("web", 4, 1), ("rust", 3, 2), ("cli", 2, 1)]
        );
    }

    #[test]
    fn global_counts_are_stable_across_recomputation() {
        let (g, catalogue) = fixture();
        let filters = [Filter::range("s", Some(20.0), None)];
        let first = recompute(&g, &catalogue, &filters, None);
        let second = recompute(&g, &catalogue, &filters, Some(&first.metrics));
        assert_eq!(first, second);

        let unfiltered = recompute(&g, &catalogue, &[], Some(&second.metrics));
        let globals = |r: &MetricsResult| terms(&r.metrics["t"]).iter().map(|t| t.1).collect::<Vec<_>>();
        assert_eq!(globals(&unfiltered), globals(&first));
    }

    #[test]
    fn previous_global_counts_are_reused() {
        let (g, catalogue) = fixture();
        let mut previous = recompute(&g, &catalogue, &[], None).metrics;
        if let Some(Metric::Terms { values }) = previous.get_mut("t") {
            for v in values.iter_mut() {
                v.global_count = 100;
            }
        }
        let result = recompute(&g, &catalogue, &[], Some(&previous));
        assert!(terms(&result.metrics["t"]).iter().all(|t| t.1 == 100));
    }

    #[test]
    fn incompatible_previous_metric_is_rescanned() {
        let (g, catalogue) = fixture();
        let mut previous = BTreeMap::new();
        previous.insert(
            "t".to_string(),
            Metric::Terms {
                values: vec![TermsMetricValue {
                    id: "zz".to_string(),
                    label: "zz".to_string(),
                    global_count: 100,
                    filtered_count: 100,
                }],
            },
        );
        let result = recompute(&g, &catalogue, &[], Some(&previous));
        assert_eq!(terms(&result.metrics["t"])[0], ("web", 4, 4));
    }

    #[test]
    fn range_buckets_cover_the_extent() {
        let (g, catalogue) = fixture();
        let result = recompute(&g, &catalogue, &[], None);
        let Metric::Range { unit, buckets } = &result.metrics["s"] else {
            panic!("expected range metric");
        };

        assert_eq!(*unit, 10.0);
        assert_eq!(buckets.first().map(|b| b.min), Some(0.0));
        assert!(buckets.last().is_some_and(|b| b.max > 95.0));
        assert!(buckets.windows(2).all(|w| w[0].max == w[1].min));
        assert_eq!(buckets.iter().map(|b| b.global_count).sum::<usize>(), 6);
        assert_eq!(buckets[4].label, "[40, 50)");
        assert_eq!(buckets[4].global_count, 1);
    }

    #[test]
    fn range_reuses_previous_buckets() {
        let (g, catalogue) = fixture();
        let mut previous = BTreeMap::new();
        previous.insert(
            "s".to_string(),
            Metric::Range {
                unit: 50.0,
                buckets: vec![
                    RangeBucket {
                        id: "0".to_string(),
                        label: "low".to_string(),
                        min: 0.0,
                        max: 50.0,
                        global_count: 0,
                        filtered_count: 0,
                    },
                    RangeBucket {
                        id: "1".to_string(),
                        label: "high".to_string(),
                        min: 50.0,
                        max: 100.0,
                        global_count: 0,
                        filtered_count: 0,
                    },
                ],
            },
        );
        let result = recompute(&g, &catalogue, &[], Some(&previous));
        let Metric::Range { unit, buckets } = &result.metrics["s"] else {
            panic!("expected range metric");
        };
        assert_eq!(*unit, 50.0);
        let counts: Vec<usize> = buckets.iter().map(|b| b.global_count).collect();
        assert_eq!(counts, vec![4, 2]);
    }

    #[test]
    fn content_samples_are_distinct_and_reused() {
        let (g, catalogue) = fixture();
        let result = recompute(&g, &catalogue, &[], None);
        assert_eq!(
            result.metrics["n"],
            Metric::Search {
                samples: vec!["first".into(), "second".into(), "third".into()]
            }
        );

        let mut previous = BTreeMap::new();
        previous.insert("n".to_string(), Metric::Search { samples: vec!["kept".into()] });
        let result = recompute(&g, &catalogue, &[], Some(&previous));
        assert_eq!(result.metrics["n"], Metric::Search { samples: vec!["kept".into()] });
    }

    #[test]
    fn bucket_bounds_for_degenerate_extent() {
        let (unit, bounds) = bucket_bounds(4.0, 4.0);
        assert_eq!(unit, 1.0);
        assert_eq!(bounds, vec![(4.0, 5.0)]);
        assert!(bucket_bounds(f64::NAN, 1.0).1.is_empty());
    }

    #[test]
    fn fractional_extents_keep_every_value() {
        let (unit, bounds) = bucket_bounds(0.018, 0.031);
        assert!((unit - 0.002).abs() < 1e-12);
        assert!(bounds[0].0 <= 0.018);
        assert!(bounds.last().is_some_and(|b| b.1 > 0.031));

        let nodes = [("a", 0.018), ("b", 0.025), ("c", 0.031)]
            .into_iter()
            .map(|(id, ratio)| (id, attrs(&[("ratio", num(ratio))])))
            .collect();
        let g = store(nodes, &[]);
        let catalogue = infer_fields(&g, &FieldsConfig::default(), &[]);
        let result = recompute(&g, &catalogue, &[], None);
        let Metric::Range { buckets, .. } = &result.metrics["r"] else {
            panic!("expected range metric");
        };
        assert_eq!(buckets.iter().map(|b| b.global_count).sum::<usize>(), 3);
        assert_eq!(buckets.iter().map(|b| b.filtered_count).sum::<usize>(), 3);
    }

    #[test]
    fn huge_extents_are_still_covered() {
        let (unit, bounds) = bucket_bounds(-f64::MAX, f64::MAX);
        assert!(unit.is_finite());
        assert!(!bounds.is_empty() && bounds.len() <= MAX_BUCKETS);
        assert!(bounds[0].0 <= -f64::MAX);
        assert!(bounds.last().is_some_and(|b| b.1 > f64::MAX));
        assert_eq!(bucket_index(&bounds, f64::MAX), Some(bounds.len() - 1));
        assert_eq!(bucket_index(&bounds, -f64::MAX), Some(0));
    }

    #[test]
    fn values_outside_reused_buckets_are_not_counted() {
        let bounds = [(0.0, 10.0), (10.0, 20.0)];
        assert_eq!(bucket_index(&bounds, 10.0), Some(1));
        assert_eq!(bucket_index(&bounds, -1.0), None);
        assert_eq!(bucket_index(&bounds, 20.0), None);
    }

    #[test]
    fn bucket_units_are_nice() {
        assert_eq!(bucket_bounds(0.0, 190.0).0, 20.0);
        assert!((bucket_bounds(0.0, 1.0).0 - 0.1).abs() < 1e-12);
        assert_eq!(bucket_bounds(1000.0, 6000.0).0, 500.0);
    }
}
