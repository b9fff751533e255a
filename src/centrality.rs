//! PageRank over the directed adjacency of a graph
//!
//! Degree needs no pass of its own; it is recorded when the store is
//! materialized.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::config::CentralityConfig;
use crate::model::GraphStore;

/// Key of PageRank scores in [`crate::model::Node::computed`]
pub const PAGERANK_KEY: &str = "pagerank";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CentralityError {
    /// A neighbor list references a node that has no entry of its own
    #[error("unknown node in adjacency: {0}")]
    UnknownNode(String),

    #[error("damping factor must be within [0, 1], got {0}")]
    InvalidDamping(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRankOptions {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PageRankOptions {
    fn default() -> Self {
        Self::from(&CentralityConfig::default())
    }
}

impl From<&CentralityConfig> for PageRankOptions {
    fn from(config: &CentralityConfig) -> Self {
        Self {
            damping: config.damping,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

/// PageRank scores of every node in `adjacency`
///
/// Each out-edge carries an equal share of its source's score, so parallel
/// edges weigh more. Dangling nodes spread their score over all nodes.
pub fn page_rank(
    adjacency: &BTreeMap<String, Vec<String>>,
    options: &PageRankOptions,
) -> Result<BTreeMap<String, f64>, CentralityError> {
    if !(0.0..=1.0).contains(&options.damping) {
        return Err(CentralityError::InvalidDamping(options.damping));
    }

    let ids: Vec<&str> = adjacency.keys().map(String::as_str).collect();
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let out: Vec<Vec<usize>> = adjacency
        .values()
        .map(|neighbors| {
            neighbors
                .iter()
                .map(|n| {
                    index
                        .get(n.as_str())
                        .copied()
                        .ok_or_else(|| CentralityError::UnknownNode(n.clone()))
                })
                .collect::<Result<Vec<usize>, _>>()
        })
        .collect::<Result<_, _>>()?;

    let n = ids.len();
    match ids.as_slice() {
        [] => return Ok(BTreeMap::new()),
        [only] => return Ok(BTreeMap::from([(only.to_string(), 1.0)])),
        _ => {}
    }
    let uniform = 1.0 / n as f64;
    let mut scores = vec![uniform; n];

    for iteration in 0..options.max_iterations {
        let dangling: f64 = out
            .iter()
            .zip(&scores)
            .filter(|(neighbors, _)| neighbors.is_empty())
            .map(|(_, score)| score)
            .sum();
        let mut next = vec![dangling * uniform; n];
        for (source, neighbors) in out.iter().enumerate() {
            let share = scores[source] / neighbors.len().max(1) as f64;
            for &target in neighbors {
                next[target] += share;
            }
        }

        let mut delta = 0.0_f64;
        for (score, redistributed) in scores.iter_mut().zip(next) {
            let updated = options.damping * redistributed + (1.0 - options.damping) * uniform;
            delta = delta.max((updated - *score).abs());
            *score = updated;
        }
        if delta < options.tolerance {
            tracing::debug!(iterations = iteration + 1, "pagerank converged");
            break;
        }
    }

    Ok(ids
        .into_iter()
        .map(String::from)
        .zip(scores)
        .collect())
}

/// New store revision with PageRank written to every node's computed values
pub fn annotate_page_rank(
    graph: &GraphStore,
    options: &PageRankOptions,
) -> Result<(GraphStore, BTreeMap<String, f64>), CentralityError> {
    let scores = page_rank(&graph.directed_adjacency(), options)?;
    let mut annotated = graph.clone();
    for node in annotated.nodes_mut() {
        if let Some(score) = scores.get(&node.id) {
            node.computed.insert(PAGERANK_KEY.to_string(), *score);
        }
    }
    Ok((annotated, scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attributes;
    use crate::model::tests::store;
    use proptest::prelude::*;

    fn adjacency(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(id, out)| (id.to_string(), out.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn empty_graph_has_no_scores() {
        let scores = page_rank(&BTreeMap::new(), &PageRankOptions::default()).unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn single_node_scores_one() {
        let scores = page_rank(&adjacency(&[("a", &[])]), &PageRankOptions::default()).unwrap();
        assert_eq!(scores["a"], 1.0);
    }

    #[test]
    fn symmetric_cycle_is_uniform() {
        let scores = page_rank(
            &adjacency(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]),
            &PageRankOptions::default(),
        )
        .unwrap();
        for score in scores.values() {
            assert!((score - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn hub_collects_the_most_rank() {
        let scores = page_rank(
            &adjacency(&[("hub", &[]), ("a", &["hub"]), ("b", &["hub"]), ("c", &["hub", "a"])]),
            &PageRankOptions::default(),
        )
        .unwrap();
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(scores["hub"] > scores["a"]);
        assert!(scores["a"] > scores["b"]);
    }

    #[test]
    fn unknown_neighbor_is_an_error() {
        let err = page_rank(&adjacency(&[("a", &["ghost"])]), &PageRankOptions::default());
        assert_eq!(err, Err(CentralityError::UnknownNode("ghost".to_string())));
    }

    #[test]
    fn invalid_damping_is_an_error() {
        let options = PageRankOptions {
            damping: 1.5,
            ..PageRankOptions::default()
        };
        let err = page_rank(&adjacency(&[("a", &[])]), &options);
        assert!(matches!(err, Err(CentralityError::InvalidDamping(_))));
    }

    #[test]
    fn annotation_leaves_input_untouched() {
        let g = store(
            vec![("a", Attributes::new()), ("b", Attributes::new())],
            &[("a", "b")],
        );
        let (annotated, scores) = annotate_page_rank(&g, &PageRankOptions::default()).unwrap();

        assert!(g.nodes().iter().all(|n| !n.computed.contains_key(PAGERANK_KEY)));
        assert_eq!(annotated.node("b").unwrap().computed[PAGERANK_KEY], scores["b"]);
        assert!(scores["b"] > scores["a"]);
    }

    proptest! {
        #[test]
        fn scores_form_a_distribution(
            n in 2usize..15,
            edges in prop::collection::vec((0usize..15, 0usize..15), 0..40),
        ) {
            let mut adj: BTreeMap<String, Vec<String>> =
                (0..n).map(|i| (format!("n{i}"), Vec::new())).collect();
            for (s, t) in edges {
                if let Some(out) = adj.get_mut(&format!("n{}", s % n)) {
                    out.push(format!("n{}", t % n));
                }
            }
            let scores = page_rank(&adj, &PageRankOptions::default()).unwrap();

            prop_assert_eq!(scores.len(), n);
            let total: f64 = scores.values().sum();
            prop_assert!((total - 1.0).abs() < 1e-2);
            prop_assert!(scores.values().all(|s| *s > 0.0 && *s < 1.0));
        }
    }
}
