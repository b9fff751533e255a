//! Node filters
//!
//! A filter is a predicate over one field. Filters combine with AND, and a
//! filter that names an unknown field, or a field of another type, never
//! matches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::fields::{FieldCatalogue, FieldKind, Population};
use crate::minimize::normalize;
use crate::model::{GraphStore, Node};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", from = "FilterInput")]
pub enum Filter {
    /// Numeric value in `[min, max)`; a missing bound is unbounded
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Any of the element's terms has one of the accepted value ids
    Terms {
        field: String,
        values: BTreeSet<String>,
    },
    /// Normalized substring search
    Search {
        field: String,
        value: String,
        normalized: String,
    },
}

/// Deserialized form; the normalized search text is always derived
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FilterInput {
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    Terms {
        field: String,
        values: BTreeSet<String>,
    },
    Search {
        field: String,
        value: String,
    },
}

impl From<FilterInput> for Filter {
    fn from(input: FilterInput) -> Self {
        match input {
            FilterInput::Range { field, min, max } => Filter::range(field, min, max),
            FilterInput::Terms { field, values } => Filter::Terms { field, values },
            FilterInput::Search { field, value } => Filter::search(field, &value),
        }
    }
}

impl Filter {
    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Filter::Range {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn terms<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search(field: impl Into<String>, value: &str) -> Self {
        Filter::Search {
            field: field.into(),
            value: value.to_string(),
            normalized: normalize(value),
        }
    }

    /// Id of the field this filter reads
    pub fn field(&self) -> &str {
        match self {
            Filter::Range { field, .. }
            | Filter::Terms { field, .. }
            | Filter::Search { field, .. } => field,
        }
    }

    pub fn matches(&self, node: &Node, catalogue: &FieldCatalogue) -> bool {
        let Some(field) = catalogue
            .get(self.field())
            .filter(|f| f.population == Population::Nodes)
        else {
            return false;
        };

        match (self, &field.kind) {
            (Filter::Range { min, max, .. }, FieldKind::Quantitative { .. }) => {
                field.number(node).is_some_and(|v| {
                    min.is_none_or(|min| v >= min) && max.is_none_or(|max| v < max)
                })
            }
            (Filter::Terms { values, .. }, FieldKind::Qualitative { .. }) => field
                .terms(node)
                .iter()
                .filter_map(|term| field.value_id(term))
                .any(|id| values.contains(id)),
            (Filter::Search { normalized, .. }, FieldKind::Content) => field
                .value(node)
                .and_then(|v| v.as_term())
                .is_some_and(|term| normalize(&term).contains(normalized.as_str())),
            _ => false,
        }
    }
}

/// Whether `node` passes every filter
pub fn filter_node(node: &Node, filters: &[Filter], catalogue: &FieldCatalogue) -> bool {
    filters.iter().all(|f| f.matches(node, catalogue))
}

/// Ids of the nodes passing `filters`, or `None` when no filter is active
pub fn filtered_nodes(
    graph: &GraphStore,
    filters: &[Filter],
    catalogue: &FieldCatalogue,
) -> Option<BTreeSet<String>> {
    if filters.is_empty() {
        return None;
    }
    Some(
        graph
            .nodes()
            .iter()
            .filter(|n| filter_node(n, filters, catalogue))
            .map(|n| n.id.clone())
            .collect(),
    )
}

/// Ids of the edges with both endpoints in `nodes`
pub fn filtered_edges(graph: &GraphStore, nodes: &BTreeSet<String>) -> BTreeSet<String> {
    graph
        .edges()
        .iter()
        .filter(|e| nodes.contains(&e.source) && nodes.contains(&e.target))
        .map(|e| e.id.clone())
        .collect()
}
