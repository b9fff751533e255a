//! Attributed multigraph store
//!
//! `RawGraph` is what format readers produce: elements with a bag of typed
//! attributes and nothing else. `GraphStore::materialize` turns it into the
//! rendering-facing store, extracting position, size, color and label from the
//! bag and recording every substituted default in a [`Report`].

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::IngestionConfig;
use crate::report::Report;

/// Attribute keys consumed by the renderer rather than treated as data
pub const RESERVED_KEYS: [&str; 6] = ["x", "y", "z", "size", "color", "label"];

/// Key of the engine-computed degree in [`Node::computed`]
pub const DEGREE_KEY: &str = "degree";

/// A single attribute value
///
/// Readers emit `Number` only when the source format declared the attribute
/// numeric. Numeric-looking text stays `Text` until field inference decides
/// to reindex it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
    Missing,
}

impl AttributeValue {
    /// Parse `raw` as a number when `numeric` is set, falling back to text
    pub fn typed(raw: &str, numeric: bool) -> Self {
        if numeric {
            if let Some(n) = parse_number(raw) {
                return AttributeValue::Number(n);
            }
        }
        if raw.trim().is_empty() {
            AttributeValue::Missing
        } else {
            AttributeValue::Text(raw.to_string())
        }
    }

    /// Whether the value counts as present (not missing, not blank text)
    pub fn is_present(&self) -> bool {
        match self {
            AttributeValue::Number(n) => n.is_finite(),
            AttributeValue::Text(s) => !s.trim().is_empty(),
            AttributeValue::Missing => false,
        }
    }

    /// Numeric reading of the value, parsing numeric text
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) if n.is_finite() => Some(*n),
            AttributeValue::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Whether the value is numeric text rather than a declared number
    pub fn is_numeric_text(&self) -> bool {
        matches!(self, AttributeValue::Text(s) if parse_number(s).is_some())
    }

    /// String form used for qualitative terms and text search
    pub fn as_term(&self) -> Option<String> {
        match self {
            AttributeValue::Number(n) if n.is_finite() => Some(format_number(*n)),
            AttributeValue::Text(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// Parse a finite number out of trimmed text
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Canonical text form of a number (`3` rather than `3.0`)
pub fn format_number(n: f64) -> String {
    format!("{n}")
}

/// Attribute bag of a node or an edge
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A node as produced by a format reader
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: String,
    pub attributes: Attributes,
}

/// An edge as produced by a format reader
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    /// Edge id from the source, if it had one
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    pub directed: bool,
    pub attributes: Attributes,
}

/// Parsed multigraph before rendering fields are extracted
#[derive(Debug, Clone, Default)]
pub struct RawGraph {
    pub nodes: Vec<RawNode>,
    pub edges: Vec<RawEdge>,
    index: HashMap<String, usize>,
}

impl RawGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, merging attributes into an existing node with the same id
    pub fn add_node(&mut self, id: impl Into<String>, attributes: Attributes) {
        let id = id.into();
        match self.index.get(&id) {
            Some(&i) => {
                tracing::warn!(node = %id, "duplicate node id, merging attributes");
                self.nodes[i].attributes.extend(attributes);
            }
            None => {
                self.index.insert(id.clone(), self.nodes.len());
                self.nodes.push(RawNode { id, attributes });
            }
        }
    }

    /// Add an edge, creating any endpoint that was never declared as a node
    pub fn add_edge(&mut self, edge: RawEdge) {
        for endpoint in [&edge.source, &edge.target] {
            if !self.index.contains_key(endpoint) {
                self.add_node(endpoint.clone(), Attributes::new());
            }
        }
        self.edges.push(edge);
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}

/// A node with its rendering-facing fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub attributes: Attributes,
    pub x: f64,
    pub y: f64,
    pub label: String,
    /// Label fell back to the id; renderers show it in italics
    pub label_defaulted: bool,
    pub size: f64,
    pub color: String,
    /// Engine-derived values (degree, pagerank)
    pub computed: BTreeMap<String, f64>,
}

/// An edge with its rendering-facing fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub directed: bool,
    pub attributes: Attributes,
    pub size: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Read access shared by nodes and edges
pub trait Element {
    fn id(&self) -> &str;

    fn attributes(&self) -> &Attributes;

    /// Engine-derived value stored under `key`
    fn computed_value(&self, _key: &str) -> Option<f64> {
        None
    }
}

impl Element for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn computed_value(&self, key: &str) -> Option<f64> {
        self.computed.get(key).copied()
    }
}

impl Element for Edge {
    fn id(&self) -> &str {
        &self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// The attributed multigraph consumed by every other component
///
/// Invariant: every edge endpoint is a node of the store. Node and edge
/// order is the order of the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_index: HashMap<String, usize>,
}

impl GraphStore {
    /// Build the store from a parsed graph, defaulting missing rendering fields
    pub fn materialize(raw: RawGraph, defaults: &IngestionConfig) -> (Self, Report) {
        let mut report = Report::default();

        let mut nodes: Vec<Node> = raw
            .nodes
            .into_iter()
            .map(|n| {
                let x = n.attributes.get("x").and_then(AttributeValue::as_number);
                let y = n.attributes.get("y").and_then(AttributeValue::as_number);
                if x.is_none() || y.is_none() {
                    report.nodes_missing_position += 1;
                }
                let size = n
                    .attributes
                    .get("size")
                    .and_then(AttributeValue::as_number)
                    .unwrap_or_else(|| {
                        report.nodes_missing_size += 1;
                        defaults.default_node_size
                    });
                let color = text_attribute(&n.attributes, "color").unwrap_or_else(|| {
                    report.nodes_missing_color += 1;
                    defaults.default_node_color.clone()
                });
                let (label, label_defaulted) = match text_attribute(&n.attributes, "label") {
                    Some(label) => (label, false),
                    None => {
                        report.nodes_missing_label += 1;
                        (n.id.clone(), true)
                    }
                };
                Node {
                    id: n.id,
                    attributes: n.attributes,
                    x: x.unwrap_or(0.0),
                    y: y.unwrap_or(0.0),
                    label,
                    label_defaulted,
                    size,
                    color,
                    computed: BTreeMap::new(),
                }
            })
            .collect();

        let node_index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut taken: HashSet<String> = raw.edges.iter().filter_map(|e| e.id.clone()).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut next_generated = 0usize;
        let mut edges = Vec::with_capacity(raw.edges.len());
        for e in raw.edges {
            let id = match e.id {
                Some(id) if seen.insert(id.clone()) => id,
                explicit => {
                    if let Some(dup) = explicit {
                        tracing::warn!(edge = %dup, "duplicate edge id, generating a new one");
                    }
                    let id = loop {
                        let candidate = format!("e{next_generated}");
                        next_generated += 1;
                        if taken.insert(candidate.clone()) {
                            break candidate;
                        }
                    };
                    seen.insert(id.clone());
                    id
                }
            };
            let size = e
                .attributes
                .get("size")
                .and_then(AttributeValue::as_number)
                .unwrap_or_else(|| {
                    report.edges_missing_size += 1;
                    defaults.default_edge_size
                });
            let color = text_attribute(&e.attributes, "color").unwrap_or_else(|| {
                report.edges_missing_color += 1;
                defaults.default_edge_color.clone()
            });
            let label = text_attribute(&e.attributes, "label");
            edges.push(Edge {
                id,
                source: e.source,
                target: e.target,
                directed: e.directed,
                attributes: e.attributes,
                size,
                color,
                label,
            });
        }

        report.has_edges = !edges.is_empty();

        let mut degrees = vec![0usize; nodes.len()];
        for edge in &edges {
            for endpoint in [&edge.source, &edge.target] {
                if let Some(&i) = node_index.get(endpoint) {
                    degrees[i] += 1;
                }
            }
        }
        for (node, degree) in nodes.iter_mut().zip(degrees) {
            node.computed.insert(DEGREE_KEY.to_string(), degree as f64);
        }

        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            "materialized graph store"
        );

        (
            Self {
                nodes,
                edges,
                node_index,
            },
            report,
        )
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Mutable access to nodes, for passes that only move or restyle them
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_position(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    /// Number of nodes
    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_edges(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Out-neighbors of every node; undirected edges count in both directions
    pub fn directed_adjacency(&self) -> BTreeMap<String, Vec<String>> {
        let mut adjacency: BTreeMap<String, Vec<String>> = self
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();
        for edge in &self.edges {
            if let Some(out) = adjacency.get_mut(&edge.source) {
                out.push(edge.target.clone());
            }
            if !edge.directed {
                if let Some(out) = adjacency.get_mut(&edge.target) {
                    out.push(edge.source.clone());
                }
            }
        }
        adjacency
    }
}

fn text_attribute(attributes: &Attributes, key: &str) -> Option<String> {
    match attributes.get(key) {
        Some(AttributeValue::Text(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}
