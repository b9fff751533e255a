//! Engine facade
//!
//! [`load_graph`] runs the one-off pipeline for a file; [`recompute`] is the
//! per-interaction step. Every call takes its inputs explicitly and returns a
//! fresh snapshot; the only state carried between calls is the metrics map a
//! caller passes back in.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::centrality::{PAGERANK_KEY, PageRankOptions, annotate_page_rank};
use crate::config::EngineConfig;
use crate::fields::{Field, FieldCatalogue, FieldType, Population, prepare};
use crate::filters::{Filter, filtered_edges};
use crate::io::{FormatRegistry, IoResult};
use crate::layout::apply_fallback;
use crate::metrics::{self, Metric};
use crate::model::GraphStore;
use crate::report::{Diagnostic, Report, Severity};
use crate::visual::{self, Dimensions, SizeContext, SizeMap};

/// A graph ready for interrogation
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub graph: GraphStore,
    pub fields: FieldCatalogue,
    pub report: Report,
    /// The fallback layout computed the positions
    pub layout_applied: bool,
}

/// Ingest `text`, lay it out if needed and infer its fields
pub fn load_graph(
    registry: &FormatRegistry,
    file_name: &str,
    text: &str,
    config: &EngineConfig,
) -> IoResult<LoadedGraph> {
    let ingested = registry.ingest(file_name, text, &config.ingestion)?;
    let mut graph = ingested.graph;
    let layout_applied = apply_fallback(&mut graph, &ingested.report, &config.layout);
    let prepared = prepare(&graph, &config.fields);

    tracing::info!(
        file = file_name,
        nodes = prepared.graph.order(),
        edges = prepared.graph.edges().len(),
        fields = prepared.fields.len(),
        layout_applied,
        "graph loaded"
    );
    Ok(LoadedGraph {
        graph: prepared.graph,
        fields: prepared.fields,
        report: ingested.report,
        layout_applied,
    })
}

/// What node sizes are mapped from
#[derive(Debug, Clone, PartialEq)]
pub enum SizeSource {
    /// A quantitative node field, by id
    Field(String),
    PageRank,
}

/// User choices for the visual mapping
#[derive(Debug, Clone, PartialEq)]
pub struct VisualSettings {
    pub color_field: Option<String>,
    pub size: Option<SizeSource>,
    pub edge_size_field: Option<String>,
    pub size_ratio: f64,
}

impl Default for VisualSettings {
    fn default() -> Self {
        Self {
            color_field: None,
            size: None,
            edge_size_field: None,
            size_ratio: 1.0,
        }
    }
}

/// Inputs of one recomputation
#[derive(Debug, Clone, Copy)]
pub struct RecomputeRequest<'a> {
    pub graph: &'a GraphStore,
    pub fields: &'a FieldCatalogue,
    pub filters: &'a [Filter],
    pub dimensions: Dimensions,
    pub visual: &'a VisualSettings,
    pub previous_metrics: Option<&'a BTreeMap<String, Metric>>,
}

/// Snapshot handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedData {
    pub filtered_nodes: Option<BTreeSet<String>>,
    pub filtered_edges: Option<BTreeSet<String>>,
    pub metrics: BTreeMap<String, Metric>,
    pub node_colors: Option<BTreeMap<String, String>>,
    pub node_sizes: SizeMap,
    pub edge_sizes: SizeMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// Recompute metrics and visual maps for the current selection
pub fn recompute(request: &RecomputeRequest<'_>, config: &EngineConfig) -> ComputedData {
    let mut diagnostics = Vec::new();
    for filter in request.filters {
        if request.fields.get(filter.field()).is_none() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                format!("filter on unknown field '{}' matches nothing", filter.field()),
            ));
        }
    }

    let result = metrics::recompute(
        request.graph,
        request.fields,
        request.filters,
        request.previous_metrics,
    );
    let filtered_edges = result
        .filtered_nodes
        .as_ref()
        .map(|nodes| filtered_edges(request.graph, nodes));

    let color_field = lookup(
        request.fields,
        request.visual.color_field.as_deref(),
        Usage::NODE_COLOR,
        &mut diagnostics,
    );
    let node_colors = visual::get_node_colors(request.graph, color_field, &config.visual);

    let context = SizeContext::new(
        request.visual.size_ratio,
        request.dimensions,
        request.graph.order(),
    );
    let node_sizes = node_sizes(request, config, &context, &mut diagnostics);

    let edge_field = lookup(
        request.fields,
        request.visual.edge_size_field.as_deref(),
        Usage::EDGE_SIZE,
        &mut diagnostics,
    );
    let edge_sizes = visual::get_edge_sizes(
        request.graph,
        edge_field,
        config.visual.edge_size_range,
        &context,
    );

    diagnostics.sort_by_key(|d| d.severity);
    ComputedData {
        filtered_nodes: result.filtered_nodes,
        filtered_edges,
        metrics: result.metrics,
        node_colors,
        node_sizes,
        edge_sizes,
        diagnostics,
    }
}

/// What a visual mapping accepts from a field
struct Usage {
    role: &'static str,
    population: Population,
    types: &'static [FieldType],
}

impl Usage {
    const NODE_COLOR: Usage = Usage {
        role: "color",
        population: Population::Nodes,
        types: &[FieldType::Qualitative, FieldType::Quantitative],
    };
    const NODE_SIZE: Usage = Usage {
        role: "size",
        population: Population::Nodes,
        types: &[FieldType::Quantitative],
    };
    const EDGE_SIZE: Usage = Usage {
        role: "edge size",
        population: Population::Edges,
        types: &[FieldType::Quantitative],
    };
}

/// Resolve a visual field, warning when it is unknown or unusable
fn lookup<'a>(
    fields: &'a FieldCatalogue,
    id: Option<&str>,
    usage: Usage,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<&'a Field> {
    let id = id?;
    let role = usage.role;
    let problem = match fields.get(id) {
        None => format!("unknown {role} field '{id}'"),
        Some(field) if field.population != usage.population => format!(
            "{role} field '{id}' describes {}, ignored",
            population_name(field.population)
        ),
        Some(field) if !usage.types.contains(&field.field_type()) => format!(
            "{role} field '{id}' is {}, ignored",
            field.field_type().qualifier()
        ),
        Some(field) => return Some(field),
    };
    diagnostics.push(Diagnostic::new(Severity::Warning, problem));
    None
}

fn population_name(population: Population) -> &'static str {
    match population {
        Population::Nodes => "nodes",
        Population::Edges => "edges",
    }
}

fn node_sizes(
    request: &RecomputeRequest<'_>,
    config: &EngineConfig,
    context: &SizeContext,
    diagnostics: &mut Vec<Diagnostic>,
) -> SizeMap {
    let range = config.visual.node_size_range;
    match &request.visual.size {
        None => visual::get_node_sizes(request.graph, None, range, context),
        Some(SizeSource::Field(id)) => {
            let field = lookup(request.fields, Some(id), Usage::NODE_SIZE, diagnostics);
            visual::get_node_sizes(request.graph, field, range, context)
        }
        Some(SizeSource::PageRank) => {
            let options = PageRankOptions::from(&config.centrality);
            match annotate_page_rank(request.graph, &options) {
                Ok((annotated, scores)) => {
                    let min = scores.values().copied().fold(f64::INFINITY, f64::min);
                    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
                    let (min, max) = if scores.is_empty() { (0.0, 0.0) } else { (min, max) };
                    let mut fields = request.fields.clone();
                    let id = fields.add_computed(PAGERANK_KEY, "PageRank", min, max);
                    visual::get_node_sizes(&annotated, fields.get(&id), range, context)
                }
                Err(err) => {
                    tracing::info!(error = %err, "pagerank failed, sizing from raw sizes");
                    diagnostics.push(Diagnostic::info(format!(
                        "PageRank could not be computed ({err}), node sizes use the raw sizes"
                    )));
                    visual::get_node_sizes(request.graph, None, range, context)
                }
            }
        }
    }
}
