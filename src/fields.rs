//! Field inference
//!
//! Every attribute key of the nodes (and, separately, of the edges) becomes
//! one or more [`Field`]s: quantitative, qualitative or free-text content.
//! The catalogue is rebuilt once per loaded graph by [`prepare`], which also
//! produces the store revision the rest of the engine reads:
//!
//! 1. date keys are split into numeric `<key>_year` and `<key>_month` attributes;
//! 2. every remaining key is classified and gets a minimized id;
//! 3. keys read purely as numbers have their numeric text rewritten to numbers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::FieldsConfig;
use crate::minimize::minimize;
use crate::model::{
    AttributeValue, Attributes, DEGREE_KEY, Element, GraphStore, RESERVED_KEYS, parse_number,
};

/// Key prefixes that force a single field type
const FORCED_PREFIXES: [(&str, FieldType); 3] = [
    ("quanti_", FieldType::Quantitative),
    ("quali_", FieldType::Qualitative),
    ("content_", FieldType::Content),
];

/// Which elements a field describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    Nodes,
    Edges,
}

/// Semantic type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Quantitative,
    Qualitative,
    Content,
}

impl FieldType {
    fn id_suffix(self) -> &'static str {
        match self {
            FieldType::Quantitative => "qn",
            FieldType::Qualitative => "ql",
            FieldType::Content => "ct",
        }
    }

    pub fn qualifier(self) -> &'static str {
        match self {
            FieldType::Quantitative => "quantitative",
            FieldType::Qualitative => "qualitative",
            FieldType::Content => "content",
        }
    }
}

/// One distinct value of a qualitative field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub id: String,
    pub label: String,
    /// Number of occurrences over the whole population
    pub count: usize,
}

/// Type-specific part of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Quantitative { min: f64, max: f64 },
    /// Values keyed by their raw term
    Qualitative { values: BTreeMap<String, FieldValue> },
    Content,
}

impl FieldKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::Quantitative { .. } => FieldType::Quantitative,
            FieldKind::Qualitative { .. } => FieldType::Qualitative,
            FieldKind::Content => FieldType::Content,
        }
    }
}

/// An inferred interpretation of one attribute key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    /// Minimized identifier, unique in the catalogue
    pub id: String,
    pub label: String,
    /// Attribute key (or computed key) the values are read from
    pub key: String,
    pub population: Population,
    /// Values come from the engine (degree, pagerank) rather than the input
    pub computed: bool,
    /// Elements without a value
    pub missing: usize,
    /// Separator of multi-value text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separator: Option<char>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    /// Value of this field on `element`, if present
    pub fn value(&self, element: &impl Element) -> Option<AttributeValue> {
        if self.computed {
            return element
                .computed_value(&self.key)
                .map(AttributeValue::Number);
        }
        element
            .attributes()
            .get(&self.key)
            .filter(|v| v.is_present())
            .cloned()
    }

    /// Numeric value of this field on `element`
    pub fn number(&self, element: &impl Element) -> Option<f64> {
        self.value(element)?.as_number()
    }

    /// Atomic terms of this field on `element` (several for multi-value text)
    pub fn terms(&self, element: &impl Element) -> Vec<String> {
        self.value(element)
            .map(|v| self.split(&v))
            .unwrap_or_default()
    }

    /// Split a value into atomic terms
    pub fn split(&self, value: &AttributeValue) -> Vec<String> {
        match (self.separator, value) {
            (Some(separator), AttributeValue::Text(text)) => split_atoms(text, separator),
            _ => value.as_term().into_iter().collect(),
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// Id of a qualitative value term
    pub fn value_id(&self, term: &str) -> Option<&str> {
        match &self.kind {
            FieldKind::Qualitative { values } => values.get(term).map(|v| v.id.as_str()),
            _ => None,
        }
    }
}

fn split_atoms(text: &str, separator: char) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// All fields of a loaded graph
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldCatalogue {
    fields: Vec<Field>,
}

impl FieldCatalogue {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn get(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Fields describing nodes; these are the filterable ones
    pub fn node_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.population == Population::Nodes)
    }

    pub fn edge_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.population == Population::Edges)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add (or replace) a computed quantitative node field; returns its id
    pub fn add_computed(&mut self, key: &str, label: &str, min: f64, max: f64) -> String {
        let previous = self
            .fields
            .iter()
            .position(|f| f.computed && f.key == key);
        let id = match previous {
            Some(i) => self.fields.remove(i).id,
            None => {
                let taken: HashSet<&str> = self.fields.iter().map(|f| f.id.as_str()).collect();
                let mut candidate = key.to_string();
                let mut n = 1;
                while taken.contains(candidate.as_str()) {
                    candidate = format!("{key}{n}");
                    n += 1;
                }
                candidate
            }
        };
        self.fields.push(Field {
            id: id.clone(),
            label: label.to_string(),
            key: key.to_string(),
            population: Population::Nodes,
            computed: true,
            missing: 0,
            separator: None,
            kind: FieldKind::Quantitative { min, max },
        });
        id
    }
}

/// A store revision together with its field catalogue
#[derive(Debug, Clone)]
pub struct Prepared {
    pub graph: GraphStore,
    pub fields: FieldCatalogue,
}

/// Derive date attributes, infer the catalogue and reindex numeric text
pub fn prepare(graph: &GraphStore, config: &FieldsConfig) -> Prepared {
    let (derived, split_keys) = derive_date_attributes(graph, &config.date_keys);
    let fields = infer_fields(&derived, config, &split_keys);
    let graph = reindex_numeric(&derived, &fields);
    tracing::debug!(
        fields = fields.len(),
        date_keys = split_keys.len(),
        "inferred field catalogue"
    );
    Prepared { graph, fields }
}

/// Classify a multiset of values drawn from `population` elements
///
/// All-numeric values are quantitative. Values with more than one and fewer
/// than `max(population^0.75, 5)` distinct terms are qualitative, but an
/// all-numeric key only qualifies when some of its numbers arrived as text.
/// Anything else is content.
pub fn infer_field_types(values: &[AttributeValue], population: usize) -> Vec<FieldType> {
    let present: Vec<&AttributeValue> = values.iter().filter(|v| v.is_present()).collect();
    if present.is_empty() {
        return Vec::new();
    }

    let all_numeric = present.iter().all(|v| v.as_number().is_some());
    let numeric_text = present.iter().any(|v| v.is_numeric_text());
    let distinct: HashSet<String> = present.iter().filter_map(|v| v.as_term()).collect();
    let threshold = (population as f64).powf(0.75).max(5.0);
    let qualitative = distinct.len() > 1 && (distinct.len() as f64) < threshold;

    let mut types = Vec::new();
    if all_numeric {
        types.push(FieldType::Quantitative);
    }
    if qualitative && (!all_numeric || numeric_text) {
        types.push(FieldType::Qualitative);
    }
    if types.is_empty() {
        types.push(FieldType::Content);
    }
    types
}

/// Key statistics gathered before ids are assigned
struct Candidate {
    key: String,
    label: String,
    population: Population,
    computed: bool,
    missing: usize,
    separator: Option<char>,
    types: Vec<FieldType>,
    atoms: Vec<AttributeValue>,
}

/// Build the field catalogue of `graph`, ignoring the keys in `skip`
pub fn infer_fields(graph: &GraphStore, config: &FieldsConfig, skip: &[String]) -> FieldCatalogue {
    let mut candidates = scan_population(graph.nodes(), Population::Nodes, config, skip);
    if graph.has_edges() {
        candidates.push(degree_candidate(graph));
    }
    candidates.extend(scan_population(graph.edges(), Population::Edges, config, skip));

    let keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
    let ids = minimize(&keys);

    let mut fields = Vec::new();
    for (candidate, id) in candidates.into_iter().zip(ids) {
        let ambiguous = candidate.types.len() > 1;
        for &field_type in &candidate.types {
            let (id, label) = if ambiguous {
                (
                    format!("{id}-{}", field_type.id_suffix()),
                    format!("{} ({})", candidate.label, field_type.qualifier()),
                )
            } else {
                (id.clone(), candidate.label.clone())
            };
            fields.push(Field {
                id,
                label,
                key: candidate.key.clone(),
                population: candidate.population,
                computed: candidate.computed,
                missing: candidate.missing,
                separator: candidate.separator,
                kind: build_kind(field_type, &candidate.atoms),
            });
        }
    }
    FieldCatalogue::new(fields)
}

fn scan_population<E: Element>(
    elements: &[E],
    population: Population,
    config: &FieldsConfig,
    skip: &[String],
) -> Vec<Candidate> {
    let total = elements.len();
    let keys: BTreeSet<&str> = elements
        .iter()
        .flat_map(|e| e.attributes().keys().map(String::as_str))
        .collect();

    let mut candidates = Vec::new();
    for key in keys {
        if RESERVED_KEYS.contains(&key) || skip.iter().any(|s| s == key) {
            continue;
        }
        let separator = config
            .multi_value_keys
            .iter()
            .any(|k| k == key)
            .then_some(config.multi_value_separator);

        let mut present = 0usize;
        let mut atoms = Vec::new();
        for element in elements {
            let Some(value) = element.attributes().get(key).filter(|v| v.is_present()) else {
                continue;
            };
            present += 1;
            match (separator, value) {
                (Some(sep), AttributeValue::Text(text)) => {
                    atoms.extend(split_atoms(text, sep).into_iter().map(AttributeValue::Text));
                }
                _ => atoms.push(value.clone()),
            }
        }
        if present == 0 {
            continue;
        }

        let (label, types) = match forced_type(key) {
            Some((field_type, label)) => (label.to_string(), vec![field_type]),
            None => (key.to_string(), infer_field_types(&atoms, total)),
        };
        candidates.push(Candidate {
            key: key.to_string(),
            label,
            population,
            computed: false,
            missing: total - present,
            separator,
            types,
            atoms,
        });
    }
    candidates
}

fn forced_type(key: &str) -> Option<(FieldType, &str)> {
    FORCED_PREFIXES.iter().find_map(|(prefix, field_type)| {
        key.strip_prefix(prefix)
            .filter(|rest| !rest.is_empty())
            .map(|rest| (*field_type, rest))
    })
}

fn degree_candidate(graph: &GraphStore) -> Candidate {
    let atoms = graph
        .nodes()
        .iter()
        .map(|n| AttributeValue::Number(n.computed_value(DEGREE_KEY).unwrap_or(0.0)))
        .collect();
    Candidate {
        key: DEGREE_KEY.to_string(),
        label: "Degree".to_string(),
        population: Population::Nodes,
        computed: true,
        missing: 0,
        separator: None,
        types: vec![FieldType::Quantitative],
        atoms,
    }
}

fn build_kind(field_type: FieldType, atoms: &[AttributeValue]) -> FieldKind {
    match field_type {
        FieldType::Quantitative => {
            let (min, max) = atoms
                .iter()
                .filter_map(AttributeValue::as_number)
                .fold(None, |acc: Option<(f64, f64)>, n| match acc {
                    Some((lo, hi)) => Some((lo.min(n), hi.max(n))),
                    None => Some((n, n)),
                })
                .unwrap_or((0.0, 0.0));
            FieldKind::Quantitative { min, max }
        }
        FieldType::Qualitative => {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for term in atoms.iter().filter_map(AttributeValue::as_term) {
                *counts.entry(term).or_default() += 1;
            }
            let labels: Vec<&str> = counts.keys().map(String::as_str).collect();
            let ids = minimize(&labels);
            let values = counts
                .iter()
                .zip(ids)
                .map(|((label, &count), id)| {
                    (
                        label.clone(),
                        FieldValue {
                            id,
                            label: label.clone(),
                            count,
                        },
                    )
                })
                .collect();
            FieldKind::Qualitative { values }
        }
        FieldType::Content => FieldKind::Content,
    }
}

/// Split date keys into numeric year and month attributes
///
/// Returns the new store revision and the keys that were split.
pub fn derive_date_attributes(graph: &GraphStore, date_keys: &[String]) -> (GraphStore, Vec<String>) {
    let mut derived = graph.clone();
    let mut split = BTreeSet::new();
    for node in derived.nodes_mut() {
        split_dates(&mut node.attributes, date_keys, &mut split);
    }
    for edge in derived.edges_mut() {
        split_dates(&mut edge.attributes, date_keys, &mut split);
    }
    (derived, split.into_iter().collect())
}

fn split_dates(attributes: &mut Attributes, date_keys: &[String], split: &mut BTreeSet<String>) {
    for key in date_keys {
        let Some(date) = attributes.get(key).and_then(parse_date) else {
            continue;
        };
        attributes.insert(
            format!("{key}_year"),
            AttributeValue::Number(f64::from(date.year())),
        );
        attributes.insert(
            format!("{key}_month"),
            AttributeValue::Number(f64::from(date.month())),
        );
        split.insert(key.clone());
    }
}

fn parse_date(value: &AttributeValue) -> Option<NaiveDate> {
    let AttributeValue::Text(text) = value else {
        return None;
    };
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").map(|d| d.date()))
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .ok()
}

/// Rewrite numeric text to numbers for keys read only as quantities
///
/// Keys that also have a qualitative reading keep their text so their terms
/// stay as written.
pub fn reindex_numeric(graph: &GraphStore, fields: &FieldCatalogue) -> GraphStore {
    let mut readings: HashMap<(Population, &str), usize> = HashMap::new();
    for field in fields.iter().filter(|f| !f.computed) {
        *readings.entry((field.population, field.key.as_str())).or_default() += 1;
    }
    let targets: Vec<(Population, &str)> = fields
        .iter()
        .filter(|f| {
            !f.computed
                && f.separator.is_none()
                && f.field_type() == FieldType::Quantitative
                && readings[&(f.population, f.key.as_str())] == 1
        })
        .map(|f| (f.population, f.key.as_str()))
        .collect();

    let mut next = graph.clone();
    for (population, key) in targets {
        match population {
            Population::Nodes => {
                for node in next.nodes_mut() {
                    rewrite_numeric(&mut node.attributes, key);
                }
            }
            Population::Edges => {
                for edge in next.edges_mut() {
                    rewrite_numeric(&mut edge.attributes, key);
                }
            }
        }
    }
    next
}

fn rewrite_numeric(attributes: &mut Attributes, key: &str) {
    let parsed = match attributes.get(key) {
        Some(AttributeValue::Text(text)) => parse_number(text),
        _ => None,
    };
    if let Some(n) = parsed {
        attributes.insert(key.to_string(), AttributeValue::Number(n));
    }
}
