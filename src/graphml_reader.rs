//! GraphML Reader
//!
//! Reads GraphML documents. Attribute names and types come from `<key>`
//! declarations; `edgedefault` on `<graph>` sets directedness unless an edge
//! carries its own `directed` attribute.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::io::{GraphReader, IoError, IoResult, malformed, xml_attributes};
use crate::model::{AttributeValue, Attributes, RawEdge, RawGraph};

/// GraphML `attr.type` values read as numbers
const NUMERIC_TYPES: [&str; 4] = ["int", "long", "float", "double"];

/// Reader for GraphML (.graphml) documents
pub struct GraphmlReader;

impl GraphmlReader {
    /// Create a new GraphML reader
    pub fn new() -> Self {
        Self
    }
}

impl Default for GraphmlReader {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphReader for GraphmlReader {
    fn read(&self, text: &str) -> IoResult<RawGraph> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut parser = GraphmlParser::default();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    parser.depth += 1;
                    parser.open(&e)?;
                }
                Ok(Event::Empty(e)) => {
                    parser.open(&e)?;
                    parser.close(e.local_name().as_ref())?;
                }
                Ok(Event::End(e)) => {
                    parser.depth = parser.depth.saturating_sub(1);
                    parser.close(e.local_name().as_ref())?;
                }
                Ok(Event::Text(t)) => {
                    if parser.capturing() {
                        parser.text.push_str(&t.unescape().map_err(malformed)?);
                    }
                }
                Ok(Event::CData(t)) => {
                    if parser.capturing() {
                        parser.text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(IoError::MalformedInput(format!(
                        "error at position {}: {e}",
                        reader.error_position()
                    )));
                }
                _ => {}
            }
        }

        if !parser.seen_root {
            return Err(malformed("missing <graphml> root element"));
        }
        if parser.depth != 0 {
            return Err(malformed("unexpected end of document"));
        }
        Ok(parser.raw)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["graphml"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Node,
    Edge,
    All,
    Other,
}

impl Domain {
    fn applies_to(self, other: Domain) -> bool {
        self == other || self == Domain::All
    }
}

#[derive(Debug, Clone)]
struct KeyDecl {
    name: String,
    domain: Domain,
    numeric: bool,
    default: Option<String>,
}

#[derive(Debug)]
enum Pending {
    Node { id: String, attributes: Attributes },
    Edge(RawEdge),
}

impl Pending {
    fn domain(&self) -> Domain {
        match self {
            Pending::Node { .. } => Domain::Node,
            Pending::Edge(_) => Domain::Edge,
        }
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Pending::Node { attributes, .. } => attributes,
            Pending::Edge(edge) => &mut edge.attributes,
        }
    }
}

#[derive(Default)]
struct GraphmlParser {
    raw: RawGraph,
    keys: HashMap<String, KeyDecl>,
    current_key: Option<String>,
    in_default: bool,
    current_data: Option<String>,
    text: String,
    edge_default_directed: bool,
    stack: Vec<Pending>,
    depth: usize,
    seen_root: bool,
}

impl GraphmlParser {
    fn capturing(&self) -> bool {
        self.in_default || self.current_data.is_some()
    }

    fn open(&mut self, e: &BytesStart<'_>) -> IoResult<()> {
        let attrs = xml_attributes(e)?;
        match e.local_name().as_ref() {
            b"graphml" => self.seen_root = true,
            b"key" => {
                let id = attrs
                    .get("id")
                    .cloned()
                    .ok_or_else(|| malformed("<key> without id"))?;
                let domain = match attrs.get("for").map(String::as_str) {
                    Some("node") => Domain::Node,
                    Some("edge") => Domain::Edge,
                    Some("all") | None => Domain::All,
                    Some(_) => Domain::Other,
                };
                let numeric = attrs
                    .get("attr.type")
                    .is_some_and(|t| NUMERIC_TYPES.contains(&t.to_ascii_lowercase().as_str()));
                let name = attrs.get("attr.name").cloned().unwrap_or_else(|| id.clone());
                self.keys.insert(
                    id.clone(),
                    KeyDecl {
                        name,
                        domain,
                        numeric,
                        default: None,
                    },
                );
                self.current_key = Some(id);
            }
            b"default" => {
                if self.current_key.is_some() {
                    self.in_default = true;
                    self.text.clear();
                }
            }
            b"graph" => {
                self.edge_default_directed = attrs
                    .get("edgedefault")
                    .is_some_and(|d| d.eq_ignore_ascii_case("directed"));
            }
            b"node" => {
                let id = attrs
                    .get("id")
                    .cloned()
                    .ok_or_else(|| malformed("<node> without id"))?;
                self.stack.push(Pending::Node {
                    id,
                    attributes: Attributes::new(),
                });
            }
            b"edge" => {
                let source = attrs
                    .get("source")
                    .cloned()
                    .ok_or_else(|| malformed("<edge> without source"))?;
                let target = attrs
                    .get("target")
                    .cloned()
                    .ok_or_else(|| malformed("<edge> without target"))?;
                let directed = match attrs.get("directed").map(String::as_str) {
                    Some("true") => true,
                    Some("false") => false,
                    _ => self.edge_default_directed,
                };
                self.stack.push(Pending::Edge(RawEdge {
                    id: attrs.get("id").cloned(),
                    source,
                    target,
                    directed,
                    attributes: Attributes::new(),
                }));
            }
            b"data" => {
                if !self.stack.is_empty() {
                    let key = attrs
                        .get("key")
                        .cloned()
                        .ok_or_else(|| malformed("<data> without key"))?;
                    self.current_data = Some(key);
                    self.text.clear();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> IoResult<()> {
        match name {
            b"key" => self.current_key = None,
            b"default" => {
                if self.in_default {
                    self.in_default = false;
                    if let Some(decl) = self
                        .current_key
                        .as_ref()
                        .and_then(|key| self.keys.get_mut(key))
                    {
                        decl.default = Some(std::mem::take(&mut self.text));
                    }
                }
            }
            b"data" => {
                if let Some(key) = self.current_data.take() {
                    let text = std::mem::take(&mut self.text);
                    if let Some(pending) = self.stack.last_mut() {
                        let (name, numeric) = match self.keys.get(&key) {
                            Some(decl) => (decl.name.clone(), decl.numeric),
                            None => (key, false),
                        };
                        pending
                            .attributes_mut()
                            .insert(name, AttributeValue::typed(&text, numeric));
                    }
                }
            }
            b"node" | b"edge" => {
                let Some(mut pending) = self.stack.pop() else {
                    return Err(malformed("unbalanced element"));
                };
                self.apply_defaults(&mut pending);
                match pending {
                    Pending::Node { id, attributes } => self.raw.add_node(id, attributes),
                    Pending::Edge(edge) => self.raw.add_edge(edge),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_defaults(&self, pending: &mut Pending) {
        let domain = pending.domain();
        let bag = pending.attributes_mut();
        for decl in self.keys.values() {
            if !decl.domain.applies_to(domain) {
                continue;
            }
            if let Some(default) = &decl.default {
                bag.entry(decl.name.clone())
                    .or_insert_with(|| AttributeValue::typed(default, decl.numeric));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="license" attr.type="string">
    <default>none</default>
  </key>
  <key id="d1" for="node" attr.name="forks" attr.type="int"/>
  <key id="d2" for="node" attr.name="x" attr.type="double"/>
  <key id="d3" for="node" attr.name="y" attr.type="double"/>
  <key id="d4" for="edge" attr.name="weight" attr.type="double"/>
  <key id="d5" for="node" attr.name="label" attr.type="string"/>
  <graph id="G" edgedefault="directed">
    <node id="n0">
      <data key="d0">MIT</data>
      <data key="d1">42</data>
      <data key="d2">1.5</data>
      <data key="d3">2</data>
      <data key="d5">Node &amp; zero</data>
    </node>
    <node id="n1"/>
    <edge id="e0" source="n0" target="n1"><data key="d4">0.5</data></edge>
    <edge source="n1" target="n2" directed="false"/>
  </graph>
</graphml>"#;

    #[test]
    fn graphml_reader_supports_graphml_extension() {
        let reader = GraphmlReader::new();
        assert!(reader.supports_extension("graphml"));
        assert!(reader.supports_extension("GraphML"));
        assert!(!reader.supports_extension("gexf"));
    }

    #[test]
    fn graphml_reader_types_data_by_key_declaration() {
        let raw = GraphmlReader::new().read(SAMPLE).expect("Should parse GraphML");
        let n0 = &raw.nodes[0].attributes;

        assert_eq!(n0["license"], AttributeValue::Text("MIT".into()));
        assert_eq!(n0["forks"], AttributeValue::Number(42.0));
        assert_eq!(n0["x"], AttributeValue::Number(1.5));
        assert_eq!(n0["y"], AttributeValue::Number(2.0));
        assert_eq!(n0["label"], AttributeValue::Text("Node & zero".into()));
    }

    #[test]
    fn graphml_reader_applies_key_defaults() {
        let raw = GraphmlReader::new().read(SAMPLE).unwrap();
        let n1 = &raw.nodes[1].attributes;
        assert_eq!(n1["license"], AttributeValue::Text("none".into()));
        assert!(!n1.contains_key("forks"));
    }

    #[test]
    fn graphml_reader_honors_per_edge_direction() {
        let raw = GraphmlReader::new().read(SAMPLE).unwrap();
        assert!(raw.edges[0].directed);
        assert_eq!(raw.edges[0].attributes["weight"], AttributeValue::Number(0.5));
        assert!(!raw.edges[1].directed);
        assert!(raw.edges[1].id.is_none());
    }

    #[test]
    fn graphml_reader_creates_nodes_referenced_by_edges() {
        let raw = GraphmlReader::new().read(SAMPLE).unwrap();
        assert_eq!(raw.nodes.len(), 3);
        assert_eq!(raw.nodes[2].id, "n2");
    }

    #[test]
    fn graphml_reader_rejects_malformed_xml() {
        let result = GraphmlReader::new().read("<graphml><graph><node id=\"a\"></graph></graphml>");
        assert!(matches!(result, Err(IoError::MalformedInput(_))));
    }

    #[test]
    fn graphml_reader_rejects_other_documents() {
        let result = GraphmlReader::new().read("<gexf><graph/></gexf>");
        assert!(matches!(result, Err(IoError::MalformedInput(_))));
    }
}
