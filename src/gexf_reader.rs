//! GEXF Reader
//!
//! Reads GEXF 1.2/1.3 documents: typed `<attributes>` declarations with
//! defaults, `<attvalue>` data, `viz:` position/size/color elements, and
//! per-edge `type` overriding the graph's `defaultedgetype`.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::io::{GraphReader, IoError, IoResult, malformed, xml_attributes};
use crate::model::{AttributeValue, Attributes, RawEdge, RawGraph, parse_number};

/// GEXF attribute types read as numbers
const NUMERIC_TYPES: [&str; 6] = ["integer", "long", "float", "double", "short", "byte"];

/// Reader for GEXF (.gexf) documents
pub struct GexfReader;

impl GexfReader {
    /// Create a new GEXF reader
    pub fn new() -> Self {
        Self
    }
}

impl Default for GexfReader {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphReader for GexfReader {
    fn read(&self, text: &str) -> IoResult<RawGraph> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut parser = GexfParser::default();
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
                    if parser.in_default {
                        parser.default_text.push_str(&t.unescape().map_err(malformed)?);
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
            return Err(malformed("missing <gexf> root element"));
        }
        if parser.depth != 0 {
            return Err(malformed("unexpected end of document"));
        }
        Ok(parser.raw)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["gexf"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Class {
    Node,
    Edge,
}

#[derive(Debug, Clone)]
struct AttributeDecl {
    title: String,
    numeric: bool,
    default: Option<String>,
}

#[derive(Debug)]
enum Pending {
    Node { id: String, attributes: Attributes },
    Edge(RawEdge),
}

impl Pending {
    fn class(&self) -> Class {
        match self {
            Pending::Node { .. } => Class::Node,
            Pending::Edge(_) => Class::Edge,
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
struct GexfParser {
    raw: RawGraph,
    decls: HashMap<(Class, String), AttributeDecl>,
    class: Option<Class>,
    current_decl: Option<(Class, String)>,
    in_default: bool,
    default_text: String,
    default_directed: bool,
    stack: Vec<Pending>,
    depth: usize,
    seen_root: bool,
}

impl GexfParser {
    fn open(&mut self, e: &BytesStart<'_>) -> IoResult<()> {
        let attrs = xml_attributes(e)?;
        match e.local_name().as_ref() {
            b"gexf" => self.seen_root = true,
            b"graph" => {
                self.default_directed = attrs
                    .get("defaultedgetype")
                    .is_some_and(|t| t.eq_ignore_ascii_case("directed"));
            }
            b"attributes" => {
                self.class = Some(match attrs.get("class").map(String::as_str) {
                    Some("edge") => Class::Edge,
                    _ => Class::Node,
                });
            }
            b"attribute" => {
                if let Some(class) = self.class {
                    let id = attrs
                        .get("id")
                        .cloned()
                        .ok_or_else(|| malformed("<attribute> without id"))?;
                    let title = attrs.get("title").cloned().unwrap_or_else(|| id.clone());
                    let numeric = attrs
                        .get("type")
                        .is_some_and(|t| NUMERIC_TYPES.contains(&t.to_ascii_lowercase().as_str()));
                    self.decls.insert(
                        (class, id.clone()),
                        AttributeDecl {
                            title,
                            numeric,
                            default: None,
                        },
                    );
                    self.current_decl = Some((class, id));
                }
            }
            b"default" => {
                if self.current_decl.is_some() {
                    self.in_default = true;
                    self.default_text.clear();
                }
            }
            b"node" => {
                let id = attrs
                    .get("id")
                    .cloned()
                    .ok_or_else(|| malformed("<node> without id"))?;
                let mut attributes = Attributes::new();
                if let Some(label) = attrs.get("label") {
                    attributes.insert("label".to_string(), AttributeValue::typed(label, false));
                }
                self.stack.push(Pending::Node { id, attributes });
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
                let directed = match attrs.get("type").map(|t| t.to_ascii_lowercase()) {
                    Some(t) => t == "directed",
                    None => self.default_directed,
                };
                let mut attributes = Attributes::new();
                if let Some(label) = attrs.get("label") {
                    attributes.insert("label".to_string(), AttributeValue::typed(label, false));
                }
                if let Some(weight) = attrs.get("weight") {
                    attributes.insert("weight".to_string(), AttributeValue::typed(weight, true));
                }
                self.stack.push(Pending::Edge(RawEdge {
                    id: attrs.get("id").cloned(),
                    source,
                    target,
                    directed,
                    attributes,
                }));
            }
            b"attvalue" => {
                let Some(pending) = self.stack.last_mut() else {
                    return Ok(());
                };
                let key = attrs
                    .get("for")
                    .or_else(|| attrs.get("id"))
                    .ok_or_else(|| malformed("<attvalue> without for"))?;
                let value = attrs.get("value").map(String::as_str).unwrap_or_default();
                let (title, numeric) = match self.decls.get(&(pending.class(), key.clone())) {
                    Some(decl) => (decl.title.clone(), decl.numeric),
                    None => (key.clone(), false),
                };
                pending
                    .attributes_mut()
                    .insert(title, AttributeValue::typed(value, numeric));
            }
            b"position" => {
                if let Some(pending) = self.stack.last_mut() {
                    let bag = pending.attributes_mut();
                    for axis in ["x", "y", "z"] {
                        if let Some(v) = attrs.get(axis).and_then(|v| parse_number(v)) {
                            bag.insert(axis.to_string(), AttributeValue::Number(v));
                        }
                    }
                }
            }
            b"size" | b"thickness" => {
                if let Some(pending) = self.stack.last_mut() {
                    if let Some(v) = attrs.get("value").and_then(|v| parse_number(v)) {
                        pending
                            .attributes_mut()
                            .insert("size".to_string(), AttributeValue::Number(v));
                    }
                }
            }
            b"color" => {
                if let Some(pending) = self.stack.last_mut() {
                    if let Some(color) = viz_color(&attrs) {
                        pending
                            .attributes_mut()
                            .insert("color".to_string(), AttributeValue::Text(color));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> IoResult<()> {
        match name {
            b"attributes" => self.class = None,
            b"attribute" => self.current_decl = None,
            b"default" => {
                if self.in_default {
                    self.in_default = false;
                    if let Some(decl) = self
                        .current_decl
                        .as_ref()
                        .and_then(|key| self.decls.get_mut(key))
                    {
                        decl.default = Some(std::mem::take(&mut self.default_text));
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
        let class = pending.class();
        let bag = pending.attributes_mut();
        for ((decl_class, _), decl) in &self.decls {
            if *decl_class != class {
                continue;
            }
            if let Some(default) = &decl.default {
                bag.entry(decl.title.clone())
                    .or_insert_with(|| AttributeValue::typed(default, decl.numeric));
            }
        }
    }
}

/// Render a `viz:color` element as a CSS color string
fn viz_color(attrs: &HashMap<String, String>) -> Option<String> {
    if let Some(hex) = attrs.get("hex") {
        return Some(hex.clone());
    }
    let channel = |name: &str| -> Option<u8> {
        attrs
            .get(name)
            .and_then(|v| parse_number(v))
            .map(|v| v.clamp(0.0, 255.0).round() as u8)
    };
    let (r, g, b) = (channel("r")?, channel("g")?, channel("b")?);
    match attrs.get("a").and_then(|v| parse_number(v)) {
        Some(a) if a < 1.0 => Some(format!("rgba({r},{g},{b},{a})")),
        _ => Some(format!("#{r:02x}{g:02x}{b:02x}")),
    }
}
