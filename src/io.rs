//! Reader trait and format dispatch
//!
//! Graph files are routed to a reader by their extension. A reader turns raw
//! text into a [`RawGraph`]; ingestion then materializes the [`GraphStore`]
//! and its data-quality [`Report`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use quick_xml::events::BytesStart;
use thiserror::Error;

use crate::config::IngestionConfig;
use crate::gexf_reader::GexfReader;
use crate::graphml_reader::GraphmlReader;
use crate::model::{GraphStore, RawGraph};
use crate::report::Report;

/// Errors that can occur while loading a graph
#[derive(Error, Debug)]
pub enum IoError {
    /// No reader is registered for the file extension
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file extension could not be determined
    #[error("could not determine file format from name: {0}")]
    UnknownExtension(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The text is not a valid document of the recognized format
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

/// Result type for reader operations
pub type IoResult<T> = Result<T, IoError>;

pub(crate) fn malformed(err: impl fmt::Display) -> IoError {
    IoError::MalformedInput(err.to_string())
}

/// Unescaped attributes of an XML element, keyed by local name
pub(crate) fn xml_attributes(element: &BytesStart<'_>) -> IoResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

/// A reader parses one serialization into a raw multigraph
///
/// Readers are responsible for:
/// - Creating nodes referenced only by edges
/// - Reading edge directedness per edge
/// - Typing attribute values according to the format's declarations
pub trait GraphReader {
    /// Parse the document text
    fn read(&self, text: &str) -> IoResult<RawGraph>;

    /// File extensions this reader can handle (e.g., ["gexf"])
    fn supported_extensions(&self) -> &[&str];

    /// Check if this reader can handle the given file extension
    fn supports_extension(&self, ext: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// A freshly ingested graph
#[derive(Debug, Clone)]
pub struct Ingested {
    pub graph: GraphStore,
    pub report: Report,
}

/// Registry of available readers
pub struct FormatRegistry {
    readers: Vec<Box<dyn GraphReader>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FormatRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Create a registry with the GEXF and GraphML readers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_reader(Box::new(GexfReader::new()));
        registry.register_reader(Box::new(GraphmlReader::new()));
        registry
    }

    /// Register a reader
    pub fn register_reader(&mut self, reader: Box<dyn GraphReader>) {
        self.readers.push(reader);
    }

    /// Find a reader for the given file extension
    pub fn reader_for_extension(&self, ext: &str) -> Option<&dyn GraphReader> {
        self.readers
            .iter()
            .find(|r| r.supports_extension(ext))
            .map(|r| r.as_ref())
    }

    /// Get the file extension from a file name
    pub fn extension_from_name(file_name: &str) -> Option<&str> {
        Path::new(file_name).extension().and_then(|e| e.to_str())
    }

    /// Find a reader for the given file name based on its extension
    pub fn reader_for_name(&self, file_name: &str) -> IoResult<&dyn GraphReader> {
        let ext = Self::extension_from_name(file_name)
            .ok_or_else(|| IoError::UnknownExtension(file_name.to_string()))?;

        self.reader_for_extension(ext)
            .ok_or_else(|| IoError::UnsupportedFormat(ext.to_string()))
    }

    /// Parse `text` with the reader registered for `file_name` and build the store
    pub fn ingest(
        &self,
        file_name: &str,
        text: &str,
        defaults: &IngestionConfig,
    ) -> IoResult<Ingested> {
        let reader = self.reader_for_name(file_name)?;
        let raw = reader.read(text)?;
        let (graph, report) = GraphStore::materialize(raw, defaults);
        tracing::info!(
            file = file_name,
            nodes = graph.order(),
            edges = graph.edges().len(),
            "ingested graph"
        );
        Ok(Ingested { graph, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attributes;

    struct MockReader {
        extensions: Vec<&'static str>,
    }

    impl GraphReader for MockReader {
        fn read(&self, text: &str) -> IoResult<RawGraph> {
            if text.is_empty() {
                return Err(IoError::MalformedInput("empty document".to_string()));
            }
            let mut raw = RawGraph::new();
            for id in text.split_whitespace() {
                raw.add_node(id, Attributes::new());
            }
            Ok(raw)
        }

        fn supported_extensions(&self) -> &[&str] {
            &self.extensions
        }
    }

    fn mock_registry() -> FormatRegistry {
        let mut registry = FormatRegistry::new();
        registry.register_reader(Box::new(MockReader {
            extensions: vec!["txt"],
        }));
        registry
    }

    #[test]
    fn reader_supports_extension_case_insensitive() {
        let reader = MockReader {
            extensions: vec!["gexf"],
        };
        assert!(reader.supports_extension("gexf"));
        assert!(reader.supports_extension("GEXF"));
        assert!(!reader.supports_extension("graphml"));
    }

    #[test]
    fn registry_rejects_unknown_extension() {
        let registry = mock_registry();
        assert!(matches!(
            registry.ingest("graph.csv", "a b", &IngestionConfig::default()),
            Err(IoError::UnsupportedFormat(ext)) if ext == "csv"
        ));
        assert!(matches!(
            registry.reader_for_name("graph"),
            Err(IoError::UnknownExtension(_))
        ));
    }

    #[test]
    fn ingest_materializes_store_and_report() {
        let registry = mock_registry();
        let ingested = registry
            .ingest("graph.TXT", "a b c", &IngestionConfig::default())
            .unwrap();

        assert_eq!(ingested.graph.order(), 3);
        assert_eq!(ingested.report.nodes_missing_position, 3);
        assert!(!ingested.report.has_edges);
    }

    #[test]
    fn reader_errors_propagate() {
        let registry = mock_registry();
        assert!(matches!(
            registry.ingest("graph.txt", "", &IngestionConfig::default()),
            Err(IoError::MalformedInput(_))
        ));
    }

    #[test]
    fn with_defaults_registers_both_formats() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.reader_for_extension("gexf").is_some());
        assert!(registry.reader_for_extension("graphml").is_some());
        assert!(registry.reader_for_extension("json").is_none());
    }

    #[test]
    fn io_error_display() {
        let err = IoError::UnsupportedFormat("xyz".to_string());
        assert_eq!(err.to_string(), "unsupported format: xyz");

        let err = IoError::MalformedInput("unexpected end".to_string());
        assert_eq!(err.to_string(), "malformed input: unexpected end");
    }
}
