//! Data-quality report produced during ingestion
//!
//! The report only counts gaps; it never blocks a load. Hosts turn it into
//! a list of [`Diagnostic`] messages ordered by severity.

use std::fmt;

use serde::Serialize;

/// Counts of elements whose rendering fields were defaulted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub nodes_missing_size: usize,
    pub nodes_missing_color: usize,
    pub nodes_missing_label: usize,
    pub nodes_missing_position: usize,
    pub edges_missing_size: usize,
    pub edges_missing_color: usize,
    pub has_edges: bool,
}

/// Severity of a diagnostic message, most severe first when sorted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A human-readable message surfaced to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {singular} has")
    } else {
        format!("{count} {plural} have")
    }
}

impl Report {
    /// Whether the fallback layout has to run
    pub fn needs_layout(&self) -> bool {
        self.nodes_missing_position > 0
    }

    /// Messages for every non-zero gap, errors first
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();

        if self.nodes_missing_position > 0 {
            out.push(Diagnostic::new(
                Severity::Warning,
                format!(
                    "{} no position, computed with a fallback layout",
                    plural(self.nodes_missing_position, "node", "nodes")
                ),
            ));
        }
        if self.nodes_missing_size > 0 {
            out.push(Diagnostic::info(format!(
                "{} no size, a default size is used",
                plural(self.nodes_missing_size, "node", "nodes")
            )));
        }
        if self.nodes_missing_color > 0 {
            out.push(Diagnostic::info(format!(
                "{} no color, a default color is used",
                plural(self.nodes_missing_color, "node", "nodes")
            )));
        }
        if self.nodes_missing_label > 0 {
            out.push(Diagnostic::info(format!(
                "{} no label, the id is shown instead",
                plural(self.nodes_missing_label, "node", "nodes")
            )));
        }
        if self.edges_missing_size > 0 {
            out.push(Diagnostic::info(format!(
                "{} no size, a default size is used",
                plural(self.edges_missing_size, "edge", "edges")
            )));
        }
        if self.edges_missing_color > 0 {
            out.push(Diagnostic::info(format!(
                "{} no color, a default color is used",
                plural(self.edges_missing_color, "edge", "edges")
            )));
        }
        if !self.has_edges {
            out.push(Diagnostic::info("the graph has no edges"));
        }

        out.sort_by_key(|d| d.severity);
        out
    }
}
