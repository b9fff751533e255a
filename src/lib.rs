//! netlens - An analytics engine for attributed multigraphs.
//!
//! This crate reads GEXF and GraphML documents and turns them into what a
//! graph explorer needs: inferred field semantics, per-field distributions
//! under user filters, color and size mappings, PageRank, and a fallback
//! layout when the source has no positions.

pub mod centrality;
pub mod config;
pub mod engine;
pub mod fields;
pub mod filters;
pub mod gexf_reader;
pub mod graphml_reader;
pub mod io;
pub mod layout;
pub mod metrics;
pub mod minimize;
pub mod model;
pub mod report;
pub mod visual;
