use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use netlens::centrality::{PageRankOptions, page_rank};
use netlens::config::EngineConfig;
use netlens::engine::{
    ComputedData, LoadedGraph, RecomputeRequest, SizeSource, VisualSettings, load_graph, recompute,
};
use netlens::filters::Filter;
use netlens::io::FormatRegistry;
use netlens::visual::Dimensions;

/// Field inference, filtering, metrics and visual mapping for GEXF and GraphML graphs.
#[derive(Parser)]
#[command(name = "netlens")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the data-quality diagnostics of a graph
    Report {
        /// Input graph file (.gexf or .graphml)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Print the inferred field catalogue as JSON
    Fields {
        /// Input graph file (.gexf or .graphml)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Compute metrics and visual maps under filters
    Analyze {
        /// Input graph file (.gexf or .graphml)
        #[arg(short, long)]
        input: PathBuf,

        /// Filter: range:<field>:<min>:<max>, terms:<field>:<id>,<id> or search:<field>:<text>
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<Filter>,

        /// Field id used for node colors
        #[arg(long)]
        color: Option<String>,

        /// Field id used for node sizes, or "pagerank"
        #[arg(long, value_parser = parse_size)]
        size: Option<SizeSource>,

        /// Field id used for edge sizes
        #[arg(long)]
        edge_size: Option<String>,

        /// Multiplier applied to every size
        #[arg(long, default_value = "1")]
        size_ratio: f64,

        /// Viewport width in pixels
        #[arg(long, default_value = "1000")]
        width: f64,

        /// Viewport height in pixels
        #[arg(long, default_value = "1000")]
        height: f64,

        /// Write the JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print PageRank scores as JSON
    Pagerank {
        /// Input graph file (.gexf or .graphml)
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Parse a `--filter` argument
fn parse_filter(arg: &str) -> Result<Filter, String> {
    let mut parts = arg.splitn(3, ':');
    let kind = parts.next().unwrap_or_default();
    let field = parts
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| format!("missing field in filter '{arg}'"))?;
    let rest = parts.next().unwrap_or_default();

    match kind {
        "range" => {
            let (min, max) = rest.split_once(':').unwrap_or((rest, ""));
            Ok(Filter::range(field, parse_bound(min)?, parse_bound(max)?))
        }
        "terms" => Ok(Filter::terms(
            field,
            rest.split(',').map(str::trim).filter(|s| !s.is_empty()),
        )),
        "search" => Ok(Filter::search(field, rest)),
        other => Err(format!("unknown filter kind '{other}'")),
    }
}

fn parse_bound(text: &str) -> Result<Option<f64>, String> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    text.trim()
        .parse()
        .map(Some)
        .map_err(|_| format!("invalid range bound '{text}'"))
}

fn parse_size(text: &str) -> Result<SizeSource, String> {
    if text.eq_ignore_ascii_case("pagerank") {
        Ok(SizeSource::PageRank)
    } else {
        Ok(SizeSource::Field(text.to_string()))
    }
}

#[derive(Serialize)]
struct NodePosition<'a> {
    id: &'a str,
    label: &'a str,
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    nodes: Vec<NodePosition<'a>>,
    #[serde(flatten)]
    data: ComputedData,
}

fn load(input: &Path, config: &EngineConfig) -> anyhow::Result<LoadedGraph> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let name = input.to_string_lossy();
    let loaded = load_graph(&FormatRegistry::with_defaults(), &name, &text, config)
        .with_context(|| format!("failed to load {}", input.display()))?;
    Ok(loaded)
}

fn print_json(value: &impl Serialize, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netlens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Report { input } => {
            let loaded = load(&input, &config)?;
            for diagnostic in loaded.report.diagnostics() {
                println!("{diagnostic}");
            }
        }
        Commands::Fields { input } => {
            let loaded = load(&input, &config)?;
            print_json(&loaded.fields, None)?;
        }
        Commands::Analyze {
            input,
            filters,
            color,
            size,
            edge_size,
            size_ratio,
            width,
            height,
            output,
        } => {
            if width <= 0.0 || height <= 0.0 {
                bail!("viewport dimensions must be positive");
            }
            let loaded = load(&input, &config)?;
            let visual = VisualSettings {
                color_field: color,
                size,
                edge_size_field: edge_size,
                size_ratio,
            };
            let request = RecomputeRequest {
                graph: &loaded.graph,
                fields: &loaded.fields,
                filters: &filters,
                dimensions: Dimensions { width, height },
                visual: &visual,
                previous_metrics: None,
            };
            let data = recompute(&request, &config);
            for diagnostic in &data.diagnostics {
                tracing::warn!("{diagnostic}");
            }
            let nodes = loaded
                .graph
                .nodes()
                .iter()
                .map(|n| NodePosition {
                    id: &n.id,
                    label: &n.label,
                    x: n.x,
                    y: n.y,
                })
                .collect();
            print_json(&AnalyzeOutput { nodes, data }, output.as_deref())?;
        }
        Commands::Pagerank { input } => {
            let loaded = load(&input, &config)?;
            let options = PageRankOptions::from(&config.centrality);
            let scores = page_rank(&loaded.graph.directed_adjacency(), &options)?;
            print_json(&scores, None)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_report_subcommand() {
        let cli = Cli::try_parse_from(["netlens", "report", "--input", "g.gexf"]).unwrap();
        match cli.command {
            Commands::Report { input } => assert_eq!(input, PathBuf::from("g.gexf")),
            _ => panic!("Expected Report command"),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_parses_analyze_options() {
        let cli = Cli::try_parse_from([
            "netlens",
            "--config",
            "netlens.yaml",
            "analyze",
            "--input",
            "g.graphml",
            "--filter",
            "range:s:10:",
            "--filter",
            "terms:l:rs,g",
            "--size",
            "pagerank",
            "--width",
            "800",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("netlens.yaml")));
        match cli.command {
            Commands::Analyze {
                filters,
                size,
                width,
                height,
                size_ratio,
                ..
            } => {
                assert_eq!(filters.len(), 2);
                assert_eq!(size, Some(SizeSource::PageRank));
                assert_eq!((width, height, size_ratio), (800.0, 1000.0, 1.0));
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["netlens"]).is_err());
    }

    #[test]
    fn filter_specs_parse() {
        assert_eq!(
            parse_filter("range:s:10:").unwrap(),
            Filter::range("s", Some(10.0), None)
        );
        assert_eq!(
            parse_filter("range:s::2.5").unwrap(),
            Filter::range("s", None, Some(2.5))
        );
        assert_eq!(
            parse_filter("terms:l:rs, g").unwrap(),
            Filter::terms("l", ["rs", "g"])
        );
        assert_eq!(
            parse_filter("search:n:a:b").unwrap(),
            Filter::search("n", "a:b")
        );
    }

    #[test]
    fn bad_filter_specs_are_rejected() {
        assert!(parse_filter("range:s:ten:").is_err());
        assert!(parse_filter("between:s:1:2").is_err());
        assert!(parse_filter("terms").is_err());
    }
}
