//! Visual mapping
//!
//! Pure functions turning field values into node colors and node/edge sizes.
//! Maps are keyed by element id; elements without a value get the fallback
//! color or the smallest size.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::VisualConfig;
use crate::fields::{Field, FieldKind};
use crate::model::{Element, GraphStore};

/// Qualitative palette, most distinguishable colors first
pub mod palette {
    pub const QUALITATIVE: [&str; 20] = [
        "#5fb1ff", "#ff993e", "#cf6bd6", "#6fcb48", "#ff5c76", "#29c0b0", "#c9a100", "#8a7cff",
        "#e4572e", "#00a5e0", "#a4c639", "#d4419e", "#7d5c2e", "#3bb273", "#f18f01", "#5d6ab8",
        "#c44536", "#2e86ab", "#9e7bb5", "#6b8f71",
    ];
}

/// Viewport size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 1000.0,
        }
    }
}

/// Multipliers applied on top of the linear size mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeContext {
    /// User-controlled ratio
    pub ratio: f64,
    /// `min(width, height) / 1000`
    pub screen_ratio: f64,
    /// `1 / log10(order + 2)`
    pub graph_ratio: f64,
}

impl SizeContext {
    pub fn new(ratio: f64, dimensions: Dimensions, order: usize) -> Self {
        Self {
            ratio,
            screen_ratio: dimensions.width.min(dimensions.height) / 1000.0,
            graph_ratio: 1.0 / ((order + 2) as f64).log10(),
        }
    }

    /// All ratios at 1
    pub fn unit() -> Self {
        Self {
            ratio: 1.0,
            screen_ratio: 1.0,
            graph_ratio: 1.0,
        }
    }

    fn factor(&self) -> f64 {
        self.ratio * self.screen_ratio * self.graph_ratio
    }
}

/// Sizes keyed by element id, with the domain they were mapped from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeMap {
    pub sizes: BTreeMap<String, f64>,
    pub min: f64,
    pub max: f64,
}

/// Map `value` from `[min, max]` into `range`, then apply the ratios
///
/// A degenerate domain (`min == max`) is read as `[0, max]`.
pub fn scale_size(value: f64, min: f64, max: f64, range: [f64; 2], context: &SizeContext) -> f64 {
    let min = if min == max { 0.0 } else { min };
    let span = max - min;
    let t = if span == 0.0 {
        0.0
    } else {
        ((value - min) / span).clamp(0.0, 1.0)
    };
    (range[0] + t * (range[1] - range[0])) * context.factor()
}

/// Node colors for `field`, or `None` when no color field is selected
pub fn get_node_colors(
    graph: &GraphStore,
    field: Option<&Field>,
    config: &VisualConfig,
) -> Option<BTreeMap<String, String>> {
    let field = field?;
    let colors = match &field.kind {
        FieldKind::Qualitative { values } => {
            let mut ranked: Vec<_> = values.values().collect();
            ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
            let size = ranked.len().min(config.palette_cap).min(palette::QUALITATIVE.len());
            let by_term: BTreeMap<&str, &str> = ranked
                .iter()
                .zip(palette::QUALITATIVE.iter().take(size))
                .map(|(value, color)| (value.label.as_str(), *color))
                .collect();

            graph
                .nodes()
                .iter()
                .map(|node| {
                    let color = field
                        .terms(node)
                        .first()
                        .and_then(|term| by_term.get(term.as_str()))
                        .map_or_else(|| config.fallback_color.clone(), |c| c.to_string());
                    (node.id.clone(), color)
                })
                .collect()
        }
        FieldKind::Quantitative { min, max } => {
            let stops = parse_hex(&config.gradient[0]).zip(parse_hex(&config.gradient[1]));
            let Some((from, to)) = stops else {
                tracing::warn!(gradient = ?config.gradient, "invalid gradient colors");
                return None;
            };
            graph
                .nodes()
                .iter()
                .map(|node| {
                    let color = field.number(node).map_or_else(
                        || config.fallback_color.clone(),
                        |v| to_hex(interpolate(from, to, gradient_position(v, *min, *max))),
                    );
                    (node.id.clone(), color)
                })
                .collect()
        }
        FieldKind::Content => return None,
    };
    Some(colors)
}

fn gradient_position(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 1.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Node sizes from a quantitative field, or from the raw sizes when `field` is `None`
pub fn get_node_sizes(
    graph: &GraphStore,
    field: Option<&Field>,
    range: [f64; 2],
    context: &SizeContext,
) -> SizeMap {
    size_map(graph.nodes(), field, |n| n.size, range, context)
}

/// Edge sizes from a quantitative field, or from the raw sizes when `field` is `None`
pub fn get_edge_sizes(
    graph: &GraphStore,
    field: Option<&Field>,
    range: [f64; 2],
    context: &SizeContext,
) -> SizeMap {
    size_map(graph.edges(), field, |e| e.size, range, context)
}

fn size_map<E: Element>(
    elements: &[E],
    field: Option<&Field>,
    raw_size: impl Fn(&E) -> f64,
    range: [f64; 2],
    context: &SizeContext,
) -> SizeMap {
    let domain = field.and_then(|f| match f.kind {
        FieldKind::Quantitative { min, max } => Some((f, min, max)),
        _ => None,
    });

    let (min, max, sizes) = match domain {
        Some((field, min, max)) => {
            let sizes = elements
                .iter()
                .map(|e| {
                    let size = field.number(e).map_or(range[0] * context.factor(), |v| {
                        scale_size(v, min, max, range, context)
                    });
                    (e.id().to_string(), size)
                })
                .collect();
            (min, max, sizes)
        }
        None => {
            let (min, max) = extent(elements.iter().map(&raw_size));
            let sizes = elements
                .iter()
                .map(|e| {
                    (
                        e.id().to_string(),
                        scale_size(raw_size(e), min, max, range, context),
                    )
                })
                .collect();
            (min, max, sizes)
        }
    };
    SizeMap { sizes, min, max }
}

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })
        .unwrap_or((0.0, 0.0))
}

/// Parse `#rrggbb` (or `#rgb`) into its channels
pub fn parse_hex(color: &str) -> Option<[u8; 3]> {
    let hex = color.trim().strip_prefix('#')?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ]),
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(out)
        }
        _ => None,
    }
}

fn interpolate(from: [u8; 3], to: [u8; 3], t: f64) -> [u8; 3] {
    let mut out = [0u8; 3];
    for i in 0..3 {
        let a = f64::from(from[i]);
        let b = f64::from(to[i]);
        out[i] = (a + (b - a) * t).round() as u8;
    }
    out
}

fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldsConfig;
    use crate::fields::infer_fields;
    use crate::model::tests::{attrs, num, store, text};

    fn fixture() -> (GraphStore, Vec<Field>) {
        let g = store(
            vec![
                ("a", attrs(&[("stars", num(10.0)), ("lang", text("rust")), ("size", num(1.0))])),
                ("b", attrs(&[("stars", num(20.0)), ("lang", text("go")), ("size", num(3.0))])),
                ("c", attrs(&[("stars", num(30.0)), ("lang", text("rust")), ("size", num(5.0))])),
                ("d", attrs(&[("lang", text("rust"))])),
            ],
            &[("a", "b"), ("b", "c")],
        );
        let fields = infer_fields(&g, &FieldsConfig::default(), &[]).iter().cloned().collect();
        (g, fields)
    }

    fn by_key<'a>(fields: &'a [Field], key: &str) -> &'a Field {
        fields.iter().find(|f| f.key == key).unwrap()
    }

    #[test]
    fn minimum_value_maps_to_minimum_size() {
        let range = [2.0, 15.0];
        assert_eq!(scale_size(10.0, 10.0, 30.0, range, &SizeContext::unit()), 2.0);
        assert_eq!(scale_size(30.0, 10.0, 30.0, range, &SizeContext::unit()), 15.0);
    }

    #[test]
    fn degenerate_domain_starts_at_zero() {
        let range = [0.0, 10.0];
        assert_eq!(scale_size(5.0, 5.0, 5.0, range, &SizeContext::unit()), 10.0);
        assert_eq!(scale_size(0.0, 0.0, 0.0, range, &SizeContext::unit()), 0.0);
    }

    #[test]
    fn ratios_multiply() {
        let context = SizeContext::new(
            2.0,
            Dimensions {
                width: 500.0,
                height: 800.0,
            },
            8,
        );
        assert_eq!(context.screen_ratio, 0.5);
        assert!((context.graph_ratio - 1.0).abs() < 1e-12);
        assert_eq!(scale_size(1.0, 0.0, 1.0, [0.0, 4.0], &context), 4.0);
    }

    #[test]
    fn field_sizes_use_field_extent() {
        let (g, fields) = fixture();
        let stars = by_key(&fields, "stars");
        let map = get_node_sizes(&g, Some(stars), [2.0, 12.0], &SizeContext::unit());

        assert_eq!((map.min, map.max), (10.0, 30.0));
        assert_eq!(map.sizes["a"], 2.0);
        assert_eq!(map.sizes["b"], 7.0);
        assert_eq!(map.sizes["c"], 12.0);
        assert_eq!(map.sizes["d"], 2.0);
    }

    #[test]
    fn raw_sizes_without_field() {
        let (g, _) = fixture();
        let map = get_node_sizes(&g, None, [0.0, 10.0], &SizeContext::unit());
        // d has the default size 1
        assert_eq!((map.min, map.max), (1.0, 5.0));
        assert_eq!(map.sizes["c"], 10.0);
        assert_eq!(map.sizes["d"], 0.0);

        let edges = get_edge_sizes(&g, None, [1.0, 3.0], &SizeContext::unit());
        assert!(edges.sizes.values().all(|s| *s == 3.0));
    }

    #[test]
    fn qualitative_colors_follow_frequency() {
        let (g, fields) = fixture();
        let lang = by_key(&fields, "lang");
        let colors = get_node_colors(&g, Some(lang), &VisualConfig::default()).unwrap();

        assert_eq!(colors["a"], palette::QUALITATIVE[0]);
        assert_eq!(colors["b"], palette::QUALITATIVE[1]);
    }

    #[test]
    fn palette_overflow_falls_back() {
        let (g, fields) = fixture();
        let lang = by_key(&fields, "lang");
        let config = VisualConfig {
            palette_cap: 1,
            ..VisualConfig::default()
        };
        let colors = get_node_colors(&g, Some(lang), &config).unwrap();
        assert_eq!(colors["b"], config.fallback_color);
    }

    #[test]
    fn quantitative_colors_span_gradient() {
        let (g, fields) = fixture();
        let stars = by_key(&fields, "stars");
        let config = VisualConfig::default();
        let colors = get_node_colors(&g, Some(stars), &config).unwrap();

        assert_eq!(colors["a"], config.gradient[0]);
        assert_eq!(colors["c"], config.gradient[1]);
        assert_eq!(colors["d"], config.fallback_color);
    }

    #[test]
    fn no_color_field_means_no_mapping() {
        let (g, _) = fixture();
        assert!(get_node_colors(&g, None, &VisualConfig::default()).is_none());
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("#b0161c"), Some([0xb0, 0x16, 0x1c]));
        assert_eq!(parse_hex("#fff"), Some([255, 255, 255]));
        assert_eq!(parse_hex("red"), None);
        assert_eq!(to_hex(interpolate([0, 0, 0], [255, 255, 255], 0.5)), "#808080");
    }
}
