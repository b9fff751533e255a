//! Fallback layout for graphs whose source omits node positions
//!
//! Three passes, all in place on the store:
//! 1. seed every node on a circle, in node order;
//! 2. a force-directed relaxation (edge attraction, pairwise repulsion,
//!    gravity toward the origin) with settings inferred from the graph;
//! 3. an anti-overlap pass that pushes apart nodes whose circles intersect.
//!
//! None of the passes can fail. The relaxation runs for a fixed number of
//! iterations and the anti-overlap pass stops as soon as nothing collides.

use crate::config::LayoutConfig;
use crate::model::{DEGREE_KEY, GraphStore};
use crate::report::Report;

/// Radius of the seed circle
const SEED_RADIUS: f64 = 100.0;

/// Force relaxation settings
#[derive(Debug, Clone, PartialEq)]
pub struct ForceSettings {
    /// Pull toward the origin
    pub gravity: f64,
    /// Use distance-independent gravity
    pub strong_gravity: bool,
    /// Repulsion strength
    pub scaling_ratio: f64,
    /// Damping applied to every displacement
    pub slow_down: f64,
    /// Exponent applied to edge weights
    pub edge_weight_influence: f64,
}

impl ForceSettings {
    /// Settings tuned to the size of `graph`
    pub fn infer(graph: &GraphStore) -> Self {
        let order = graph.order().max(1) as f64;
        Self {
            gravity: 0.05,
            strong_gravity: true,
            scaling_ratio: 10.0,
            slow_down: 1.0 + order.ln(),
            edge_weight_influence: 1.0,
        }
    }
}

/// Anti-overlap settings
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapSettings {
    /// Extra space kept around every node
    pub margin: f64,
    /// Multiplier applied to node sizes
    pub ratio: f64,
}

impl Default for OverlapSettings {
    fn default() -> Self {
        Self {
            margin: 5.0,
            ratio: 1.2,
        }
    }
}

/// Run the fallback layout if any node lacks a position
///
/// Returns whether the layout ran.
pub fn apply_fallback(graph: &mut GraphStore, report: &Report, config: &LayoutConfig) -> bool {
    if !report.needs_layout() {
        return false;
    }
    tracing::info!(
        nodes = graph.order(),
        missing = report.nodes_missing_position,
        "computing fallback layout"
    );
    circular_seed(graph);
    let settings = ForceSettings::infer(graph);
    force_relaxation(graph, &settings, config.iterations);
    let iterations = remove_overlaps(graph, &OverlapSettings::default(), config.overlap_iterations);
    tracing::debug!(iterations, "anti-overlap pass finished");
    true
}

/// Place all nodes evenly on a circle around the origin
pub fn circular_seed(graph: &mut GraphStore) {
    let total = graph.order();
    for (index, node) in graph.nodes_mut().iter_mut().enumerate() {
        let angle = 2.0 * std::f64::consts::PI * (index as f64) / (total as f64);
        node.x = SEED_RADIUS * angle.cos();
        node.y = SEED_RADIUS * angle.sin();
    }
}

/// A node's state during relaxation
#[derive(Debug, Clone, Default)]
struct Body {
    x: f64,
    y: f64,
    dx: f64,
    dy: f64,
    old_dx: f64,
    old_dy: f64,
    mass: f64,
}

/// Run `iterations` steps of force-directed relaxation
pub fn force_relaxation(graph: &mut GraphStore, settings: &ForceSettings, iterations: usize) {
    let mut bodies: Vec<Body> = graph
        .nodes()
        .iter()
        .map(|n| Body {
            x: n.x,
            y: n.y,
            mass: 1.0 + n.computed.get(DEGREE_KEY).copied().unwrap_or(0.0),
            ..Body::default()
        })
        .collect();
    if bodies.is_empty() {
        return;
    }

    let springs: Vec<(usize, usize, f64)> = graph
        .edges()
        .iter()
        .filter_map(|e| {
            let source = graph.node_position(&e.source)?;
            let target = graph.node_position(&e.target)?;
            let weight = e
                .attributes
                .get("weight")
                .and_then(|w| w.as_number())
                .filter(|w| *w > 0.0)
                .unwrap_or(1.0);
            Some((source, target, weight.powf(settings.edge_weight_influence)))
        })
        .collect();

    for _ in 0..iterations {
        for body in &mut bodies {
            body.old_dx = body.dx;
            body.old_dy = body.dy;
            body.dx = 0.0;
            body.dy = 0.0;
        }
        apply_repulsion(&mut bodies, settings.scaling_ratio);
        apply_gravity(&mut bodies, settings);
        apply_attraction(&mut bodies, &springs);
        apply_forces(&mut bodies, settings.slow_down);
    }

    for (node, body) in graph.nodes_mut().iter_mut().zip(&bodies) {
        if body.x.is_finite() && body.y.is_finite() {
            node.x = body.x;
            node.y = body.y;
        }
    }
}

/// Repulsion between all node pairs, proportional to both masses
fn apply_repulsion(bodies: &mut [Body], coefficient: f64) {
    let n = bodies.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let x_dist = bodies[i].x - bodies[j].x;
            let y_dist = bodies[i].y - bodies[j].y;
            let distance_sq = x_dist * x_dist + y_dist * y_dist;
            if distance_sq > 0.0 {
                let factor = coefficient * bodies[i].mass * bodies[j].mass / distance_sq;
                bodies[i].dx += x_dist * factor;
                bodies[i].dy += y_dist * factor;
                bodies[j].dx -= x_dist * factor;
                bodies[j].dy -= y_dist * factor;
            }
        }
    }
}

/// Pull every node toward the origin
fn apply_gravity(bodies: &mut [Body], settings: &ForceSettings) {
    let g = settings.gravity / settings.scaling_ratio;
    for body in bodies {
        let distance = (body.x * body.x + body.y * body.y).sqrt();
        if distance <= 0.0 {
            continue;
        }
        let factor = if settings.strong_gravity {
            settings.scaling_ratio * body.mass * g
        } else {
            settings.scaling_ratio * body.mass * g / distance
        };
        body.dx -= body.x * factor;
        body.dy -= body.y * factor;
    }
}

/// Linear spring along every edge
fn apply_attraction(bodies: &mut [Body], springs: &[(usize, usize, f64)]) {
    for &(source, target, weight) in springs {
        let x_dist = bodies[source].x - bodies[target].x;
        let y_dist = bodies[source].y - bodies[target].y;
        let factor = -weight;
        bodies[source].dx += x_dist * factor;
        bodies[source].dy += y_dist * factor;
        bodies[target].dx -= x_dist * factor;
        bodies[target].dy -= y_dist * factor;
    }
}

/// Move nodes with a per-node speed that shrinks when the force oscillates
fn apply_forces(bodies: &mut [Body], slow_down: f64) {
    for body in bodies {
        let swinging = body.mass
            * ((body.old_dx - body.dx).powi(2) + (body.old_dy - body.dy).powi(2)).sqrt();
        let traction =
            ((body.old_dx + body.dx).powi(2) + (body.old_dy + body.dy).powi(2)).sqrt() / 2.0;
        let speed = (0.1 * (1.0 + traction).ln()) / (1.0 + swinging.sqrt());
        body.x += body.dx * (speed / slow_down);
        body.y += body.dy * (speed / slow_down);
    }
}

/// Push apart overlapping nodes; returns the number of iterations run
pub fn remove_overlaps(graph: &mut GraphStore, settings: &OverlapSettings, max_iterations: usize) -> usize {
    let nodes = graph.nodes_mut();
    let n = nodes.len();

    for iteration in 0..max_iterations {
        let mut shifts = vec![(0.0_f64, 0.0_f64); n];
        let mut collisions = 0usize;

        for i in 0..n {
            for j in (i + 1)..n {
                let x_dist = nodes[j].x - nodes[i].x;
                let y_dist = nodes[j].y - nodes[i].y;
                let distance = (x_dist * x_dist + y_dist * y_dist).sqrt();
                let needed = (nodes[i].size * settings.ratio + settings.margin)
                    + (nodes[j].size * settings.ratio + settings.margin);
                if distance >= needed {
                    continue;
                }
                collisions += 1;
                let (ux, uy) = if distance > 0.0 {
                    (x_dist / distance, y_dist / distance)
                } else {
                    // Coincident nodes: split along a direction derived from the pair
                    let angle = (i * 31 + j * 17) as f64;
                    (angle.cos(), angle.sin())
                };
                let push = (needed - distance) / 2.0;
                shifts[i].0 -= ux * push;
                shifts[i].1 -= uy * push;
                shifts[j].0 += ux * push;
                shifts[j].1 += uy * push;
            }
        }

        if collisions == 0 {
            return iteration;
        }
        for (node, (sx, sy)) in nodes.iter_mut().zip(shifts) {
            node.x += sx;
            node.y += sy;
        }
    }
    max_iterations
}
