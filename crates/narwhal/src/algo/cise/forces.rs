//! One iteration of the constrained force model: accumulate forces, then move free nodes and
//! rotate/translate every circle as a rigid body.

use super::model::GraphManager;
use super::physics::{repulsion_force, spring_force};
use crate::algo::CiseOptions;
use crate::algo::geometry::{decompose_force, norm};

/// Fixed ideal length of edges touching a node inside a circle.
pub(crate) const INNER_EDGE_LENGTH: f64 = 10.0;
/// Step E stretches every other ideal length by this factor.
pub(crate) const FINAL_EDGE_LENGTH_SCALE: f64 = 1.5;
pub(crate) const MAX_NODE_DISPLACEMENT: f64 = 100.0;
/// Inner nodes stay within this fraction of the radius.
const INNER_RADIUS_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ForceParams {
    pub elasticity: f64,
    pub repulsion: f64,
    pub gravity: f64,
    pub gravity_range_factor: f64,
    pub min_repulsion_dist: f64,
    pub separation_buffer: f64,
}

impl ForceParams {
    pub(crate) fn from_options(opts: &CiseOptions) -> Self {
        let ideal = opts.ideal_edge_length();
        Self {
            elasticity: opts.spring_coefficient(),
            repulsion: opts.node_repulsion(),
            gravity: opts.gravity(),
            gravity_range_factor: opts.gravity_range(),
            min_repulsion_dist: (ideal / 10.0).max(0.0005),
            separation_buffer: ideal / 2.0,
        }
    }
}

/// Assigns every edge its ideal length; `scale` stretches all but the inner-node edges.
pub(crate) fn compute_ideal_lengths(gm: &mut GraphManager, opts: &CiseOptions, scale: f64) {
    let ideal = opts.ideal_edge_length();
    let inter = ideal * opts.inter_cluster_coefficient();
    for ei in 0..gm.edges.len() {
        let (a, b) = (gm.edges[ei].source, gm.edges[ei].target);
        let touches_inner =
            gm.nodes[a].inside_circle.is_some() || gm.nodes[b].inside_circle.is_some();
        let clustered = gm.nodes[a].cluster.is_some() || gm.nodes[b].cluster.is_some();
        gm.edges[ei].ideal_length = if touches_inner {
            INNER_EDGE_LENGTH
        } else if clustered && !gm.edges[ei].intra {
            inter * scale
        } else {
            ideal * scale
        };
    }
}

/// Accumulates spring, repulsion and gravitation forces on every simulated node.
pub(crate) fn calc_forces(gm: &mut GraphManager, params: &ForceParams, root_connected: bool) {
    calc_spring_forces(gm, params);
    calc_repulsion_forces(gm, params);
    calc_gravitational_forces(gm, params, root_connected);
}

fn calc_spring_forces(gm: &mut GraphManager, params: &ForceParams) {
    for ei in 0..gm.edges.len() {
        let e = &gm.edges[ei];
        let (a, b) = (e.source, e.target);
        // Circle geometry already holds on-circle siblings together.
        if e.intra && gm.nodes[a].on_circle.is_some() && gm.nodes[b].on_circle.is_some() {
            continue;
        }
        let (fx, fy) = spring_force(
            &gm.nodes[a].frame(),
            &gm.nodes[b].frame(),
            e.ideal_length,
            params.elasticity,
        );
        gm.nodes[a].spring_fx += fx;
        gm.nodes[a].spring_fy += fy;
        gm.nodes[b].spring_fx -= fx;
        gm.nodes[b].spring_fy -= fy;
    }
}

fn calc_repulsion_forces(gm: &mut GraphManager, params: &ForceParams) {
    let free: Vec<usize> = gm.non_on_circle.iter().copied().collect();
    for (i, &a) in free.iter().enumerate() {
        for &b in &free[i + 1..] {
            repel(gm, a, b, params);
        }
    }

    for c in 0..gm.circles.len() {
        let inner = gm.circles[c].inner.clone();
        if inner.is_empty() {
            continue;
        }
        let order = gm.circles[c].order.clone();
        for (i, &a) in inner.iter().enumerate() {
            for &b in order.iter().chain(&inner[i + 1..]) {
                repel(gm, a, b, params);
            }
        }
    }
}

fn repel(gm: &mut GraphManager, a: usize, b: usize, params: &ForceParams) {
    let (fx, fy) = repulsion_force(
        &gm.nodes[a].frame(),
        &gm.nodes[b].frame(),
        params.repulsion,
        params.min_repulsion_dist,
        params.separation_buffer,
    );
    gm.nodes[a].repulsion_fx += fx;
    gm.nodes[a].repulsion_fy += fy;
    gm.nodes[b].repulsion_fx -= fx;
    gm.nodes[b].repulsion_fy -= fy;
}

fn calc_gravitational_forces(gm: &mut GraphManager, params: &ForceParams, root_connected: bool) {
    if !root_connected {
        let free = gm.non_on_circle.clone();
        let n = free.len() as f64;
        let estimated_size = if n > 0.0 {
            let sum: f64 = free
                .iter()
                .map(|&v| (gm.nodes[v].width + gm.nodes[v].height) / 2.0)
                .sum();
            (sum / n.sqrt()).max(1.0)
        } else {
            0.0
        };
        let range = estimated_size * params.gravity_range_factor;
        if let Some((cx, cy)) = gm.bounding_box_center(&free) {
            for &v in &free {
                let node = &mut gm.nodes[v];
                let dx = node.center_x() - cx;
                let dy = node.center_y() - cy;
                if dx.abs() + node.width / 2.0 > range || dy.abs() + node.height / 2.0 > range {
                    node.gravitation_fx = -params.gravity * dx;
                    node.gravitation_fy = -params.gravity * dy;
                }
            }
        }
    }

    for c in 0..gm.circles.len() {
        let (cx, cy) = gm.circle_center(c);
        for i in 0..gm.circles[c].inner.len() {
            let v = gm.circles[c].inner[i];
            let node = &mut gm.nodes[v];
            node.gravitation_fx = -params.gravity * (node.center_x() - cx);
            node.gravitation_fy = -params.gravity * (node.center_y() - cy);
        }
    }
}

/// Applies the accumulated forces and clears them. Returns the total displacement.
///
/// With `prepare_swap`, every on-circle node also accumulates its cooled tangential pull.
pub(crate) fn move_nodes(gm: &mut GraphManager, cooling: f64, prepare_swap: bool) -> f64 {
    let max_d = cooling * MAX_NODE_DISPLACEMENT;
    let mut total = 0.0;

    for i in 0..gm.non_on_circle.len() {
        let v = gm.non_on_circle[i];
        if gm.nodes[v].is_super_node() {
            continue;
        }
        let (fx, fy) = gm.nodes[v].total_force();
        let dx = clamp(cooling * fx, max_d);
        let dy = clamp(cooling * fy, max_d);
        gm.nodes[v].move_by(dx, dy);
        total += dx.abs() + dy.abs();
    }

    for c in 0..gm.circles.len() {
        total += move_circle(gm, c, cooling, max_d, prepare_swap);
    }

    for node in &mut gm.nodes {
        node.reset_forces();
    }
    total
}

fn move_circle(gm: &mut GraphManager, c: usize, cooling: f64, max_d: f64, prepare: bool) -> f64 {
    let center = gm.circle_center(c);
    let parent = gm.circles[c].parent;
    let order = gm.circles[c].order.clone();
    let n = order.len();
    let radius = gm.circles[c].radius;

    let (mut tx, mut ty) = gm.nodes[parent].total_force();
    let mut taus: Vec<f64> = Vec::with_capacity(n);
    for &v in &order {
        let node = &gm.nodes[v];
        let (tau, (rx, ry)) = decompose_force(center, node.center(), node.total_force());
        taus.push(tau);
        tx += rx;
        ty += ry;
    }
    let dx = clamp(cooling * tx, max_d);
    let dy = clamp(cooling * ty, max_d);

    let sum_tau: f64 = taus.iter().sum();
    let mean_tau = if n > 0 { sum_tau / n as f64 } else { 0.0 };
    let arc = clamp(cooling * mean_tau, max_d);
    let d_angle = if radius > 0.0 && n > 1 { arc / radius } else { 0.0 };

    if prepare {
        for (k, &v) in order.iter().enumerate() {
            if let Some(ext) = gm.nodes[v].on_circle.as_mut() {
                ext.displacement_for_swap += cooling * taus[k];
            }
        }
    }

    gm.translate_circle(c, dx, dy);
    gm.rotate_circle(c, d_angle);
    let mut total =
        (n.max(1) as f64) * (dx.abs() + dy.abs()) + n as f64 * (d_angle * radius).abs();

    let (cx, cy) = gm.circle_center(c);
    for i in 0..gm.circles[c].inner.len() {
        let v = gm.circles[c].inner[i];
        let (fx, fy) = gm.nodes[v].total_force();
        let mx = clamp(cooling * fx, max_d);
        let my = clamp(cooling * fy, max_d);
        gm.nodes[v].move_by(mx, my);
        total += mx.abs() + my.abs();
        keep_inside(gm, v, (cx, cy), radius);
    }
    total
}

/// Pulls `v` back inside the circle of `radius` around `center`.
pub(crate) fn keep_inside(gm: &mut GraphManager, v: usize, center: (f64, f64), radius: f64) {
    let limit = (INNER_RADIUS_RATIO * radius - gm.nodes[v].diagonal() / 2.0).max(0.0);
    let (x, y) = gm.nodes[v].center();
    let offset = (x - center.0, y - center.1);
    let dist = norm(offset);
    if dist > limit {
        let scale = if dist > 0.0 { limit / dist } else { 0.0 };
        gm.nodes[v].set_center(center.0 + offset.0 * scale, center.1 + offset.1 * scale);
    }
}

fn clamp(v: f64, max_d: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    v.clamp(-max_d, max_d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::cise::model::tests::{cells, graph};

    fn two_clusters() -> (GraphManager, CiseOptions) {
        let g = graph(
            &["a", "b", "c", "d", "e", "f"],
            &[
                ("a", "b"),
                ("b", "c"),
                ("c", "a"),
                ("d", "e"),
                ("e", "f"),
                ("f", "d"),
                ("a", "d"),
            ],
        );
        let opts =
            CiseOptions::default().with_clusters(cells(&[&["a", "b", "c"], &["d", "e", "f"]]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        gm.spread_on_circle(1, 12.5);
        let p1 = gm.circles[1].parent;
        let (x, y) = gm.nodes[p1].center();
        gm.translate_circle(1, 400.0 - x, -y);
        (gm, opts)
    }

    #[test]
    fn ideal_lengths_follow_edge_kind() {
        let (mut gm, opts) = two_clusters();
        compute_ideal_lengths(&mut gm, &opts, 1.0);
        let inter = gm.edges.iter().find(|e| !e.intra).expect("inter edge");
        assert!((inter.ideal_length - 70.0).abs() < 1e-9);
        let intra = gm.edges.iter().find(|e| e.intra).expect("intra edge");
        assert!((intra.ideal_length - 50.0).abs() < 1e-9);

        compute_ideal_lengths(&mut gm, &opts, FINAL_EDGE_LENGTH_SCALE);
        let inter = gm.edges.iter().find(|e| !e.intra).expect("inter edge");
        assert!((inter.ideal_length - 105.0).abs() < 1e-9);
    }

    #[test]
    fn circles_move_rigidly() {
        let (mut gm, opts) = two_clusters();
        compute_ideal_lengths(&mut gm, &opts, 1.0);
        let params = ForceParams::from_options(&opts);
        let connected = gm.root_is_connected();
        for _ in 0..20 {
            calc_forces(&mut gm, &params, connected);
            move_nodes(&mut gm, 0.3, false);
        }
        for c in 0..2 {
            let (cx, cy) = gm.circle_center(c);
            let r = gm.circles[c].radius;
            for &v in &gm.circles[c].order {
                let (x, y) = gm.nodes[v].center();
                assert!((((x - cx).powi(2) + (y - cy).powi(2)).sqrt() - r).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn stretched_inter_edge_pulls_circles_closer() {
        let (mut gm, opts) = two_clusters();
        compute_ideal_lengths(&mut gm, &opts, 1.0);
        let params = ForceParams::from_options(&opts);
        let before = gm.circle_center(1).0 - gm.circle_center(0).0;
        calc_forces(&mut gm, &params, true);
        move_nodes(&mut gm, 0.3, false);
        let after = gm.circle_center(1).0 - gm.circle_center(0).0;
        assert!(after < before);
    }

    #[test]
    fn displacement_clamp_bounds_each_move() {
        let (mut gm, _) = two_clusters();
        let a = gm.circles[0].order[0];
        gm.nodes[a].spring_fx = 1e9;
        let p0 = gm.circles[0].parent;
        let before = gm.nodes[p0].center();
        move_nodes(&mut gm, 0.3, false);
        let after = gm.nodes[p0].center();
        assert!((after.0 - before.0).abs() <= 0.3 * MAX_NODE_DISPLACEMENT + 1e-9);
        assert!((after.1 - before.1).abs() <= 0.3 * MAX_NODE_DISPLACEMENT + 1e-9);
    }

    #[test]
    fn inner_nodes_are_kept_inside() {
        let (mut gm, _) = two_clusters();
        let v = gm.circles[0].order[1];
        gm.move_inside(0, v);
        gm.nodes[v].set_center(10_000.0, 0.0);
        let center = gm.circle_center(0);
        let r = gm.circles[0].radius;
        keep_inside(&mut gm, v, center, r);
        let (x, y) = gm.nodes[v].center();
        assert!(((x - center.0).powi(2) + (y - center.1).powi(2)).sqrt() <= 0.9 * r + 1e-9);
    }
}
