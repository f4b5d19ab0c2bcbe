//! Force-directed placement of the quotient graph: one square per cluster plus every unclustered
//! simulated node.

use rustc_hash::{FxHashMap, FxHashSet};

use super::forces::MAX_NODE_DISPLACEMENT;
use super::model::GraphManager;
use super::physics::{Frame, repulsion_force, spring_force};
use super::{CONVERGENCE_CHECK_PERIOD, COOLING_FACTOR_INCREMENTAL, FINAL_TEMPERATURE};
use crate::algo::{CiseOptions, Layout};

const GRID_CALCULATION_CHECK_PERIOD: usize = 10;
const MIN_ITERATIONS: usize = 1000;
/// All-pairs surrounding lists are cheaper than the grid below this size.
const SMALL_GRAPH: usize = 64;

#[derive(Debug, Clone)]
struct PlacerNode {
    /// Arena index in the owning `GraphManager`.
    arena: usize,
    frame: Frame,
    spring_fx: f64,
    spring_fy: f64,
    repulsion_fx: f64,
    repulsion_fy: f64,
    surrounding: Vec<usize>,
}

impl PlacerNode {
    fn move_by(&mut self, dx: f64, dy: f64) {
        self.frame.left += dx;
        self.frame.top += dy;
    }
}

#[derive(Debug, Clone, Copy)]
struct PlacerEdge {
    a: usize,
    b: usize,
    ideal: f64,
}

/// CoSE-style spring embedder over super-nodes and unclustered nodes.
///
/// Each `tick` runs one iteration. [`ClusterPlacer::apply`] writes the centers back, which also
/// moves every circle with its super-node.
#[derive(Debug, Clone)]
pub(crate) struct ClusterPlacer {
    nodes: Vec<PlacerNode>,
    edges: Vec<PlacerEdge>,
    elasticity: f64,
    repulsion: f64,
    gravity: f64,
    gravity_range: f64,
    repulsion_range: f64,
    min_repulsion_dist: f64,
    separation_buffer: f64,
    max_iterations: usize,
    max_cooling_cycle: f64,
    total_displacement_threshold: f64,

    iteration: usize,
    cooling_factor: f64,
    cooling_cycle: f64,
    old_total_displacement: f64,
    last_total_displacement: f64,
    grid: Option<RepulsionGrid>,
    done: bool,
}

impl ClusterPlacer {
    pub(crate) fn new(gm: &GraphManager, opts: &CiseOptions) -> Self {
        let ideal = opts.ideal_edge_length();
        let inter = ideal * opts.inter_cluster_coefficient();

        let mut local: FxHashMap<usize, usize> = FxHashMap::default();
        let mut nodes: Vec<PlacerNode> = Vec::with_capacity(gm.non_on_circle.len());
        for &v in &gm.non_on_circle {
            let n = &gm.nodes[v];
            let (cx, cy) = n.center();
            let (w, h) = match n.child_circle {
                Some(c) => {
                    let max_diag = gm.circles[c]
                        .order
                        .iter()
                        .map(|&u| gm.nodes[u].diagonal())
                        .fold(0.0f64, f64::max);
                    let side = 2.0 * gm.circles[c].radius + max_diag + ideal;
                    (side, side)
                }
                None => (n.width, n.height),
            };
            local.insert(v, nodes.len());
            nodes.push(PlacerNode {
                arena: v,
                frame: Frame::centered(cx, cy, w, h),
                spring_fx: 0.0,
                spring_fy: 0.0,
                repulsion_fx: 0.0,
                repulsion_fy: 0.0,
                surrounding: Vec::new(),
            });
        }

        let mut edges: Vec<PlacerEdge> = Vec::new();
        let mut seen: FxHashSet<(usize, usize)> = FxHashSet::default();
        for e in &gm.edges {
            let ra = gm.representative(e.source);
            let rb = gm.representative(e.target);
            if ra == rb {
                continue;
            }
            let (Some(&a), Some(&b)) = (local.get(&ra), local.get(&rb)) else {
                continue;
            };
            if !seen.insert((a.min(b), a.max(b))) {
                continue;
            }
            let clustered = gm.nodes[ra].is_super_node() || gm.nodes[rb].is_super_node();
            edges.push(PlacerEdge {
                a,
                b,
                ideal: if clustered { inter } else { ideal },
            });
        }

        let n = nodes.len();
        let max_iterations = MIN_ITERATIONS.max(n * 5);
        let estimated_size = {
            let sum: f64 = nodes
                .iter()
                .map(|p| (p.frame.width + p.frame.height) / 2.0)
                .sum();
            if n == 0 {
                0.0
            } else {
                (sum / (n as f64).sqrt()).max(1.0)
            }
        };

        Self {
            nodes,
            edges,
            elasticity: opts.spring_coefficient(),
            repulsion: opts.node_repulsion(),
            gravity: opts.gravity(),
            gravity_range: estimated_size * opts.gravity_range(),
            repulsion_range: (2.0 * ideal).max(1.0),
            min_repulsion_dist: (ideal / 10.0).max(0.0005),
            separation_buffer: ideal / 2.0,
            max_iterations,
            max_cooling_cycle: max_iterations as f64 / CONVERGENCE_CHECK_PERIOD as f64,
            total_displacement_threshold: (3.0 * ideal) / 100.0 * n as f64,
            iteration: 0,
            cooling_factor: COOLING_FACTOR_INCREMENTAL,
            cooling_cycle: 0.0,
            old_total_displacement: 0.0,
            last_total_displacement: 0.0,
            grid: None,
            done: false,
        }
    }

    pub(crate) fn iterations(&self) -> usize {
        self.iteration
    }

    /// Copies the solved centers into `gm`, moving each circle with its super-node.
    pub(crate) fn apply(&self, gm: &mut GraphManager) {
        for p in &self.nodes {
            let (x, y) = (p.frame.center_x(), p.frame.center_y());
            match gm.nodes[p.arena].child_circle {
                Some(c) => {
                    let (cx, cy) = gm.nodes[p.arena].center();
                    gm.translate_circle(c, x - cx, y - cy);
                }
                None => gm.nodes[p.arena].set_center(x, y),
            }
        }
    }

    fn update_cooling(&mut self) -> bool {
        let oscillating = self.iteration > self.max_iterations / 3
            && (self.last_total_displacement - self.old_total_displacement).abs() < 2.0;
        let converged = self.last_total_displacement < self.total_displacement_threshold;
        self.old_total_displacement = self.last_total_displacement;
        if converged || oscillating {
            return true;
        }

        self.cooling_cycle += 1.0;
        let numerator = (100.0 * (COOLING_FACTOR_INCREMENTAL - FINAL_TEMPERATURE)).ln();
        let denominator = self.max_cooling_cycle.ln().max(1e-9);
        let schedule = self.cooling_cycle.powf(numerator / denominator) / 100.0;
        self.cooling_factor = (COOLING_FACTOR_INCREMENTAL - schedule).max(FINAL_TEMPERATURE);
        false
    }

    fn apply_springs(&mut self) {
        for e in &self.edges {
            let (fx, fy) = spring_force(
                &self.nodes[e.a].frame,
                &self.nodes[e.b].frame,
                e.ideal,
                self.elasticity,
            );
            self.nodes[e.a].spring_fx += fx;
            self.nodes[e.a].spring_fy += fy;
            self.nodes[e.b].spring_fx -= fx;
            self.nodes[e.b].spring_fy -= fy;
        }
    }

    fn refresh_surrounding(&mut self) {
        let range = self.repulsion_range;
        if self.nodes.len() <= SMALL_GRAPH {
            for i in 0..self.nodes.len() {
                let mut surrounding = Vec::new();
                for j in (i + 1)..self.nodes.len() {
                    if within_range(&self.nodes[i].frame, &self.nodes[j].frame, range) {
                        surrounding.push(j);
                    }
                }
                self.nodes[i].surrounding = surrounding;
            }
            self.grid = None;
            return;
        }

        let frames: Vec<Frame> = self.nodes.iter().map(|p| p.frame).collect();
        self.grid = RepulsionGrid::build(&frames, range);
        match &self.grid {
            Some(grid) => {
                for i in 0..self.nodes.len() {
                    self.nodes[i].surrounding = grid.surrounding(i, &frames, range);
                }
            }
            None => {
                for p in &mut self.nodes {
                    p.surrounding.clear();
                }
            }
        }
    }

    fn apply_repulsion(&mut self) {
        let len = self.nodes.len();
        for i in 0..len {
            let surrounding = std::mem::take(&mut self.nodes[i].surrounding);
            for &j in surrounding.iter().filter(|&&j| j > i && j < len) {
                let (fx, fy) = repulsion_force(
                    &self.nodes[i].frame,
                    &self.nodes[j].frame,
                    self.repulsion,
                    self.min_repulsion_dist,
                    self.separation_buffer,
                );
                let (left, right) = self.nodes.split_at_mut(j);
                left[i].repulsion_fx += fx;
                left[i].repulsion_fy += fy;
                right[0].repulsion_fx -= fx;
                right[0].repulsion_fy -= fy;
            }
            self.nodes[i].surrounding = surrounding;
        }
    }

    fn apply_gravity(&mut self) {
        if !(self.gravity_range.is_finite() && self.gravity_range > 0.0) {
            return;
        }
        let Some((cx, cy)) = bounding_box_center(&self.nodes) else {
            return;
        };
        for p in &mut self.nodes {
            let dx = p.frame.center_x() - cx;
            let dy = p.frame.center_y() - cy;
            if dx.abs() + p.frame.half_w() > self.gravity_range
                || dy.abs() + p.frame.half_h() > self.gravity_range
            {
                p.spring_fx -= self.gravity * dx;
                p.spring_fy -= self.gravity * dy;
            }
        }
    }

    fn move_nodes(&mut self) -> f64 {
        let max_d = self.cooling_factor * MAX_NODE_DISPLACEMENT;
        let mut total = 0.0;
        for p in &mut self.nodes {
            let dx = (self.cooling_factor * (p.spring_fx + p.repulsion_fx)).clamp(-max_d, max_d);
            let dy = (self.cooling_factor * (p.spring_fy + p.repulsion_fy)).clamp(-max_d, max_d);
            if dx.is_finite() && dy.is_finite() {
                p.move_by(dx, dy);
                total += dx.abs() + dy.abs();
            }
            p.spring_fx = 0.0;
            p.spring_fy = 0.0;
            p.repulsion_fx = 0.0;
            p.repulsion_fy = 0.0;
        }
        total
    }
}

impl Layout for ClusterPlacer {
    fn prerun(&mut self) {
        if self.nodes.len() <= 1 {
            self.done = true;
        }
        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            max_iterations = self.max_iterations,
            "cluster placer start"
        );
    }

    fn tick(&mut self) -> bool {
        if self.done {
            return true;
        }
        self.iteration += 1;
        if self.iteration >= self.max_iterations {
            self.done = true;
            return true;
        }
        if self.iteration.is_multiple_of(CONVERGENCE_CHECK_PERIOD) && self.update_cooling() {
            self.done = true;
            return true;
        }

        self.apply_springs();
        if self.iteration % GRID_CALCULATION_CHECK_PERIOD == 1 {
            self.refresh_surrounding();
        }
        self.apply_repulsion();
        self.apply_gravity();
        self.last_total_displacement = self.move_nodes();
        false
    }
}

fn within_range(a: &Frame, b: &Frame, range: f64) -> bool {
    let dx = (a.center_x() - b.center_x()).abs() - (a.half_w() + b.half_w());
    let dy = (a.center_y() - b.center_y()).abs() - (a.half_h() + b.half_h());
    dx <= range && dy <= range
}

fn bounding_box_center(nodes: &[PlacerNode]) -> Option<(f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in nodes {
        min_x = min_x.min(p.frame.left);
        min_y = min_y.min(p.frame.top);
        max_x = max_x.max(p.frame.right());
        max_y = max_y.max(p.frame.bottom());
    }
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }
    Some(((min_x + max_x) / 2.0, (min_y + max_y) / 2.0))
}

/// FR-grid bucketing of node rectangles into `range`-sized cells.
#[derive(Debug, Clone)]
struct RepulsionGrid {
    left: f64,
    top: f64,
    size_x: i32,
    size_y: i32,
    // cells[x * size_y + y]
    cells: Vec<Vec<usize>>,
}

impl RepulsionGrid {
    fn build(frames: &[Frame], range: f64) -> Option<Self> {
        if frames.is_empty() || !range.is_finite() || range <= 0.0 {
            return None;
        }
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for f in frames {
            min_x = min_x.min(f.left);
            min_y = min_y.min(f.top);
            max_x = max_x.max(f.right());
            max_y = max_y.max(f.bottom());
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }

        let size_x = (((max_x - min_x).max(1.0) / range).floor() as i32 + 1).max(1);
        let size_y = (((max_y - min_y).max(1.0) / range).floor() as i32 + 1).max(1);
        let mut grid = Self {
            left: min_x,
            top: min_y,
            size_x,
            size_y,
            cells: vec![Vec::new(); (size_x as usize) * (size_y as usize)],
        };
        for (idx, f) in frames.iter().enumerate() {
            let (sx, fx, sy, fy) = grid.coords(f, range);
            for gx in sx..=fx {
                for gy in sy..=fy {
                    let cell = grid.index(gx, gy);
                    grid.cells[cell].push(idx);
                }
            }
        }
        Some(grid)
    }

    fn index(&self, x: i32, y: i32) -> usize {
        (x as usize) * (self.size_y as usize) + (y as usize)
    }

    fn coords(&self, f: &Frame, range: f64) -> (i32, i32, i32, i32) {
        let sx = ((f.left - self.left) / range).floor() as i32;
        let fx = ((f.right() - self.left) / range).floor() as i32;
        let sy = ((f.top - self.top) / range).floor() as i32;
        let fy = ((f.bottom() - self.top) / range).floor() as i32;
        (
            sx.clamp(0, self.size_x - 1),
            fx.clamp(0, self.size_x - 1),
            sy.clamp(0, self.size_y - 1),
            fy.clamp(0, self.size_y - 1),
        )
    }

    /// Later-indexed nodes within `range` of node `i`, scanning its cells plus one ring.
    fn surrounding(&self, i: usize, frames: &[Frame], range: f64) -> Vec<usize> {
        let (sx, fx, sy, fy) = self.coords(&frames[i], range);
        let mut seen = vec![false; frames.len()];
        let mut out = Vec::new();
        for gx in (sx - 1).max(0)..=(fx + 1).min(self.size_x - 1) {
            for gy in (sy - 1).max(0)..=(fy + 1).min(self.size_y - 1) {
                for &j in &self.cells[self.index(gx, gy)] {
                    if j <= i || seen[j] {
                        continue;
                    }
                    if within_range(&frames[i], &frames[j], range) {
                        seen[j] = true;
                        out.push(j);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::cise::arrange::arrange_circle;
    use crate::algo::cise::model::tests::{cells, graph};
    use crate::algo::cise::physics::rects_intersect;

    fn placed(gm: &GraphManager, opts: &CiseOptions) -> GraphManager {
        let mut gm = gm.clone();
        for c in 0..gm.circles.len() {
            arrange_circle(&mut gm, c, opts.node_separation());
        }
        let mut placer = ClusterPlacer::new(&gm, opts);
        placer.run();
        placer.apply(&mut gm);
        gm
    }

    #[test]
    fn coincident_clusters_are_separated() {
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
        let gm = GraphManager::build(&g, &opts).expect("build");
        let gm = placed(&gm, &opts);

        let p0 = gm.nodes[gm.circles[0].parent].frame();
        let p1 = gm.nodes[gm.circles[1].parent].frame();
        assert!(!rects_intersect(&p0, &p1));
    }

    #[test]
    fn members_follow_their_super_node() {
        let g = graph(&["a", "b", "c", "x"], &[("a", "b"), ("b", "c"), ("c", "x")]);
        let opts = CiseOptions::default().with_clusters(cells(&[&["a", "b", "c"]]));
        let gm = GraphManager::build(&g, &opts).expect("build");
        let gm = placed(&gm, &opts);

        let (cx, cy) = gm.circle_center(0);
        let r = gm.circles[0].radius;
        for &v in &gm.circles[0].order {
            let (x, y) = gm.nodes[v].center();
            assert!((((x - cx).powi(2) + (y - cy).powi(2)).sqrt() - r).abs() < 1e-6);
        }
    }

    #[test]
    fn single_node_finishes_immediately() {
        let g = graph(&["a", "b"], &[("a", "b")]);
        let opts = CiseOptions::default().with_clusters(cells(&[&["a", "b"]]));
        let gm = GraphManager::build(&g, &opts).expect("build");
        let mut placer = ClusterPlacer::new(&gm, &opts);
        placer.prerun();
        assert!(placer.tick());
        assert_eq!(placer.iterations(), 0);
    }

    #[test]
    fn large_quotient_graphs_use_the_grid() {
        let ids: Vec<String> = (0..80).map(|i| format!("n{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let edges: Vec<(&str, &str)> = refs.windows(2).map(|w| (w[0], w[1])).collect();
        let g = graph(&refs, &edges);
        let opts = CiseOptions::default();
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        // Heavily overlapping start on a short line.
        for v in 0..gm.real_count {
            gm.nodes[v].set_center(v as f64 * 2.0, 0.0);
        }
        let before = gm.nodes[gm.real_count - 1].center_x() - gm.nodes[0].center_x();

        let mut placer = ClusterPlacer::new(&gm, &opts);
        placer.run();
        assert!(placer.grid.is_some());
        assert!(placer.iterations() > 0);
        placer.apply(&mut gm);

        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for v in 0..gm.real_count {
            let (x, y) = gm.nodes[v].center();
            assert!(x.is_finite() && y.is_finite());
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        assert!((max_x - min_x).max(max_y - min_y) > before);
    }

    #[test]
    fn grid_finds_close_neighbors_only() {
        let frames = vec![
            Frame::centered(0.0, 0.0, 10.0, 10.0),
            Frame::centered(30.0, 0.0, 10.0, 10.0),
            Frame::centered(1000.0, 0.0, 10.0, 10.0),
        ];
        let grid = RepulsionGrid::build(&frames, 100.0).expect("grid");
        assert_eq!(grid.surrounding(0, &frames, 100.0), vec![1]);
        assert!(grid.surrounding(1, &frames, 100.0).is_empty());
    }
}
