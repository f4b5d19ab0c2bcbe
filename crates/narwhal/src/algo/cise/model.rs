use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};

use super::circle::{Circle, OrderMatrix};
use super::physics::Frame;
use crate::algo::geometry::{self, normalize_angle, point_on_circle};
use crate::algo::{CiseOptions, Clustering};
use crate::error::{Error, Result};
use crate::graph::Graph;

/// Extension carried by nodes that sit on a circle.
#[derive(Debug, Clone)]
pub(crate) struct OnCircle {
    pub circle: usize,
    /// Angle relative to the circle center, in `[0, 2π)`.
    pub angle: f64,
    pub index: usize,
    pub intra_edges: Vec<usize>,
    pub inter_edges: Vec<usize>,
    pub can_swap_with_next: bool,
    pub can_swap_with_prev: bool,
    pub displacement_for_swap: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct CiseNode {
    /// Caller id; `None` for cluster super-nodes.
    pub id: Option<String>,
    pub parent: Option<String>,
    pub width: f64,
    pub height: f64,
    // Top-left anchored rectangle.
    pub left: f64,
    pub top: f64,

    pub spring_fx: f64,
    pub spring_fy: f64,
    pub repulsion_fx: f64,
    pub repulsion_fy: f64,
    pub gravitation_fx: f64,
    pub gravitation_fy: f64,

    pub cluster: Option<usize>,
    pub on_circle: Option<OnCircle>,
    /// Circle owned by a super-node.
    pub child_circle: Option<usize>,
    /// Circle whose interior holds this node.
    pub inside_circle: Option<usize>,
}

impl CiseNode {
    fn new(id: Option<String>, width: f64, height: f64, cx: f64, cy: f64) -> Self {
        Self {
            id,
            parent: None,
            width,
            height,
            left: cx - width / 2.0,
            top: cy - height / 2.0,
            spring_fx: 0.0,
            spring_fy: 0.0,
            repulsion_fx: 0.0,
            repulsion_fy: 0.0,
            gravitation_fx: 0.0,
            gravitation_fy: 0.0,
            cluster: None,
            on_circle: None,
            child_circle: None,
            inside_circle: None,
        }
    }

    pub(crate) fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub(crate) fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }

    pub(crate) fn center(&self) -> (f64, f64) {
        (self.center_x(), self.center_y())
    }

    pub(crate) fn set_center(&mut self, x: f64, y: f64) {
        self.left = x - self.width / 2.0;
        self.top = y - self.height / 2.0;
    }

    pub(crate) fn move_by(&mut self, dx: f64, dy: f64) {
        self.left += dx;
        self.top += dy;
    }

    pub(crate) fn diagonal(&self) -> f64 {
        (self.width * self.width + self.height * self.height).sqrt()
    }

    pub(crate) fn frame(&self) -> Frame {
        Frame {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
        }
    }

    pub(crate) fn total_force(&self) -> (f64, f64) {
        (
            self.spring_fx + self.repulsion_fx + self.gravitation_fx,
            self.spring_fy + self.repulsion_fy + self.gravitation_fy,
        )
    }

    pub(crate) fn reset_forces(&mut self) {
        self.spring_fx = 0.0;
        self.spring_fy = 0.0;
        self.repulsion_fx = 0.0;
        self.repulsion_fy = 0.0;
        self.gravitation_fx = 0.0;
        self.gravitation_fy = 0.0;
    }

    pub(crate) fn is_super_node(&self) -> bool {
        self.child_circle.is_some()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CiseEdge {
    pub source: usize,
    pub target: usize,
    /// Both endpoints belong to the same cluster.
    pub intra: bool,
    pub circle: Option<usize>,
    pub ideal_length: f64,
}

impl CiseEdge {
    pub(crate) fn other(&self, v: usize) -> usize {
        if self.source == v {
            self.target
        } else {
            self.source
        }
    }
}

/// Arena holding every node, edge and circle of one layout run.
#[derive(Debug, Clone)]
pub(crate) struct GraphManager {
    pub nodes: Vec<CiseNode>,
    pub edges: Vec<CiseEdge>,
    pub circles: Vec<Circle>,
    /// `(neighbor, edge)` per node.
    pub adjacency: Vec<Vec<(usize, usize)>>,
    /// Real nodes occupy `0..real_count`; super-nodes follow.
    pub real_count: usize,
    pub on_circle: IndexSet<usize>,
    pub in_circle: IndexSet<usize>,
    pub non_on_circle: IndexSet<usize>,
    /// Isolated unclustered nodes kept out of the simulation and tiled at the end.
    pub tiled: Vec<usize>,
    /// Ids of compound parents, which are reported as bounds only.
    pub parents: Vec<String>,
}

impl GraphManager {
    pub(crate) fn build(graph: &Graph, opts: &CiseOptions) -> Result<Self> {
        graph.validate()?;

        let parents: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| n.is_parent)
            .map(|n| n.id.clone())
            .collect();

        let mut nodes: Vec<CiseNode> = Vec::with_capacity(graph.nodes.len());
        let mut id_to_idx: FxHashMap<&str, usize> = FxHashMap::default();
        id_to_idx.reserve(graph.nodes.len());
        for n in graph.nodes.iter().filter(|n| !n.is_parent) {
            let w = n.width.max(1.0);
            let h = n.height.max(1.0);
            let (x, y) = n.position.map(|p| (p.x, p.y)).unwrap_or((0.0, 0.0));
            let mut node = CiseNode::new(Some(n.id.clone()), w, h, x, y);
            node.parent = n.parent.clone();
            id_to_idx.insert(n.id.as_str(), nodes.len());
            nodes.push(node);
        }
        let real_count = nodes.len();

        let clusters = resolve_clusters(graph, &opts.clusters, &id_to_idx)?;
        for (c, members) in clusters.iter().enumerate() {
            for &v in members {
                nodes[v].cluster = Some(c);
            }
        }

        // Edges between simulated nodes, deduplicated, without self loops.
        let mut edges: Vec<CiseEdge> = Vec::new();
        let mut seen: FxHashSet<(usize, usize)> = FxHashSet::default();
        for e in &graph.edges {
            let (Some(&a), Some(&b)) = (
                id_to_idx.get(e.source.as_str()),
                id_to_idx.get(e.target.as_str()),
            ) else {
                continue;
            };
            if a == b || !seen.insert((a.min(b), a.max(b))) {
                continue;
            }
            let intra =
                matches!((nodes[a].cluster, nodes[b].cluster), (Some(x), Some(y)) if x == y);
            edges.push(CiseEdge {
                source: a,
                target: b,
                intra,
                circle: if intra { nodes[a].cluster } else { None },
                ideal_length: opts.ideal_edge_length(),
            });
        }

        let mut gm = Self {
            nodes,
            edges,
            circles: Vec::new(),
            adjacency: vec![Vec::new(); real_count],
            real_count,
            on_circle: IndexSet::new(),
            in_circle: IndexSet::new(),
            non_on_circle: IndexSet::new(),
            tiled: Vec::new(),
            parents,
        };
        for (ei, e) in gm.edges.iter().enumerate() {
            gm.adjacency[e.source].push((e.target, ei));
            gm.adjacency[e.target].push((e.source, ei));
        }

        for (c, members) in clusters.into_iter().enumerate() {
            let parent = gm.nodes.len();
            let mut super_node = CiseNode::new(None, 1.0, 1.0, 0.0, 0.0);
            super_node.cluster = Some(c);
            super_node.child_circle = Some(c);
            gm.nodes.push(super_node);
            gm.adjacency.push(Vec::new());

            for (index, &v) in members.iter().enumerate() {
                gm.nodes[v].on_circle = Some(OnCircle {
                    circle: c,
                    angle: 0.0,
                    index,
                    intra_edges: Vec::new(),
                    inter_edges: Vec::new(),
                    can_swap_with_next: true,
                    can_swap_with_prev: true,
                    displacement_for_swap: 0.0,
                });
                gm.on_circle.insert(v);
            }
            gm.circles.push(Circle::new(parent, members));
            gm.non_on_circle.insert(parent);
        }

        for ei in 0..gm.edges.len() {
            let (a, b, circle) = (gm.edges[ei].source, gm.edges[ei].target, gm.edges[ei].circle);
            match circle {
                Some(c) => gm.circles[c].intra_edges.push(ei),
                None => {
                    for v in [a, b] {
                        if let Some(c) = gm.nodes[v].cluster {
                            gm.circles[c].inter_edges.push(ei);
                        }
                    }
                }
            }
            let intra = gm.edges[ei].intra;
            for v in [a, b] {
                if let Some(ext) = gm.nodes[v].on_circle.as_mut() {
                    if intra {
                        ext.intra_edges.push(ei);
                    } else {
                        ext.inter_edges.push(ei);
                    }
                }
            }
        }

        for v in 0..real_count {
            if gm.nodes[v].cluster.is_some() {
                continue;
            }
            if opts.tile && gm.adjacency[v].is_empty() {
                gm.tiled.push(v);
            } else {
                gm.non_on_circle.insert(v);
            }
        }

        for circle in &mut gm.circles {
            circle.may_be_reversed = circle.inter_edges.len() >= 2;
        }

        Ok(gm)
    }

    /// Real nodes that take part in the simulation.
    pub(crate) fn simulated_real_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        let tiled: FxHashSet<usize> = self.tiled.iter().copied().collect();
        (0..self.real_count).filter(move |v| !tiled.contains(v))
    }

    pub(crate) fn circle_center(&self, c: usize) -> (f64, f64) {
        self.nodes[self.circles[c].parent].center()
    }

    /// Out-nodes carry at least one inter-cluster edge.
    pub(crate) fn is_out_node(&self, v: usize) -> bool {
        self.nodes[v]
            .on_circle
            .as_ref()
            .is_some_and(|ext| !ext.inter_edges.is_empty())
    }

    /// Moves every on-circle member of `c` to `center + radius·(cos θ, sin θ)`.
    pub(crate) fn place_circle_members(&mut self, c: usize) {
        let center = self.circle_center(c);
        let radius = self.circles[c].radius;
        for i in 0..self.circles[c].order.len() {
            let v = self.circles[c].order[i];
            let angle = self.nodes[v].on_circle.as_ref().map_or(0.0, |ext| ext.angle);
            let (x, y) = point_on_circle(center, radius, angle);
            self.nodes[v].set_center(x, y);
        }
    }

    /// Sizes the super-node so its rectangle encloses the circle and its members.
    pub(crate) fn fit_super_node(&mut self, c: usize) {
        let max_diag = self.circles[c]
            .order
            .iter()
            .map(|&v| self.nodes[v].diagonal())
            .fold(0.0f64, f64::max);
        let side = (2.0 * self.circles[c].radius + max_diag).max(1.0);
        let parent = self.circles[c].parent;
        let (cx, cy) = self.nodes[parent].center();
        self.nodes[parent].width = side;
        self.nodes[parent].height = side;
        self.nodes[parent].set_center(cx, cy);
    }

    /// Recomputes the radius from the members' diagonals and lays them out in order, each taking
    /// an arc proportional to its diagonal plus `node_separation`. `order[0]` keeps its angle.
    pub(crate) fn spread_on_circle(&mut self, c: usize, node_separation: f64) {
        let order = self.circles[c].order.clone();
        let n = order.len();
        if n == 0 {
            self.circles[c].radius = 0.0;
            return;
        }
        let spans: Vec<f64> = order
            .iter()
            .map(|&v| self.nodes[v].diagonal() + node_separation)
            .collect();
        let perimeter: f64 = spans.iter().sum();
        let radius = if n == 1 {
            0.0
        } else {
            perimeter / std::f64::consts::TAU
        };
        self.circles[c].radius = radius;

        let start = self.nodes[order[0]]
            .on_circle
            .as_ref()
            .map_or(0.0, |ext| ext.angle);
        let mut angle = start;
        for (i, &v) in order.iter().enumerate() {
            if let Some(ext) = self.nodes[v].on_circle.as_mut() {
                ext.angle = normalize_angle(angle);
                ext.index = i;
            }
            if radius > 0.0 {
                let next_span = spans[(i + 1) % n];
                angle += (spans[i] / 2.0 + next_span / 2.0) / radius;
            }
        }

        self.fit_super_node(c);
        self.place_circle_members(c);
    }

    pub(crate) fn translate_circle(&mut self, c: usize, dx: f64, dy: f64) {
        let parent = self.circles[c].parent;
        self.nodes[parent].move_by(dx, dy);
        for i in 0..self.circles[c].order.len() {
            let v = self.circles[c].order[i];
            self.nodes[v].move_by(dx, dy);
        }
        for i in 0..self.circles[c].inner.len() {
            let v = self.circles[c].inner[i];
            self.nodes[v].move_by(dx, dy);
        }
    }

    pub(crate) fn rotate_circle(&mut self, c: usize, d_angle: f64) {
        if d_angle == 0.0 {
            return;
        }
        for i in 0..self.circles[c].order.len() {
            let v = self.circles[c].order[i];
            if let Some(ext) = self.nodes[v].on_circle.as_mut() {
                ext.angle = normalize_angle(ext.angle + d_angle);
            }
        }
        self.place_circle_members(c);
    }

    /// Exchanges the order slots (index and angle) of `order[i]` and its successor.
    pub(crate) fn swap_with_next(&mut self, c: usize, i: usize) {
        let j = self.circles[c].next_index(i);
        if i == j {
            return;
        }
        let u = self.circles[c].order[i];
        let v = self.circles[c].order[j];
        let (angle_u, index_u) = self.slot(u);
        let (angle_v, index_v) = self.slot(v);
        if let Some(ext) = self.nodes[u].on_circle.as_mut() {
            ext.angle = angle_v;
            ext.index = index_v;
        }
        if let Some(ext) = self.nodes[v].on_circle.as_mut() {
            ext.angle = angle_u;
            ext.index = index_u;
        }
        self.circles[c].order.swap(i, j);
        self.place_circle_members(c);
    }

    fn slot(&self, v: usize) -> (f64, usize) {
        self.nodes[v]
            .on_circle
            .as_ref()
            .map_or((0.0, 0), |ext| (ext.angle, ext.index))
    }

    /// Mirrors the circle across the axis through `order[0]`, flipping its direction while
    /// keeping the occupied slots.
    pub(crate) fn reverse_circle(&mut self, c: usize) {
        let n = self.circles[c].order.len();
        if n < 3 {
            return;
        }
        let first = self.circles[c].order[0];
        let axis = self.slot(first).0;
        let old = self.circles[c].order.clone();
        let mut reversed = Vec::with_capacity(n);
        reversed.push(old[0]);
        reversed.extend(old[1..].iter().rev().copied());
        for (i, &v) in reversed.iter().enumerate() {
            if let Some(ext) = self.nodes[v].on_circle.as_mut() {
                ext.angle = normalize_angle(2.0 * axis - ext.angle);
                ext.index = i;
            }
        }
        self.circles[c].order = reversed;
        self.place_circle_members(c);
    }

    /// Chords between on-circle members of `c`, as order index pairs.
    pub(crate) fn chords(&self, c: usize) -> Vec<(usize, usize)> {
        let circle = &self.circles[c];
        let mut out = Vec::with_capacity(circle.intra_edges.len());
        for &ei in &circle.intra_edges {
            let e = &self.edges[ei];
            let (Some(a), Some(b)) = (
                self.nodes[e.source].on_circle.as_ref(),
                self.nodes[e.target].on_circle.as_ref(),
            ) else {
                continue;
            };
            out.push((a.index, b.index));
        }
        out
    }

    pub(crate) fn crossing_count(&self, c: usize) -> usize {
        geometry::count_chord_crossings(&self.chords(c))
    }

    pub(crate) fn compute_order_matrix(&mut self, c: usize) {
        let m = OrderMatrix::compute(&self.circles[c].order);
        self.circles[c].order_matrix = Some(m);
    }

    /// Takes `v` off its circle and into the circle's interior. Remaining order indices are
    /// compacted so they stay a permutation.
    pub(crate) fn move_inside(&mut self, c: usize, v: usize) {
        let Some(pos) = self.circles[c].order.iter().position(|&u| u == v) else {
            return;
        };
        self.circles[c].order.remove(pos);
        for i in pos..self.circles[c].order.len() {
            let u = self.circles[c].order[i];
            if let Some(ext) = self.nodes[u].on_circle.as_mut() {
                ext.index = i;
            }
        }
        self.circles[c].inner.push(v);
        self.nodes[v].on_circle = None;
        self.nodes[v].inside_circle = Some(c);
        self.on_circle.shift_remove(&v);
        self.in_circle.insert(v);
    }

    /// Center of the bounding box around `members`.
    pub(crate) fn bounding_box_center(&self, members: &IndexSet<usize>) -> Option<(f64, f64)> {
        if members.is_empty() {
            return None;
        }
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for &v in members {
            let n = &self.nodes[v];
            min_x = min_x.min(n.left);
            min_y = min_y.min(n.top);
            max_x = max_x.max(n.left + n.width);
            max_y = max_y.max(n.top + n.height);
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return None;
        }
        Some(((min_x + max_x) / 2.0, (min_y + max_y) / 2.0))
    }

    /// Node the root-level simulation sees for `v`: its super-node if clustered.
    pub(crate) fn representative(&self, v: usize) -> usize {
        match self.nodes[v].cluster {
            Some(c) => self.circles[c].parent,
            None => v,
        }
    }

    /// Whether the quotient graph (super-nodes plus unclustered nodes) is connected.
    pub(crate) fn root_is_connected(&self) -> bool {
        let members: Vec<usize> = self.non_on_circle.iter().copied().collect();
        if members.len() <= 1 {
            return true;
        }
        let local: FxHashMap<usize, usize> =
            members.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
        for e in &self.edges {
            let a = self.representative(e.source);
            let b = self.representative(e.target);
            if a == b {
                continue;
            }
            if let (Some(&ia), Some(&ib)) = (local.get(&a), local.get(&b)) {
                adjacency[ia].push(ib);
                adjacency[ib].push(ia);
            }
        }
        geometry::connected_components(&adjacency).len() <= 1
    }
}

/// Dense cluster index → arena indices of its members.
fn resolve_clusters(
    graph: &Graph,
    clustering: &Clustering,
    id_to_idx: &FxHashMap<&str, usize>,
) -> Result<Vec<Vec<usize>>> {
    match clustering {
        Clustering::None => Ok(Vec::new()),
        Clustering::Partition(cells) => {
            let mut owner: FxHashMap<usize, usize> = FxHashMap::default();
            let mut out: Vec<Vec<usize>> = Vec::new();
            for (cell_idx, cell) in cells.iter().enumerate() {
                let mut members: Vec<usize> = Vec::new();
                for id in cell {
                    let Some(&v) = id_to_idx.get(id.as_str()) else {
                        // Compound parents may be listed; they are never simulated.
                        if graph.node(id).is_some_and(|n| n.is_parent) {
                            continue;
                        }
                        return Err(Error::UnknownClusterMember {
                            cluster: cell_idx,
                            node_id: id.clone(),
                        });
                    };
                    if let Some(&first) = owner.get(&v) {
                        if first == cell_idx {
                            continue;
                        }
                        return Err(Error::OverlappingClusters {
                            node_id: id.clone(),
                            first,
                            second: cell_idx,
                        });
                    }
                    owner.insert(v, cell_idx);
                    members.push(v);
                }
                if !members.is_empty() {
                    out.push(members);
                }
            }
            Ok(out)
        }
        Clustering::Classifier(classify) => {
            let mut by_id: IndexMap<i64, Vec<usize>> = IndexMap::new();
            for n in graph.nodes.iter().filter(|n| !n.is_parent) {
                let Some(&v) = id_to_idx.get(n.id.as_str()) else {
                    continue;
                };
                match classify(n) {
                    Some(cluster) if cluster >= 0 => by_id.entry(cluster).or_default().push(v),
                    _ => {}
                }
            }
            Ok(by_id.into_values().collect())
        }
    }
}
