//! Post-run placement: packing disconnected components side by side, tiling isolated nodes
//! below the drawing, and moving the whole drawing back to where the caller had it.

use rustc_hash::FxHashMap;

use super::cise::model::GraphManager;
use super::cise::physics::Frame;
use super::geometry::connected_components;

/// Running union of rectangles.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }
}

impl Bounds {
    pub(crate) fn include(&mut self, f: &Frame) {
        self.min_x = self.min_x.min(f.left);
        self.min_y = self.min_y.min(f.top);
        self.max_x = self.max_x.max(f.right());
        self.max_y = self.max_y.max(f.bottom());
    }

    pub(crate) fn is_empty(&self) -> bool {
        !(self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite())
    }

    pub(crate) fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub(crate) fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub(crate) fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Bounds of a quotient node: its own rectangle, plus its circle if it is a super-node.
fn quotient_bounds(gm: &GraphManager, v: usize, out: &mut Bounds) {
    out.include(&gm.nodes[v].frame());
    if let Some(c) = gm.nodes[v].child_circle {
        for &u in gm.circles[c].order.iter().chain(&gm.circles[c].inner) {
            out.include(&gm.nodes[u].frame());
        }
    }
}

fn translate_quotient(gm: &mut GraphManager, v: usize, dx: f64, dy: f64) {
    match gm.nodes[v].child_circle {
        Some(c) => gm.translate_circle(c, dx, dy),
        None => gm.nodes[v].move_by(dx, dy),
    }
}

/// Lines the connected components up left to right, `spacing` apart. Returns the number of
/// components.
pub(crate) fn pack_components(gm: &mut GraphManager, spacing: f64) -> usize {
    let members: Vec<usize> = gm.non_on_circle.iter().copied().collect();
    if members.len() < 2 {
        return members.len();
    }
    let local: FxHashMap<usize, usize> =
        members.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    for e in &gm.edges {
        let a = gm.representative(e.source);
        let b = gm.representative(e.target);
        if a == b {
            continue;
        }
        if let (Some(&ia), Some(&ib)) = (local.get(&a), local.get(&b)) {
            adjacency[ia].push(ib);
            adjacency[ib].push(ia);
        }
    }
    let components = connected_components(&adjacency);
    if components.len() < 2 {
        return components.len();
    }

    let mut items: Vec<(Bounds, Vec<usize>)> = components
        .into_iter()
        .map(|comp| {
            let nodes: Vec<usize> = comp.into_iter().map(|i| members[i]).collect();
            let mut b = Bounds::default();
            for &v in &nodes {
                quotient_bounds(gm, v, &mut b);
            }
            (b, nodes)
        })
        .filter(|(b, _)| !b.is_empty())
        .collect();
    items.sort_by(|a, b| a.0.min_x.total_cmp(&b.0.min_x));

    let count = items.len();
    let Some(mut cursor) = items.first().map(|(b, _)| b.min_x) else {
        return 0;
    };
    for (b, nodes) in items {
        let dx = cursor - b.min_x;
        if dx.abs() > 1e-6 {
            for v in nodes {
                translate_quotient(gm, v, dx, 0.0);
            }
        }
        cursor += b.width() + spacing;
    }
    tracing::debug!(components = count, "packed components");
    count
}

/// Places the isolated nodes in rows under the rest of the drawing.
pub(crate) fn tile_isolated(gm: &mut GraphManager, padding_horizontal: f64, padding_vertical: f64) {
    if gm.tiled.is_empty() {
        return;
    }
    let pad_h = padding_horizontal.max(0.0);
    let pad_v = padding_vertical.max(0.0);

    let mut drawn = Bounds::default();
    for &v in &gm.non_on_circle {
        quotient_bounds(gm, v, &mut drawn);
    }
    let (start_x, mut y) = if drawn.is_empty() {
        (0.0, 0.0)
    } else {
        (drawn.min_x, drawn.max_y + pad_v)
    };

    let area: f64 = gm
        .tiled
        .iter()
        .map(|&v| (gm.nodes[v].width + pad_h) * (gm.nodes[v].height + pad_v))
        .sum();
    let row_width = if drawn.is_empty() {
        area.sqrt()
    } else {
        drawn.width().max(area.sqrt())
    };

    let mut x = start_x;
    let mut row_height = 0.0f64;
    let tiled = gm.tiled.clone();
    for v in tiled {
        let (w, h) = (gm.nodes[v].width, gm.nodes[v].height);
        if x > start_x && x + w - start_x > row_width {
            x = start_x;
            y += row_height + pad_v;
            row_height = 0.0;
        }
        gm.nodes[v].left = x;
        gm.nodes[v].top = y;
        x += w + pad_h;
        row_height = row_height.max(h);
    }
}

/// Translates every node so the real nodes' bounding box is centered on `target`.
pub(crate) fn relocate(gm: &mut GraphManager, target: (f64, f64)) {
    let mut b = Bounds::default();
    for v in 0..gm.real_count {
        b.include(&gm.nodes[v].frame());
    }
    if b.is_empty() {
        return;
    }
    let (cx, cy) = b.center();
    let (dx, dy) = (target.0 - cx, target.1 - cy);
    for node in &mut gm.nodes {
        node.move_by(dx, dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::CiseOptions;
    use crate::algo::cise::model::tests::{cells, graph};
    use crate::algo::cise::physics::rects_intersect;

    #[test]
    fn stacked_components_end_up_side_by_side() {
        let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("c", "d")]);
        let mut gm = GraphManager::build(&g, &CiseOptions::default()).expect("build");
        // Both components on top of each other.
        gm.nodes[0].set_center(0.0, 0.0);
        gm.nodes[1].set_center(60.0, 0.0);
        gm.nodes[2].set_center(10.0, 5.0);
        gm.nodes[3].set_center(70.0, 5.0);

        assert_eq!(pack_components(&mut gm, 50.0), 2);
        for a in 0..2 {
            for b in 2..4 {
                assert!(!rects_intersect(&gm.nodes[a].frame(), &gm.nodes[b].frame()));
            }
        }
    }

    #[test]
    fn circles_move_as_one_component() {
        let g = graph(&["a", "b", "c", "x"], &[("a", "b"), ("b", "c")]);
        let opts = CiseOptions::default()
            .with_clusters(cells(&[&["a", "b", "c"]]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        // `x` has no edges and tiling is on: it is not part of packing.
        assert_eq!(pack_components(&mut gm, 50.0), 1);
    }

    #[test]
    fn isolated_nodes_go_below_the_drawing() {
        let g = graph(&["a", "b", "p", "q", "r"], &[("a", "b")]);
        let mut gm = GraphManager::build(&g, &CiseOptions::default()).expect("build");
        gm.nodes[0].set_center(0.0, 0.0);
        gm.nodes[1].set_center(100.0, 0.0);
        tile_isolated(&mut gm, 10.0, 10.0);

        let bottom = gm.nodes[0].top + gm.nodes[0].height;
        for &v in &gm.tiled {
            assert!(gm.nodes[v].top >= bottom);
        }
        for i in 0..gm.tiled.len() {
            for j in (i + 1)..gm.tiled.len() {
                let (a, b) = (gm.tiled[i], gm.tiled[j]);
                assert!(!rects_intersect(&gm.nodes[a].frame(), &gm.nodes[b].frame()));
            }
        }
    }

    #[test]
    fn relocation_centers_the_drawing() {
        let g = graph(&["a", "b"], &[("a", "b")]);
        let mut gm = GraphManager::build(&g, &CiseOptions::default()).expect("build");
        gm.nodes[0].set_center(0.0, 0.0);
        gm.nodes[1].set_center(100.0, 0.0);
        relocate(&mut gm, (500.0, 300.0));
        let (x0, y0) = gm.nodes[0].center();
        let (x1, _) = gm.nodes[1].center();
        assert!(((x0 + x1) / 2.0 - 500.0).abs() < 1e-9);
        assert!((y0 - 300.0).abs() < 1e-9);
    }
}
