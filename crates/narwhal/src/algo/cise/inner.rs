//! Moves tangled in-nodes into the interior of their circle after step D.

use super::forces::keep_inside;
use super::model::GraphManager;
use crate::algo::geometry::chords_cross;

/// Circles never shrink below this many on-circle members.
const MIN_ON_CIRCLE: usize = 3;

/// Relocates up to `floor(size · max_ratio)` nodes per circle. Returns how many moved.
pub(crate) fn relocate_inner_nodes(
    gm: &mut GraphManager,
    max_ratio: f64,
    node_separation: f64,
) -> usize {
    let mut total = 0;
    for c in 0..gm.circles.len() {
        let budget = (gm.circles[c].len() as f64 * max_ratio).floor() as usize;
        let mut moved = 0;
        while moved < budget && gm.circles[c].len() > MIN_ON_CIRCLE {
            let Some(v) = find_candidate(gm, c) else {
                break;
            };
            let target = interior_target(gm, c, v);
            gm.move_inside(c, v);
            gm.nodes[v].set_center(target.0, target.1);
            tracing::trace!(circle = c, node = v, "moved node inside circle");
            moved += 1;
        }
        if moved > 0 {
            gm.spread_on_circle(c, node_separation);
            let center = gm.circle_center(c);
            let radius = gm.circles[c].radius;
            for i in 0..gm.circles[c].inner.len() {
                let v = gm.circles[c].inner[i];
                keep_inside(gm, v, center, radius);
            }
            total += moved;
        }
    }
    total
}

/// First in-node whose chords cross another chord and whose intra neighbors form one
/// contiguous run once the node is taken off the circle.
fn find_candidate(gm: &GraphManager, c: usize) -> Option<usize> {
    let circle = &gm.circles[c];
    let chords = gm.chords(c);
    circle.order.iter().copied().find(|&v| {
        if gm.is_out_node(v) {
            return false;
        }
        let Some(index) = gm.nodes[v].on_circle.as_ref().map(|e| e.index) else {
            return false;
        };
        let neighbors = on_circle_neighbors(gm, v);
        if neighbors.is_empty() {
            return false;
        }
        let crosses = chords.iter().filter(|&&(a, b)| a == index || b == index).any(|&(a, b)| {
            chords
                .iter()
                .any(|&(x, y)| chords_cross(a, b, x, y))
        });
        crosses && neighbor_runs(&circle.order, v, &neighbors) <= 1
    })
}

fn on_circle_neighbors(gm: &GraphManager, v: usize) -> Vec<usize> {
    let Some(ext) = gm.nodes[v].on_circle.as_ref() else {
        return Vec::new();
    };
    ext.intra_edges
        .iter()
        .map(|&ei| gm.edges[ei].other(v))
        .filter(|&u| gm.nodes[u].on_circle.is_some())
        .collect()
}

/// Number of maximal runs of `neighbors` in the cyclic order without `v`.
fn neighbor_runs(order: &[usize], v: usize, neighbors: &[usize]) -> usize {
    let marks: Vec<bool> = order
        .iter()
        .filter(|&&u| u != v)
        .map(|u| neighbors.contains(u))
        .collect();
    let n = marks.len();
    if n == 0 {
        return 0;
    }
    if marks.iter().all(|&m| m) {
        return 1;
    }
    (0..n).filter(|&i| marks[i] && !marks[(i + n - 1) % n]).count()
}

/// Halfway between the circle center and the centroid of `v`'s neighbors.
fn interior_target(gm: &GraphManager, c: usize, v: usize) -> (f64, f64) {
    let (cx, cy) = gm.circle_center(c);
    let neighbors = on_circle_neighbors(gm, v);
    if neighbors.is_empty() {
        return (cx, cy);
    }
    let k = neighbors.len() as f64;
    let (sx, sy) = neighbors.iter().fold((0.0, 0.0), |(sx, sy), &u| {
        let (x, y) = gm.nodes[u].center();
        (sx + x, sy + y)
    });
    (cx + 0.5 * (sx / k - cx), cy + 0.5 * (sy / k - cy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::CiseOptions;
    use crate::algo::cise::model::tests::{cells, graph};

    #[test]
    fn runs_count_contiguous_neighbors_cyclically() {
        let order = [0, 1, 2, 3, 4, 5];
        assert_eq!(neighbor_runs(&order, 0, &[5, 1]), 1);
        assert_eq!(neighbor_runs(&order, 0, &[2, 4]), 2);
        assert_eq!(neighbor_runs(&order, 3, &[4, 5]), 1);
    }

    #[test]
    fn tangled_hub_moves_inside() {
        // `h` sits between `a` and `b` but is tied to `d` and `e` across the circle, which
        // crosses the chord `c-f`.
        let ids = ["h", "a", "b", "c", "d", "e", "f", "g", "i", "j"];
        let g = graph(
            &ids,
            &[("h", "d"), ("h", "e"), ("c", "f"), ("a", "b")],
        );
        let opts = CiseOptions::default().with_clusters(cells(&[&ids]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        let h = 0;

        let moved = relocate_inner_nodes(&mut gm, 0.1, 12.5);
        assert_eq!(moved, 1);
        assert_eq!(gm.nodes[h].inside_circle, Some(0));
        assert!(gm.in_circle.contains(&h));
        assert_eq!(gm.circles[0].len(), 9);
        for (i, &v) in gm.circles[0].order.iter().enumerate() {
            assert_eq!(gm.nodes[v].on_circle.as_ref().map(|e| e.index), Some(i));
        }
        let (cx, cy) = gm.circle_center(0);
        let (x, y) = gm.nodes[h].center();
        assert!(((x - cx).powi(2) + (y - cy).powi(2)).sqrt() <= 0.9 * gm.circles[0].radius);
    }

    #[test]
    fn zero_ratio_moves_nothing() {
        let ids = ["a", "b", "c", "d"];
        let g = graph(&ids, &[("a", "c"), ("b", "d")]);
        let opts = CiseOptions::default().with_clusters(cells(&[&ids]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        assert_eq!(relocate_inner_nodes(&mut gm, 0.0, 12.5), 0);
        assert_eq!(gm.circles[0].len(), 4);
    }
}
