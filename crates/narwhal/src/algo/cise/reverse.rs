//! Whole-circle reversal during step B.
//!
//! A circle is read as a letter sequence, one letter per member repeated once per inter-cluster
//! edge. The order in which the far endpoints of those edges appear around the circle is read
//! the same way. If aligning the reversed member sequence against the neighbor sequence scores
//! strictly higher than the forward one, the circle is mirrored.

use std::cmp::Ordering;

use super::model::GraphManager;
use crate::algo::align::{ALPHABET, letter, needleman_wunsch};
use crate::algo::geometry::normalize_angle;

pub(crate) const REVERSE_PERIOD: usize = 50;

/// Whether circle `c` may be tested for reversal at all.
pub(crate) fn is_candidate(gm: &GraphManager, c: usize) -> bool {
    let circle = &gm.circles[c];
    circle.may_be_reversed
        && circle.len() >= 3
        && circle.len() <= ALPHABET.len()
        && circle.inter_edges.len() >= 2
}

/// Alignment scores `(forward, reversed)` of circle `c` against its neighbors' order.
pub(crate) fn alignment_scores(gm: &GraphManager, c: usize) -> Option<(i64, i64)> {
    let circle = &gm.circles[c];
    let n = circle.len();
    if n == 0 || n > ALPHABET.len() {
        return None;
    }
    let center = gm.circle_center(c);
    let first = circle.order[0];
    let base = gm.nodes[first].on_circle.as_ref()?.angle;

    let mut own: Vec<u8> = Vec::new();
    let mut neighbors: Vec<(f64, usize, u8)> = Vec::new();
    for (i, &u) in circle.order.iter().enumerate() {
        let l = letter(i)?;
        let ext = gm.nodes[u].on_circle.as_ref()?;
        for &ei in &ext.inter_edges {
            own.push(l);
            let (x, y) = gm.nodes[gm.edges[ei].other(u)].center();
            let angle = normalize_angle((y - center.1).atan2(x - center.0) - base);
            neighbors.push((angle, ei, l));
        }
    }
    // Ties break on the edge, which does not depend on the labelling.
    neighbors.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    let neighbor_seq: Vec<u8> = neighbors.iter().map(|&(_, _, l)| l).collect();

    let mut reversed: Vec<u8> = Vec::with_capacity(own.len());
    for k in std::iter::once(0).chain((1..n).rev()) {
        let u = circle.order[k];
        let l = letter(k)?;
        let count = gm.nodes[u].on_circle.as_ref()?.inter_edges.len();
        reversed.extend(std::iter::repeat_n(l, count));
    }

    Some((
        needleman_wunsch(&own, &neighbor_seq),
        needleman_wunsch(&reversed, &neighbor_seq),
    ))
}

/// Reverses circle `c` when the mirrored order aligns strictly better with its neighbors.
/// A reversed circle is never reversed again.
pub(crate) fn try_reverse(gm: &mut GraphManager, c: usize) -> bool {
    if !is_candidate(gm, c) {
        return false;
    }
    let Some((forward, reversed)) = alignment_scores(gm, c) else {
        return false;
    };
    if reversed <= forward {
        return false;
    }
    gm.reverse_circle(c);
    gm.circles[c].may_be_reversed = false;
    tracing::trace!(circle = c, forward, reversed, "reversed circle");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::CiseOptions;
    use crate::algo::cise::model::tests::{cells, graph};

    /// Cluster `a..d` next to four unclustered nodes placed so that following them around the
    /// circle visits the members backwards.
    fn mirrored() -> GraphManager {
        let g = graph(
            &["a", "b", "c", "d", "p", "q", "r", "s"],
            &[("a", "p"), ("b", "q"), ("c", "r"), ("d", "s")],
        );
        let opts = CiseOptions::default().with_clusters(cells(&[&["a", "b", "c", "d"]]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        let center = gm.circle_center(0);
        // Members sit at angles 0, π/2, π, 3π/2; neighbors go the other way round.
        for (k, id) in [4usize, 5, 6, 7].iter().enumerate() {
            let angle = -(k as f64) * std::f64::consts::FRAC_PI_2 + 0.1;
            gm.nodes[*id].set_center(
                center.0 + 200.0 * angle.cos(),
                center.1 + 200.0 * angle.sin(),
            );
        }
        gm
    }

    #[test]
    fn mirrored_neighbors_trigger_a_reversal() {
        let mut gm = mirrored();
        assert!(is_candidate(&gm, 0));
        let (forward, reversed) = alignment_scores(&gm, 0).expect("scores");
        assert!(reversed > forward);

        assert!(try_reverse(&mut gm, 0));
        let (after, _) = alignment_scores(&gm, 0).expect("scores");
        assert_eq!(after, reversed);
        assert!(!gm.circles[0].may_be_reversed);
        assert!(!try_reverse(&mut gm, 0));
    }

    #[test]
    fn aligned_neighbors_keep_the_order() {
        let mut gm = mirrored();
        gm.reverse_circle(0);
        let before = gm.circles[0].order.clone();
        let (forward, reversed) = alignment_scores(&gm, 0).expect("scores");
        assert!(forward >= reversed);
        assert!(!try_reverse(&mut gm, 0));
        assert_eq!(gm.circles[0].order, before);
    }

    #[test]
    fn circles_with_one_inter_edge_are_not_candidates() {
        let g = graph(&["a", "b", "c", "x"], &[("a", "x")]);
        let opts = CiseOptions::default().with_clusters(cells(&[&["a", "b", "c"]]));
        let gm = GraphManager::build(&g, &opts).expect("build");
        assert!(!is_candidate(&gm, 0));
    }
}
