//! Neighbor swaps on a circle during step D.
//!
//! Every `SWAP_PERIOD` iterations split into an idle stretch, a preparation stretch that
//! accumulates each node's tangential pull, and one iteration that commits swaps.
//!
//! Positive pulls point towards increasing order index. A pair `(u, next(u))` is a candidate
//! when both pull the same way and the node behind pulls harder in that direction, so the two
//! want to trade places.

use rustc_hash::FxHashSet;

use super::model::GraphManager;

pub(crate) const SWAP_PERIOD: usize = 25;
const SWAP_IDLE: usize = 19;
const SWAP_PREPARATION: usize = 5;
/// Minimum discrepancy for swapping a pair with at least one in-node.
pub(crate) const MIN_DISPLACEMENT_FOR_SWAP: f64 = 1.0;
/// Swap rounds after which the anti-oscillation memory is forgotten.
pub(crate) const SWAP_HISTORY_CLEARANCE_PERIOD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwapPhase {
    Idle,
    /// First iteration of the preparation stretch.
    BeginPreparation,
    Preparation,
    Perform,
}

/// Phase of the 1-based step iteration `iteration`.
pub(crate) fn phase(iteration: usize) -> SwapPhase {
    let k = (iteration.max(1) - 1) % SWAP_PERIOD;
    if k < SWAP_IDLE {
        SwapPhase::Idle
    } else if k == SWAP_IDLE {
        SwapPhase::BeginPreparation
    } else if k < SWAP_IDLE + SWAP_PREPARATION {
        SwapPhase::Preparation
    } else {
        SwapPhase::Perform
    }
}

/// Pairs swapped in the last round that swapped anything.
#[derive(Debug, Clone, Default)]
pub(crate) struct SwapMemory {
    last_round: FxHashSet<(usize, usize)>,
    rounds: usize,
}

impl SwapMemory {
    fn contains(&self, u: usize, v: usize) -> bool {
        self.last_round.contains(&(u.min(v), u.max(v)))
    }

    fn finish_round(&mut self, swapped: FxHashSet<(usize, usize)>) {
        self.rounds += 1;
        if !swapped.is_empty() {
            self.last_round = swapped;
        }
        if self.rounds.is_multiple_of(SWAP_HISTORY_CLEARANCE_PERIOD) {
            self.last_round.clear();
        }
    }
}

/// Refreshes order matrices and the `can_swap_with_*` flags of every on-circle node.
///
/// Swapping `u` with its successor `v` is allowed when, among pairs of inter-cluster edges
/// `u-a` and `v-b` landing on the same other circle, at least as many pairs currently cross as
/// run parallel.
pub(crate) fn compute_swap_eligibility(gm: &mut GraphManager) {
    for c in 0..gm.circles.len() {
        gm.compute_order_matrix(c);
    }
    for c in 0..gm.circles.len() {
        let n = gm.circles[c].len();
        for i in 0..n {
            let u = gm.circles[c].order[i];
            let v = gm.circles[c].order[gm.circles[c].next_index(i)];
            let allowed = n >= 3 && swap_untangles(gm, u, v);
            if let Some(ext) = gm.nodes[u].on_circle.as_mut() {
                ext.can_swap_with_next = allowed;
            }
            if let Some(ext) = gm.nodes[v].on_circle.as_mut() {
                ext.can_swap_with_prev = allowed;
            }
        }
    }
}

fn swap_untangles(gm: &GraphManager, u: usize, v: usize) -> bool {
    let (Some(eu), Some(ev)) = (gm.nodes[u].on_circle.as_ref(), gm.nodes[v].on_circle.as_ref())
    else {
        return false;
    };
    let mut crossing = 0usize;
    let mut parallel = 0usize;
    for &e1 in &eu.inter_edges {
        let a = gm.edges[e1].other(u);
        let Some(da) = gm.nodes[a].on_circle.as_ref().map(|x| x.circle) else {
            continue;
        };
        for &e2 in &ev.inter_edges {
            let b = gm.edges[e2].other(v);
            if a == b {
                continue;
            }
            let Some(db) = gm.nodes[b].on_circle.as_ref().map(|x| x.circle) else {
                continue;
            };
            if da != db {
                continue;
            }
            // Facing circles run in opposite directions: parallel edges have `b` before `a`.
            match gm.circles[da]
                .order_matrix
                .as_ref()
                .and_then(|m| m.precedes(a, b))
            {
                Some(true) => crossing += 1,
                Some(false) => parallel += 1,
                None => {}
            }
        }
    }
    crossing >= parallel
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    u: usize,
    v: usize,
    discrepancy: f64,
    unsafe_pair: bool,
}

/// Commits this round's swaps and resets the accumulated pulls. Returns the number of swaps.
pub(crate) fn perform_swaps(gm: &mut GraphManager, memory: &mut SwapMemory) -> usize {
    let mut swapped: FxHashSet<(usize, usize)> = FxHashSet::default();

    for c in 0..gm.circles.len() {
        if gm.circles[c].len() < 3 {
            continue;
        }
        let mut candidates = collect_candidates(gm, c, memory);
        candidates.sort_by(|a, b| b.discrepancy.total_cmp(&a.discrepancy));

        let mut committed = false;
        for cand in candidates.iter().filter(|cand| cand.unsafe_pair) {
            if try_swap(gm, c, cand) {
                swapped.insert((cand.u.min(cand.v), cand.u.max(cand.v)));
                committed = true;
                break;
            }
        }
        if committed {
            continue;
        }

        let mut touched: FxHashSet<usize> = FxHashSet::default();
        for cand in candidates
            .iter()
            .filter(|cand| !cand.unsafe_pair && cand.discrepancy > MIN_DISPLACEMENT_FOR_SWAP)
        {
            if touched.contains(&cand.u) || touched.contains(&cand.v) {
                continue;
            }
            if try_swap(gm, c, cand) {
                touched.insert(cand.u);
                touched.insert(cand.v);
                swapped.insert((cand.u.min(cand.v), cand.u.max(cand.v)));
            }
        }
    }

    for &v in &gm.on_circle {
        if let Some(ext) = gm.nodes[v].on_circle.as_mut() {
            ext.displacement_for_swap = 0.0;
        }
    }
    let count = swapped.len();
    memory.finish_round(swapped);
    count
}

fn collect_candidates(gm: &GraphManager, c: usize, memory: &SwapMemory) -> Vec<Candidate> {
    let circle = &gm.circles[c];
    let mut out = Vec::new();
    for i in 0..circle.len() {
        let u = circle.order[i];
        let v = circle.order[circle.next_index(i)];
        let (Some(eu), Some(ev)) = (gm.nodes[u].on_circle.as_ref(), gm.nodes[v].on_circle.as_ref())
        else {
            continue;
        };
        let (du, dv) = (eu.displacement_for_swap, ev.displacement_for_swap);
        // Forward: `u` catches up with `v`. Backward: `v` falls back past `u`.
        if du * dv <= 0.0 || du <= dv {
            continue;
        }
        if !(eu.can_swap_with_next && ev.can_swap_with_prev) || memory.contains(u, v) {
            continue;
        }
        out.push(Candidate {
            index: i,
            u,
            v,
            discrepancy: du - dv,
            unsafe_pair: gm.is_out_node(u) && gm.is_out_node(v),
        });
    }
    out
}

/// Swaps the pair if that does not add intra-cluster crossings; rolls back otherwise.
fn try_swap(gm: &mut GraphManager, c: usize, cand: &Candidate) -> bool {
    let circle = &gm.circles[c];
    if circle.order.get(cand.index) != Some(&cand.u)
        || circle.order.get(circle.next_index(cand.index)) != Some(&cand.v)
    {
        return false;
    }
    let before = gm.crossing_count(c);
    gm.swap_with_next(c, cand.index);
    let after = gm.crossing_count(c);
    if after > before {
        gm.swap_with_next(c, cand.index);
        return false;
    }
    tracing::trace!(circle = c, u = cand.u, v = cand.v, before, after, "swapped neighbors");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::CiseOptions;
    use crate::algo::cise::model::tests::{cells, graph};

    fn set_pull(gm: &mut GraphManager, v: usize, d: f64) {
        if let Some(ext) = gm.nodes[v].on_circle.as_mut() {
            ext.displacement_for_swap = d;
        }
    }

    fn ring(edges: &[(&str, &str)]) -> GraphManager {
        let g = graph(&["a", "b", "c", "d", "e"], edges);
        let opts = CiseOptions::default().with_clusters(cells(&[&["a", "b", "c", "d", "e"]]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        gm
    }

    #[test]
    fn phases_follow_the_period() {
        assert_eq!(phase(1), SwapPhase::Idle);
        assert_eq!(phase(19), SwapPhase::Idle);
        assert_eq!(phase(20), SwapPhase::BeginPreparation);
        assert_eq!(phase(24), SwapPhase::Preparation);
        assert_eq!(phase(25), SwapPhase::Perform);
        assert_eq!(phase(26), SwapPhase::Idle);
    }

    #[test]
    fn forward_pulls_swap_when_the_rear_node_pulls_harder() {
        let mut gm = ring(&[]);
        compute_swap_eligibility(&mut gm);
        let (u, v) = (gm.circles[0].order[1], gm.circles[0].order[2]);
        set_pull(&mut gm, u, 6.0);
        set_pull(&mut gm, v, 2.0);

        let mut memory = SwapMemory::default();
        assert_eq!(perform_swaps(&mut gm, &mut memory), 1);
        assert_eq!(gm.circles[0].order[1], v);
        assert_eq!(gm.circles[0].order[2], u);
        assert!(memory.contains(u, v));
    }

    #[test]
    fn backward_pulls_swap_when_the_front_node_pulls_harder() {
        let mut gm = ring(&[]);
        compute_swap_eligibility(&mut gm);
        let (u, v) = (gm.circles[0].order[1], gm.circles[0].order[2]);
        set_pull(&mut gm, u, -2.0);
        set_pull(&mut gm, v, -6.0);
        assert_eq!(perform_swaps(&mut gm, &mut SwapMemory::default()), 1);
        assert_eq!(gm.circles[0].order[1], v);
    }

    #[test]
    fn opposing_or_trailing_pulls_do_not_swap() {
        let mut gm = ring(&[]);
        compute_swap_eligibility(&mut gm);
        let (u, v) = (gm.circles[0].order[1], gm.circles[0].order[2]);
        set_pull(&mut gm, u, 4.0);
        set_pull(&mut gm, v, -4.0);
        assert_eq!(perform_swaps(&mut gm, &mut SwapMemory::default()), 0);

        // Same direction, but the node in front already moves faster.
        set_pull(&mut gm, u, 2.0);
        set_pull(&mut gm, v, 6.0);
        assert_eq!(perform_swaps(&mut gm, &mut SwapMemory::default()), 0);
    }

    #[test]
    fn weak_pulls_do_not_swap() {
        let mut gm = ring(&[]);
        compute_swap_eligibility(&mut gm);
        let (u, v) = (gm.circles[0].order[1], gm.circles[0].order[2]);
        set_pull(&mut gm, u, 0.6);
        set_pull(&mut gm, v, 0.2);
        assert_eq!(perform_swaps(&mut gm, &mut SwapMemory::default()), 0);
    }

    #[test]
    fn swaps_never_add_crossings() {
        // Cycle a-b-c-d-e: any neighbor swap would cross two chords.
        let mut gm = ring(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "e"), ("e", "a")]);
        compute_swap_eligibility(&mut gm);
        let before = gm.crossing_count(0);
        let order = gm.circles[0].order.clone();
        for (k, &v) in order.iter().enumerate() {
            set_pull(&mut gm, v, 50.0 - 10.0 * k as f64);
        }
        perform_swaps(&mut gm, &mut SwapMemory::default());
        assert!(gm.crossing_count(0) <= before);
    }

    #[test]
    fn memory_blocks_the_same_pair_next_round() {
        let mut gm = ring(&[]);
        compute_swap_eligibility(&mut gm);
        let (u, v) = (gm.circles[0].order[1], gm.circles[0].order[2]);
        let mut memory = SwapMemory::default();
        set_pull(&mut gm, u, 6.0);
        set_pull(&mut gm, v, 2.0);
        assert_eq!(perform_swaps(&mut gm, &mut memory), 1);

        // `v` now precedes `u`; pull them back.
        set_pull(&mut gm, v, 6.0);
        set_pull(&mut gm, u, 2.0);
        assert_eq!(perform_swaps(&mut gm, &mut memory), 0);
    }

    #[test]
    fn crossing_inter_edges_allow_a_swap_and_parallel_ones_do_not() {
        // Two facing clusters joined by two inter edges.
        let g = graph(
            &["a", "b", "c", "x", "y", "z"],
            &[("a", "x"), ("b", "y")],
        );
        let opts =
            CiseOptions::default().with_clusters(cells(&[&["a", "b", "c"], &["x", "y", "z"]]));
        let mut gm = GraphManager::build(&g, &opts).expect("build");
        gm.spread_on_circle(0, 12.5);
        gm.spread_on_circle(1, 12.5);
        compute_swap_eligibility(&mut gm);
        // `a` precedes `b` on the first circle and `x` precedes `y` on the second, so the edges
        // cross.
        let a = gm.nodes[0].on_circle.clone().expect("a");
        assert!(a.can_swap_with_next);

        // Reverse the second circle: the edges now run parallel.
        gm.reverse_circle(1);
        compute_swap_eligibility(&mut gm);
        let a = gm.nodes[0].on_circle.clone().expect("a");
        assert!(!a.can_swap_with_next);
    }
}
