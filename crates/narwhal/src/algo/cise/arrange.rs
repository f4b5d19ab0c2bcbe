//! Orders the members of one cluster around its circle.
//!
//! The initial order comes from AVSDF (adjacent vertex with smallest degree first), a
//! stack-driven traversal that keeps neighbors next to each other. A bounded refinement pass
//! then moves single nodes to the slot where their chords cross the fewest others.

use rustc_hash::FxHashMap;

use super::model::GraphManager;
use crate::algo::geometry::{chords_cross, count_chord_crossings};

const MAX_REFINE_PASSES: usize = 5;
const LARGE_CIRCLE: usize = 64;
/// Upper bound on `n · deg · m` work per refinement pass.
const REFINE_WORK_BUDGET: usize = 50_000_000;

/// Orders the members of circle `c`, then derives its radius and member angles.
pub(crate) fn arrange_circle(gm: &mut GraphManager, c: usize, node_separation: f64) {
    let members = gm.circles[c].order.clone();
    let local: FxHashMap<usize, usize> =
        members.iter().enumerate().map(|(i, &v)| (v, i)).collect();

    let mut local_edges: Vec<(usize, usize)> = Vec::new();
    for &ei in &gm.circles[c].intra_edges {
        let e = &gm.edges[ei];
        if let (Some(&a), Some(&b)) = (local.get(&e.source), local.get(&e.target)) {
            local_edges.push((a, b));
        }
    }
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    for &(a, b) in &local_edges {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }

    let mut order = avsdf_order(&adjacency);
    let passes = if members.len() > LARGE_CIRCLE {
        1
    } else {
        MAX_REFINE_PASSES
    };
    refine_order(&mut order, &local_edges, passes);
    tracing::trace!(
        circle = c,
        members = members.len(),
        crossings = total_crossings(&order, &local_edges),
        "arranged circle"
    );

    let ordered: Vec<usize> = order.iter().map(|&i| members[i]).collect();
    for (index, &v) in ordered.iter().enumerate() {
        if let Some(ext) = gm.nodes[v].on_circle.as_mut() {
            ext.index = index;
            ext.angle = 0.0;
        }
    }
    gm.circles[c].order = ordered;
    gm.spread_on_circle(c, node_separation);
}

/// AVSDF order over local indices `0..adjacency.len()`.
pub(crate) fn avsdf_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let n = adjacency.len();
    let degree: Vec<usize> = adjacency.iter().map(Vec::len).collect();
    let mut placed = vec![false; n];
    let mut order: Vec<usize> = Vec::with_capacity(n);

    while order.len() < n {
        let Some(start) = (0..n)
            .filter(|&v| !placed[v])
            .min_by_key(|&v| (degree[v], v))
        else {
            break;
        };

        let mut stack: Vec<usize> = vec![start];
        while let Some(v) = stack.pop() {
            if placed[v] {
                continue;
            }
            placed[v] = true;
            order.push(v);

            let mut next: Vec<usize> = adjacency[v]
                .iter()
                .copied()
                .filter(|&u| !placed[u])
                .collect();
            // The stack pops the smallest degree (then smallest index) first.
            next.sort_unstable_by(|&a, &b| degree[b].cmp(&degree[a]).then(b.cmp(&a)));
            next.dedup();
            stack.extend(next);
        }
    }

    order
}

/// Moves single nodes to the slot minimizing their chord crossings until no move helps or
/// `max_passes` is reached.
pub(crate) fn refine_order(order: &mut Vec<usize>, edges: &[(usize, usize)], max_passes: usize) {
    let n = order.len();
    if n < 4 || edges.len() < 2 {
        return;
    }
    let max_degree = {
        let mut deg = vec![0usize; n];
        for &(a, b) in edges {
            deg[a] += 1;
            deg[b] += 1;
        }
        deg.into_iter().max().unwrap_or(0)
    };
    if n.saturating_mul(max_degree).saturating_mul(edges.len()) > REFINE_WORK_BUDGET {
        return;
    }

    for _ in 0..max_passes {
        let mut improved = false;
        for v in 0..n {
            let Some(cur_pos) = order.iter().position(|&u| u == v) else {
                continue;
            };
            let current = crossings_of(order, v, edges);
            if current == 0 {
                continue;
            }

            let mut rest = order.clone();
            rest.remove(cur_pos);
            let mut best: Option<(usize, usize)> = None;
            for slot in 0..n {
                if slot == cur_pos {
                    continue;
                }
                let mut candidate = rest.clone();
                candidate.insert(slot, v);
                let crossings = crossings_of(&candidate, v, edges);
                if crossings < current && best.is_none_or(|(_, b)| crossings < b) {
                    best = Some((slot, crossings));
                }
            }

            if let Some((slot, _)) = best {
                rest.insert(slot, v);
                *order = rest;
                improved = true;
            }
        }
        if !improved {
            break;
        }
    }
}

/// Crossings between chords incident to `v` and every chord not incident to `v`.
fn crossings_of(order: &[usize], v: usize, edges: &[(usize, usize)]) -> usize {
    let mut pos = vec![0usize; order.len()];
    for (i, &u) in order.iter().enumerate() {
        pos[u] = i;
    }
    let mut count = 0;
    for &(a, b) in edges.iter().filter(|&&(a, b)| a == v || b == v) {
        for &(c, d) in edges.iter().filter(|&&(c, d)| c != v && d != v) {
            if chords_cross(pos[a], pos[b], pos[c], pos[d]) {
                count += 1;
            }
        }
    }
    count
}

/// Total chord crossings of `edges` under `order` (local indices).
pub(crate) fn total_crossings(order: &[usize], edges: &[(usize, usize)]) -> usize {
    let mut pos = vec![0usize; order.len()];
    for (i, &u) in order.iter().enumerate() {
        pos[u] = i;
    }
    let chords: Vec<(usize, usize)> = edges.iter().map(|&(a, b)| (pos[a], pos[b])).collect();
    count_chord_crossings(&chords)
}
