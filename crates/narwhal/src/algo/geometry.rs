//! Geometry and graph helpers shared by the layout stages.
//!
//! Vectors are plain `(f64, f64)` tuples. Matrix work lives in `spectral` on top of `nalgebra`.

use std::collections::VecDeque;
use std::f64::consts::TAU;

/// Normalizes an angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let a = angle.rem_euclid(TAU);
    // `rem_euclid` can round up to exactly TAU for tiny negative inputs.
    if a >= TAU { 0.0 } else { a }
}

pub fn dot(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.0 + a.1 * b.1
}

pub fn norm(a: (f64, f64)) -> f64 {
    dot(a, a).sqrt()
}

/// Point on a circle of `radius` around `center` at `angle`.
pub fn point_on_circle(center: (f64, f64), radius: f64, angle: f64) -> (f64, f64) {
    (
        center.0 + radius * angle.cos(),
        center.1 + radius * angle.sin(),
    )
}

/// Splits `force` at `pos` (relative to `center`) into its tangential magnitude, measured in the
/// direction of increasing angle, and its radial remainder.
pub fn decompose_force(
    center: (f64, f64),
    pos: (f64, f64),
    force: (f64, f64),
) -> (f64, (f64, f64)) {
    let rx = pos.0 - center.0;
    let ry = pos.1 - center.1;
    let r = norm((rx, ry));
    if r < 1e-9 {
        return (0.0, force);
    }
    let tangent = (-ry / r, rx / r);
    let tau = dot(force, tangent);
    (tau, (force.0 - tau * tangent.0, force.1 - tau * tangent.1))
}

/// Whether chords `(a, b)` and `(c, d)` of a circle cross, given the endpoints' order indices.
///
/// Chords sharing an endpoint never cross.
pub fn chords_cross(a: usize, b: usize, c: usize, d: usize) -> bool {
    if a == c || a == d || b == c || b == d {
        return false;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let c_inside = lo < c && c < hi;
    let d_inside = lo < d && d < hi;
    c_inside != d_inside
}

/// Number of crossing pairs among `chords`, each given as a pair of order indices.
pub fn count_chord_crossings(chords: &[(usize, usize)]) -> usize {
    let mut count = 0;
    for i in 0..chords.len() {
        for j in (i + 1)..chords.len() {
            let (a, b) = chords[i];
            let (c, d) = chords[j];
            if chords_cross(a, b, c, d) {
                count += 1;
            }
        }
    }
    count
}

fn orientation(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
    (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
}

/// Proper intersection of segments `p1p2` and `p3p4` (touching endpoints do not count).
pub fn segments_intersect(
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    p4: (f64, f64),
) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Hop distances from `start`; unreachable nodes are `None`.
pub fn bfs_distances(adjacency: &[Vec<usize>], start: usize) -> Vec<Option<usize>> {
    let mut dist: Vec<Option<usize>> = vec![None; adjacency.len()];
    if start >= adjacency.len() {
        return dist;
    }
    let mut q: VecDeque<usize> = VecDeque::new();
    dist[start] = Some(0);
    q.push_back(start);
    while let Some(v) = q.pop_front() {
        let dv = dist[v].unwrap_or(0);
        for &u in &adjacency[v] {
            if dist[u].is_none() {
                dist[u] = Some(dv + 1);
                q.push_back(u);
            }
        }
    }
    dist
}

/// Connected components, each sorted ascending, in order of their smallest member.
pub fn connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut visited = vec![false; n];
    let mut out: Vec<Vec<usize>> = Vec::new();
    let mut q: VecDeque<usize> = VecDeque::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        q.push_back(start);
        let mut comp: Vec<usize> = Vec::new();

        while let Some(v) = q.pop_front() {
            comp.push(v);
            for &u in &adjacency[v] {
                if !visited[u] {
                    visited[u] = true;
                    q.push_back(u);
                }
            }
        }

        comp.sort_unstable();
        out.push(comp);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn normalize_angle_wraps_both_directions() {
        assert!((normalize_angle(-PI / 2.0) - 1.5 * PI).abs() < 1e-12);
        assert!((normalize_angle(5.0 * PI) - PI).abs() < 1e-12);
        assert_eq!(normalize_angle(f64::NAN), 0.0);
        assert!(normalize_angle(-1e-18) < TAU);
    }

    #[test]
    fn chords_cross_detects_interleaving() {
        assert!(chords_cross(0, 2, 1, 3));
        assert!(!chords_cross(0, 1, 2, 3));
        assert!(!chords_cross(0, 2, 2, 3));
        assert_eq!(count_chord_crossings(&[(0, 2), (1, 3), (0, 1)]), 1);
    }

    #[test]
    fn decompose_force_splits_tangent_and_radial() {
        let (tau, radial) = decompose_force((0.0, 0.0), (10.0, 0.0), (3.0, 4.0));
        assert!((tau - 4.0).abs() < 1e-12);
        assert!((radial.0 - 3.0).abs() < 1e-12);
        assert!(radial.1.abs() < 1e-12);
    }

    #[test]
    fn segments_intersect_ignores_shared_endpoints() {
        assert!(segments_intersect((0.0, 0.0), (2.0, 2.0), (0.0, 2.0), (2.0, 0.0)));
        assert!(!segments_intersect((0.0, 0.0), (1.0, 1.0), (1.0, 1.0), (2.0, 0.0)));
    }

    #[test]
    fn bfs_and_components_on_two_paths() {
        let adjacency = vec![vec![1], vec![0, 2], vec![1], vec![4], vec![3]];
        let d = bfs_distances(&adjacency, 0);
        assert_eq!(d, vec![Some(0), Some(1), Some(2), None, None]);
        assert_eq!(
            connected_components(&adjacency),
            vec![vec![0, 1, 2], vec![3, 4]]
        );
    }
}
