use nalgebra::{DMatrix, DVector};

use super::SamplingType;
use super::geometry::connected_components;
use super::rng::XorShift64Star;

const INFINITY_HOPS: f64 = 100_000_000.0;
const SMALL: f64 = 1e-9;

const MAX_POWER_ITERATIONS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SpectralParams {
    pub sampling: SamplingType,
    pub sample_size: usize,
    pub node_separation: f64,
    pub ideal_edge_length: f64,
    pub pi_tol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Embedding {
    /// Landmark sampling + power iteration produced the coordinates.
    Spectral,
    /// One or two nodes, placed directly.
    Shortcut,
    /// Numerics degenerated; nodes were placed on a grid.
    Fallback,
}

/// Writes seed centers for `centers.len()` nodes connected by `edges`.
///
/// `sizes` holds `(width, height)` per node. Never fails: degenerate inputs end up on a grid.
pub(crate) fn embed(
    centers: &mut [(f64, f64)],
    sizes: &[(f64, f64)],
    edges: &[(usize, usize)],
    params: &SpectralParams,
    rng: &mut XorShift64Star,
) -> Embedding {
    let n_real = centers.len();
    if n_real == 0 {
        return Embedding::Shortcut;
    }

    let (adjacency, node_size) = build_transformed_adjacency(n_real, edges);
    if node_size <= 1 {
        return Embedding::Shortcut;
    }

    if node_size == 2 {
        // Place the second node to the right of the first, one ideal edge length apart.
        let (x1, y1) = centers[0];
        let w1 = sizes[0].0;
        let w2 = sizes[1].0;
        centers[1] = (x1 + w1 / 2.0 + w2 / 2.0 + params.ideal_edge_length, y1);
        return Embedding::Shortcut;
    }

    let sample_size = node_size.min(params.sample_size.max(2));

    // Column sampling matrix (squared shortest-path distances).
    let mut c = DMatrix::<f64>::zeros(node_size, sample_size);
    let mut samples: Vec<usize> = vec![0; sample_size];

    match params.sampling {
        SamplingType::Greedy => {
            // Pick a random first sample, then repeatedly the node maximizing the minimum
            // distance to the samples chosen so far.
            let mut min_dist: Vec<f64> = vec![INFINITY_HOPS; node_size];
            let mut sample = rng.next_usize(node_size);
            for col in 0..sample_size {
                samples[col] = sample;
                sample = bfs_fill_column(
                    sample,
                    col,
                    &adjacency,
                    params.node_separation,
                    &mut c,
                    Some(&mut min_dist),
                );
            }
        }
        SamplingType::Random => {
            let picked = rng.sample_distinct(node_size, sample_size);
            for (col, &sample) in picked.iter().enumerate() {
                samples[col] = sample;
                bfs_fill_column(
                    sample,
                    col,
                    &adjacency,
                    params.node_separation,
                    &mut c,
                    None,
                );
            }
        }
    }

    c.apply(|v| *v = *v * *v);

    // PHI is the intersection of sampled rows and columns.
    let mut phi = DMatrix::<f64>::zeros(sample_size, sample_size);
    for i in 0..sample_size {
        for j in 0..sample_size {
            phi[(i, j)] = c[(samples[j], i)];
        }
    }

    let Some(inv) = regularized_inverse_from_svd(&phi) else {
        place_on_grid(centers, sizes, params.ideal_edge_length);
        return Embedding::Fallback;
    };

    let Some((x_coords, y_coords)) = power_iteration(rng, &c, &inv, params.pi_tol) else {
        place_on_grid(centers, sizes, params.ideal_edge_length);
        return Embedding::Fallback;
    };

    let all_finite = (0..n_real).all(|i| x_coords[i].is_finite() && y_coords[i].is_finite());
    let spread = (0..n_real).any(|i| {
        (x_coords[i] - x_coords[0]).abs() > SMALL || (y_coords[i] - y_coords[0]).abs() > SMALL
    });
    if !all_finite || !spread {
        place_on_grid(centers, sizes, params.ideal_edge_length);
        return Embedding::Fallback;
    }

    for (i, center) in centers.iter_mut().enumerate() {
        *center = (x_coords[i], y_coords[i]);
    }

    Embedding::Spectral
}

/// Row-major grid with cells one node plus one ideal edge length wide.
pub(crate) fn place_on_grid(centers: &mut [(f64, f64)], sizes: &[(f64, f64)], spacing: f64) {
    let n = centers.len();
    if n == 0 {
        return;
    }
    let cols = (n as f64).sqrt().ceil() as usize;
    let cell = sizes
        .iter()
        .map(|&(w, h)| w.max(h))
        .fold(0.0f64, f64::max)
        + spacing;
    for (i, center) in centers.iter_mut().enumerate() {
        let row = i / cols;
        let col = i % cols;
        *center = (col as f64 * cell, row as f64 * cell);
    }
}

fn build_transformed_adjacency(
    n_real: usize,
    edges: &[(usize, usize)],
) -> (Vec<Vec<usize>>, usize) {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n_real];
    for &(a, b) in edges {
        if a < n_real && b < n_real && a != b {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }
    for neigh in &mut adjacency {
        neigh.sort_unstable();
        neigh.dedup();
    }

    let components = connected_components(&adjacency);
    if components.len() <= 1 {
        return (adjacency, n_real);
    }

    // Link the components through one dummy node attached to the minimum-degree member of each.
    let dummy_idx = adjacency.len();
    adjacency.push(Vec::new());
    for comp in components {
        let mut best = comp[0];
        let mut best_deg = adjacency[best].len();
        for &v in &comp {
            let deg = adjacency[v].len();
            if deg < best_deg || (deg == best_deg && v < best) {
                best = v;
                best_deg = deg;
            }
        }
        adjacency[dummy_idx].push(best);
        adjacency[best].push(dummy_idx);
    }

    for neigh in &mut adjacency {
        neigh.sort_unstable();
        neigh.dedup();
    }

    let node_size = adjacency.len();
    (adjacency, node_size)
}

fn bfs_fill_column(
    pivot: usize,
    col: usize,
    adjacency: &[Vec<usize>],
    node_separation: f64,
    c: &mut DMatrix<f64>,
    mut min_dist: Option<&mut [f64]>,
) -> usize {
    let dist = super::geometry::bfs_distances(adjacency, pivot);

    let mut max_dist = 0.0;
    let mut max_idx = 0usize;
    for (i, hops) in dist.iter().enumerate() {
        let d = match hops {
            Some(h) => (*h as f64) * node_separation,
            None => INFINITY_HOPS,
        };
        c[(i, col)] = d;

        if let Some(min_dist) = min_dist.as_deref_mut() {
            if d < min_dist[i] {
                min_dist[i] = d;
            }
            if min_dist[i] > max_dist {
                max_dist = min_dist[i];
                max_idx = i;
            }
        }
    }

    if min_dist.is_some() { max_idx } else { pivot }
}

fn regularized_inverse_from_svd(phi: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let svd = nalgebra::linalg::SVD::try_new(phi.clone(), true, true, f64::EPSILON, 0)?;
    let u = svd.u?;
    let v_t = svd.v_t?;
    let s = svd.singular_values;
    if s.is_empty() {
        return None;
    }

    let s_max = s.iter().copied().fold(0.0f64, f64::max);
    let max_s = s_max * s_max * s_max;

    let k = s.len();
    let mut sig = DMatrix::<f64>::zeros(k, k);
    for i in 0..k {
        let si = s[i];
        let si2 = si * si;
        let denom = if si2 == 0.0 {
            f64::INFINITY
        } else {
            si2 + (max_s / si2)
        };
        sig[(i, i)] = if denom.is_finite() && denom != 0.0 {
            si / denom
        } else {
            0.0
        };
    }

    let v = v_t.transpose();
    Some(v * sig * u.transpose())
}

fn power_iteration(
    rng: &mut XorShift64Star,
    c: &DMatrix<f64>,
    inv: &DMatrix<f64>,
    pi_tol: f64,
) -> Option<(DVector<f64>, DVector<f64>)> {
    let n = c.nrows();
    if n == 0 {
        return None;
    }

    let mut y1 = DVector::<f64>::from_fn(n, |_, _| rng.next_f64_unit());
    let mut y2 = DVector::<f64>::from_fn(n, |_, _| rng.next_f64_unit());
    normalize_in_place(&mut y1);
    normalize_in_place(&mut y2);

    let (v1, theta1) = eigenvector(c, inv, None, y1, pi_tol);
    let (v2, theta2) = eigenvector(c, inv, Some(&v1), y2, pi_tol);

    let x = v1 * theta1.abs().sqrt();
    let y = v2 * theta2.abs().sqrt();
    Some((x, y))
}

/// Power iteration against `Γ L Γ`; `deflate` removes an already found direction first.
fn eigenvector(
    c: &DMatrix<f64>,
    inv: &DMatrix<f64>,
    deflate: Option<&DVector<f64>>,
    mut y: DVector<f64>,
    pi_tol: f64,
) -> (DVector<f64>, f64) {
    let mut previous = SMALL;
    let mut theta = 0.0;

    for _ in 0..MAX_POWER_ITERATIONS {
        let mut v = y.clone();
        if let Some(v1) = deflate {
            let proj = v1.dot(&v);
            v -= v1 * proj;
        }

        let t = mult_gamma(&v);
        let t = mult_l(&t, c, inv);
        let mut next = mult_gamma(&t);
        theta = v.dot(&next);
        normalize_in_place(&mut next);

        let current = v.dot(&next);
        let denom = if previous.abs() < SMALL {
            SMALL
        } else {
            previous
        };
        let ratio = (current / denom).abs();

        y = next;
        if (1.0..=1.0 + pi_tol).contains(&ratio) {
            break;
        }
        previous = current;
    }

    (y, theta)
}

fn mult_gamma(v: &DVector<f64>) -> DVector<f64> {
    let n = v.len();
    if n == 0 {
        return v.clone();
    }
    let mean = v.iter().sum::<f64>() / (n as f64);
    v.map(|x| x - mean)
}

fn mult_l(v: &DVector<f64>, c: &DMatrix<f64>, inv: &DMatrix<f64>) -> DVector<f64> {
    // Nyström-style multiplication: L = -0.5 * C * INV * C^T.
    let t = c.transpose() * v;
    let t = inv * t;
    let out = c * t;
    out * -0.5
}

fn normalize_in_place(v: &mut DVector<f64>) {
    let norm = v.norm();
    if norm.is_finite() && norm > 0.0 {
        *v /= norm;
    }
}
