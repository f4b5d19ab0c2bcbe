use narwhal::algo::geometry::segments_intersect;
use narwhal::{CiseOptions, Edge, Graph, LayoutResult, Node};

fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Graph {
    let mut g = Graph::default();
    for id in nodes {
        g.nodes.push(Node::new(*id, 20.0, 20.0));
    }
    for (i, (s, t)) in edges.iter().enumerate() {
        g.edges.push(Edge::new(format!("e{i}"), *s, *t));
    }
    g
}

fn cells(cells: &[&[&str]]) -> Vec<Vec<String>> {
    cells
        .iter()
        .map(|cell| cell.iter().map(|s| s.to_string()).collect())
        .collect()
}

fn at(result: &LayoutResult, id: &str) -> (f64, f64) {
    let p = result.positions[id];
    (p.x, p.y)
}

fn boxes_overlap(a: (f64, f64), b: (f64, f64), side: f64) -> bool {
    (a.0 - b.0).abs() < side && (a.1 - b.1).abs() < side
}

/// Circumcenter of three points.
fn circumcenter(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> (f64, f64) {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    let sq = |p: (f64, f64)| p.0 * p.0 + p.1 * p.1;
    let ux = (sq(a) * (b.1 - c.1) + sq(b) * (c.1 - a.1) + sq(c) * (a.1 - b.1)) / d;
    let uy = (sq(a) * (c.0 - b.0) + sq(b) * (a.0 - c.0) + sq(c) * (b.0 - a.0)) / d;
    (ux, uy)
}

fn assert_on_one_circle(result: &LayoutResult, members: &[&str]) {
    let pts: Vec<(f64, f64)> = members.iter().map(|id| at(result, id)).collect();
    let center = circumcenter(pts[0], pts[1], pts[2]);
    let radius = ((pts[0].0 - center.0).powi(2) + (pts[0].1 - center.1).powi(2)).sqrt();
    assert!(radius.is_finite() && radius > 0.0);
    for (id, p) in members.iter().zip(&pts) {
        let r = ((p.0 - center.0).powi(2) + (p.1 - center.1).powi(2)).sqrt();
        assert!((r - radius).abs() <= 1e-6 * radius.max(1.0), "{id}: {r} vs {radius}");
    }
}

#[test]
fn members_of_a_cluster_share_a_circle() {
    let members = ["a", "b", "c", "d", "e", "f"];
    let g = graph(
        &["a", "b", "c", "d", "e", "f", "x", "y"],
        &[
            ("a", "b"),
            ("b", "c"),
            ("c", "d"),
            ("d", "e"),
            ("e", "f"),
            ("f", "a"),
            ("a", "x"),
            ("d", "y"),
            ("x", "y"),
        ],
    );
    let opts = CiseOptions::default().with_clusters(cells(&[&members]));
    let result = narwhal::layout(&g, &opts).unwrap();
    assert_on_one_circle(&result, &members);
}

#[test]
fn cycle_cluster_is_drawn_without_crossing_chords() {
    // The cycle visits the members out of their declaration order.
    let members = ["a", "b", "c", "d", "e", "f", "g"];
    let cycle = [
        ("a", "d"),
        ("d", "b"),
        ("b", "f"),
        ("f", "c"),
        ("c", "g"),
        ("g", "e"),
        ("e", "a"),
    ];
    let g = graph(&members, &cycle);
    let opts = CiseOptions {
        random_seed: 11,
        ..Default::default()
    }
    .with_clusters(cells(&[&members]));
    let result = narwhal::layout(&g, &opts).unwrap();

    for (i, &(s1, t1)) in cycle.iter().enumerate() {
        for &(s2, t2) in &cycle[i + 1..] {
            let crossing = segments_intersect(
                at(&result, s1),
                at(&result, t1),
                at(&result, s2),
                at(&result, t2),
            );
            assert!(!crossing, "{s1}-{t1} crosses {s2}-{t2}");
        }
    }
}

#[test]
fn separate_clusters_do_not_overlap() {
    let left = ["a1", "a2", "a3", "a4"];
    let right = ["b1", "b2", "b3", "b4"];
    let nodes: Vec<&str> = left.iter().chain(&right).copied().collect();
    let g = graph(
        &nodes,
        &[
            ("a1", "a2"),
            ("a2", "a3"),
            ("a3", "a4"),
            ("a4", "a1"),
            ("b1", "b2"),
            ("b2", "b3"),
            ("b3", "b4"),
            ("b4", "b1"),
            ("a1", "b1"),
            ("a3", "b3"),
        ],
    );
    let opts = CiseOptions::default().with_clusters(cells(&[&left, &right]));
    let result = narwhal::layout(&g, &opts).unwrap();

    for a in left {
        for b in right {
            assert!(!boxes_overlap(at(&result, a), at(&result, b), 20.0), "{a} overlaps {b}");
        }
    }
    assert_on_one_circle(&result, &left);
    assert_on_one_circle(&result, &right);
}

#[test]
fn classifier_clusters_by_compound_parent() {
    let mut g = graph(
        &["a", "b", "c", "d", "u", "v"],
        &[("a", "b"), ("b", "c"), ("c", "d"), ("d", "a"), ("a", "u"), ("u", "v")],
    );
    for n in g.nodes.iter_mut() {
        if ["a", "b", "c", "d"].contains(&n.id.as_str()) {
            n.parent = Some("group".to_string());
        }
    }
    g.nodes.push(Node {
        is_parent: true,
        ..Node::new("group", 0.0, 0.0)
    });
    let opts = CiseOptions::default()
        .with_classifier(|n| n.parent.as_deref().map(|p| if p == "group" { 0 } else { -1 }));
    let result = narwhal::layout(&g, &opts).unwrap();

    assert_eq!(result.positions.len(), 6);
    assert_on_one_circle(&result, &["a", "b", "c", "d"]);
    let bounds = result.parent_bounds["group"];
    for id in ["a", "b", "c", "d"] {
        assert!(bounds.contains(result.positions[id]));
    }
}

#[test]
fn disconnected_clusters_are_packed_apart() {
    let left = ["a1", "a2", "a3"];
    let right = ["b1", "b2", "b3"];
    let nodes: Vec<&str> = left.iter().chain(&right).copied().collect();
    let g = graph(
        &nodes,
        &[
            ("a1", "a2"),
            ("a2", "a3"),
            ("a3", "a1"),
            ("b1", "b2"),
            ("b2", "b3"),
            ("b3", "b1"),
        ],
    );
    let opts = CiseOptions::default().with_clusters(cells(&[&left, &right]));
    let result = narwhal::layout(&g, &opts).unwrap();

    let max_left = left.iter().map(|id| at(&result, id).0).fold(f64::NEG_INFINITY, f64::max);
    let min_left = left.iter().map(|id| at(&result, id).0).fold(f64::INFINITY, f64::min);
    let max_right = right.iter().map(|id| at(&result, id).0).fold(f64::NEG_INFINITY, f64::max);
    let min_right = right.iter().map(|id| at(&result, id).0).fold(f64::INFINITY, f64::min);
    // Packed in one row: one component lies entirely to the left of the other.
    assert!(max_left + 20.0 <= min_right + 1e-6 || max_right + 20.0 <= min_left + 1e-6);
}

#[test]
fn nodes_may_move_inside_their_circle() {
    let members = ["h", "a", "b", "c", "d", "e", "f", "g", "i", "j"];
    let g = graph(
        &members,
        &[
            ("h", "d"),
            ("h", "e"),
            ("c", "f"),
            ("a", "b"),
            ("b", "c"),
            ("d", "e"),
            ("f", "g"),
            ("g", "i"),
            ("i", "j"),
            ("j", "a"),
        ],
    );
    let opts = CiseOptions {
        allow_nodes_inside_circle: true,
        max_ratio_of_nodes_inside_circle: 0.2,
        ..Default::default()
    }
    .with_clusters(cells(&[&members]));
    let result = narwhal::layout(&g, &opts).unwrap();
    assert_eq!(result.positions.len(), members.len());

    for id in members {
        let (x, y) = at(&result, id);
        assert!(x.is_finite() && y.is_finite(), "{id}");
    }
}
