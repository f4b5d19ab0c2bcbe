//! Rectangle-aware spring and repulsion forces shared by the cluster placer and the simulator.

/// Top-left anchored node rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Frame {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub(crate) fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self {
            left: cx - width / 2.0,
            top: cy - height / 2.0,
            width,
            height,
        }
    }

    pub(crate) fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub(crate) fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }

    pub(crate) fn half_w(&self) -> f64 {
        self.width / 2.0
    }

    pub(crate) fn half_h(&self) -> f64 {
        self.height / 2.0
    }

    pub(crate) fn right(&self) -> f64 {
        self.left + self.width
    }

    pub(crate) fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Sign with `sign(0) == 0`, unlike `f64::signum`.
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub(crate) fn rects_intersect(a: &Frame, b: &Frame) -> bool {
    a.left < b.right() && a.right() > b.left && a.top < b.bottom() && a.bottom() > b.top
}

/// Point where the segment from `a`'s center towards `b`'s center leaves `a`.
pub(crate) fn rect_clip_point_towards(a: &Frame, b: &Frame) -> (f64, f64) {
    let ax = a.center_x();
    let ay = a.center_y();
    let dx = b.center_x() - ax;
    let dy = b.center_y() - ay;

    if dx == 0.0 && dy == 0.0 {
        return (ax, ay);
    }

    let mut t_x = f64::INFINITY;
    let mut t_y = f64::INFINITY;
    if dx != 0.0 {
        t_x = (a.half_w() / dx.abs()).max(0.0);
    }
    if dy != 0.0 {
        t_y = (a.half_h() / dy.abs()).max(0.0);
    }
    let t = t_x.min(t_y);
    (ax + t * dx, ay + t * dy)
}

/// Hookean force on `a` (negate for `b`) pulling the clipped boundary distance to `ideal`.
///
/// Overlapping rectangles exert no spring force; repulsion separates them instead.
pub(crate) fn spring_force(a: &Frame, b: &Frame, ideal: f64, elasticity: f64) -> (f64, f64) {
    if rects_intersect(a, b) {
        return (0.0, 0.0);
    }
    let (ax, ay) = rect_clip_point_towards(a, b);
    let (bx, by) = rect_clip_point_towards(b, a);
    let mut lx = bx - ax;
    let mut ly = by - ay;

    if lx.abs() < 1e-9 {
        lx = 0.0;
    }
    if ly.abs() < 1e-9 {
        ly = 0.0;
    }
    if lx.abs() < 1.0 {
        lx = sign(lx);
    }
    if ly.abs() < 1.0 {
        ly = sign(ly);
    }
    let len = (lx * lx + ly * ly).sqrt();
    if len == 0.0 {
        return (0.0, 0.0);
    }

    let force = elasticity * (len - ideal.max(1.0));
    (force * (lx / len), force * (ly / len))
}

/// Repulsion on `a` (negate for `b`): `strength / d²` between clipped boundaries, or an
/// overlap-resolving push when the rectangles intersect.
pub(crate) fn repulsion_force(
    a: &Frame,
    b: &Frame,
    strength: f64,
    min_repulsion_dist: f64,
    separation_buffer: f64,
) -> (f64, f64) {
    if rects_intersect(a, b) {
        let (ox, oy) = calc_separation_amount(a, b, separation_buffer);
        return (ox, oy);
    }

    let (ax, ay) = rect_clip_point_towards(a, b);
    let (bx, by) = rect_clip_point_towards(b, a);
    let mut dx = bx - ax;
    let mut dy = by - ay;

    if dx.abs() < 1e-9 {
        dx = 0.0;
    }
    if dy.abs() < 1e-9 {
        dy = 0.0;
    }

    if dx.abs() < min_repulsion_dist {
        dx = sign(dx) * min_repulsion_dist;
    }
    if dy.abs() < min_repulsion_dist {
        dy = sign(dy) * min_repulsion_dist;
    }

    let dist_sq = dx * dx + dy * dy;
    let dist = dist_sq.sqrt();
    if dist_sq == 0.0 || dist == 0.0 {
        return (0.0, 0.0);
    }
    let f = strength / dist_sq;
    (-f * dx / dist, -f * dy / dist)
}

fn calc_separation_amount(a: &Frame, b: &Frame, separation_buffer: f64) -> (f64, f64) {
    let (dir_x, dir_y) = decide_directions_for_overlapping_nodes(a, b);

    let mut overlap_x = a.right().min(b.right()) - a.left.max(b.left);
    let mut overlap_y = a.bottom().min(b.bottom()) - a.top.max(b.top);

    if (a.left <= b.left) && (a.right() >= b.right()) {
        overlap_x += (b.left - a.left).min(a.right() - b.right());
    } else if (b.left <= a.left) && (b.right() >= a.right()) {
        overlap_x += (a.left - b.left).min(b.right() - a.right());
    }
    if (a.top <= b.top) && (a.bottom() >= b.bottom()) {
        overlap_y += (b.top - a.top).min(a.bottom() - b.bottom());
    } else if (b.top <= a.top) && (b.bottom() >= a.bottom()) {
        overlap_y += (a.top - b.top).min(b.bottom() - a.bottom());
    }

    let mut slope = ((b.center_y() - a.center_y()) / (b.center_x() - a.center_x())).abs();
    if (b.center_y() == a.center_y()) && (b.center_x() == a.center_x()) {
        slope = 1.0;
    }

    let mut move_by_y = slope * overlap_x;
    let mut move_by_x = overlap_y / slope;
    if overlap_x < move_by_x {
        move_by_x = overlap_x;
    } else {
        move_by_y = overlap_y;
    }

    // `a` moves away from `b` along each axis.
    let dx = dir_x * ((move_by_x / 2.0) + separation_buffer);
    let dy = dir_y * ((move_by_y / 2.0) + separation_buffer);
    (dx, dy)
}

fn decide_directions_for_overlapping_nodes(a: &Frame, b: &Frame) -> (f64, f64) {
    let dir_x = if a.center_x() < b.center_x() {
        -1.0
    } else {
        1.0
    };
    let dir_y = if a.center_y() < b.center_y() {
        -1.0
    } else {
        1.0
    };
    (dir_x, dir_y)
}
