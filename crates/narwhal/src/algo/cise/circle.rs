use rustc_hash::FxHashMap;

/// One cluster drawn as a circle around its super-node.
#[derive(Debug, Clone)]
pub(crate) struct Circle {
    /// Super-node whose center is the circle center.
    pub parent: usize,
    /// `order[i]` is the node with order index `i`; angles increase with the index.
    pub order: Vec<usize>,
    pub radius: f64,
    /// Members relocated into the interior.
    pub inner: Vec<usize>,
    /// Edges with both endpoints in this cluster.
    pub intra_edges: Vec<usize>,
    /// Edges with exactly one endpoint in this cluster.
    pub inter_edges: Vec<usize>,
    pub order_matrix: Option<OrderMatrix>,
    pub may_be_reversed: bool,
}

impl Circle {
    pub(crate) fn new(parent: usize, members: Vec<usize>) -> Self {
        Self {
            parent,
            order: members,
            radius: 0.0,
            inner: Vec::new(),
            intra_edges: Vec::new(),
            inter_edges: Vec::new(),
            order_matrix: None,
            may_be_reversed: true,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn next_index(&self, i: usize) -> usize {
        (i + 1) % self.order.len().max(1)
    }
}

/// Snapshot of a circle's cyclic order: `forward[i][j]` is true iff walking forward from order
/// index `i` reaches `j` in at most half a turn.
#[derive(Debug, Clone)]
pub(crate) struct OrderMatrix {
    index_of: FxHashMap<usize, usize>,
    forward: Vec<Vec<bool>>,
}

impl OrderMatrix {
    pub(crate) fn compute(order: &[usize]) -> Self {
        let n = order.len();
        let mut index_of: FxHashMap<usize, usize> = FxHashMap::default();
        index_of.reserve(n);
        for (i, &v) in order.iter().enumerate() {
            index_of.insert(v, i);
        }
        let mut forward = vec![vec![false; n]; n];
        for (i, row) in forward.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                if i == j {
                    continue;
                }
                let steps = (j + n - i) % n;
                *cell = steps * 2 <= n;
            }
        }
        Self { index_of, forward }
    }

    /// Whether node `b` follows node `a` within half a turn, `None` if either is not a member.
    pub(crate) fn precedes(&self, a: usize, b: usize) -> Option<bool> {
        let i = *self.index_of.get(&a)?;
        let j = *self.index_of.get(&b)?;
        if i == j {
            return None;
        }
        Some(self.forward[i][j])
    }
}

#[cfg(test)]
mod tests {
    use super::{Circle, OrderMatrix};

    #[test]
    fn neighbors_wrap_around() {
        let c = Circle::new(9, vec![4, 5, 6]);
        assert_eq!(c.next_index(2), 0);
        assert_eq!(c.next_index(0), 1);
    }

    #[test]
    fn order_matrix_tracks_half_turns() {
        let m = OrderMatrix::compute(&[10, 11, 12, 13, 14, 15]);
        assert_eq!(m.precedes(10, 11), Some(true));
        assert_eq!(m.precedes(11, 10), Some(false));
        assert_eq!(m.precedes(15, 10), Some(true));
        assert_eq!(m.precedes(10, 12), Some(true));
        assert_eq!(m.precedes(10, 14), Some(false));
        assert_eq!(m.precedes(10, 99), None);
    }
}
