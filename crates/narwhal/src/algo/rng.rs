/// Small seeded generator owned by a single layout run.
#[derive(Debug, Clone)]
pub(crate) struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub(crate) fn new(seed: u64) -> Self {
        // A zero state would stay zero forever.
        Self { state: seed.max(1) }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Uniform in [0, 1) with 53 bits of precision.
    pub(crate) fn next_f64_unit(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        (u as f64) / ((1u64 << 53) as f64)
    }

    /// `floor(unit * upper)`, clamped to `upper - 1`.
    pub(crate) fn next_usize(&mut self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        let v = self.next_f64_unit();
        let idx = (v * (upper as f64)).floor() as usize;
        idx.min(upper - 1)
    }

    /// `count` distinct indices from `0..upper` (partial Fisher-Yates).
    pub(crate) fn sample_distinct(&mut self, upper: usize, count: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..upper).collect();
        let count = count.min(upper);
        for i in 0..count {
            let j = i + self.next_usize(upper - i);
            pool.swap(i, j);
        }
        pool.truncate(count);
        pool
    }
}
