//! Global sequence alignment (Needleman–Wunsch) used to decide circle reversals.

pub const MATCH_SCORE: i64 = 20;
pub const MISMATCH_PENALTY: i64 = -1;
pub const GAP_PENALTY: i64 = -2;

/// Letters available for labelling circle positions: `a-z` then `A-Z`.
pub const ALPHABET: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Letter for position `idx`, or `None` once the alphabet is exhausted.
pub fn letter(idx: usize) -> Option<u8> {
    ALPHABET.get(idx).copied()
}

/// Optimal global alignment score of `a` against `b`.
pub fn needleman_wunsch(a: &[u8], b: &[u8]) -> i64 {
    let cols = b.len() + 1;
    let mut prev: Vec<i64> = (0..cols).map(|j| j as i64 * GAP_PENALTY).collect();
    let mut cur: Vec<i64> = vec![0; cols];

    for (i, &ca) in a.iter().enumerate() {
        cur[0] = (i as i64 + 1) * GAP_PENALTY;
        for (j, &cb) in b.iter().enumerate() {
            let diag = prev[j]
                + if ca == cb {
                    MATCH_SCORE
                } else {
                    MISMATCH_PENALTY
                };
            let up = prev[j + 1] + GAP_PENALTY;
            let left = cur[j] + GAP_PENALTY;
            cur[j + 1] = diag.max(up).max(left);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[cols - 1]
}
