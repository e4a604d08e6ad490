/// A fixed-capacity ring of the most recently accepted sequence numbers,
/// used to classify a late/out-of-range arrival as duplicate (present in the
/// ring) versus reorder (absent). Membership is a linear scan, not a
/// masked direct-index lookup — the reference implementation scans its
/// whole history buffer per arrival, and at `LPDU_HISTORY_SIZE` entries the
/// cost is negligible next to a socket read.
///
/// No allocation happens after construction: `insert` always overwrites the
/// next ring slot.
#[derive(Debug)]
pub struct SequenceHistory {
    buf: Vec<u32>,
    filled: Vec<bool>,
    next: usize,
}

impl SequenceHistory {
    /// `capacity` should be a power of two (per §4.9's design note) though
    /// nothing here requires it; the reference implementation masks the
    /// write index, which only matters for wrap performance, not semantics.
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0; capacity], filled: vec![false; capacity], next: 0 }
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.buf.iter().zip(self.filled.iter()).any(|(&s, &f)| f && s == seq)
    }

    pub fn insert(&mut self, seq: u32) {
        let cap = self.buf.len();
        self.buf[self.next] = seq;
        self.filled[self.next] = true;
        self.next = (self.next + 1) % cap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_contains_nothing() {
        let history = SequenceHistory::new(8);
        assert!(!history.contains(0));
    }

    #[test]
    fn inserted_sequence_is_found() {
        let mut history = SequenceHistory::new(8);
        history.insert(42);
        assert!(history.contains(42));
        assert!(!history.contains(43));
    }

    #[test]
    fn ring_wraps_and_forgets_oldest_entry() {
        let mut history = SequenceHistory::new(4);
        for seq in 0..4 {
            history.insert(seq);
        }
        assert!(history.contains(0));
        history.insert(4); // wraps, overwrites seq 0's slot
        assert!(!history.contains(0));
        assert!(history.contains(4));
    }
}
