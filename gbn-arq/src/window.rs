//! Round slicing.
//!
//! The stream is cut into consecutive windows; round `counter` (1-based)
//! owns the half-open range
//!
//! ```text
//!   [(counter - 1) * W, min(N, counter * W))
//! ```
//!
//! Only the last round may be shorter than `W`.  Nothing here is stored
//! between rounds: the sender recomputes the range from its counter each time,
//! so a retried round always covers exactly the same units.

use std::ops::Range;

/// The slice of the stream owed for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    /// 1-based round index.
    pub counter: u32,
    /// First stream index in the batch.
    pub start: usize,
    /// One past the last stream index in the batch.
    pub end: usize,
    /// `true` when this batch reaches the end of the stream.
    pub is_final: bool,
}

impl Round {
    /// Compute round `counter` for a stream of `len` units.
    ///
    /// `counter` and `window_size` must both be at least 1.
    pub fn new(counter: u32, window_size: usize, len: usize) -> Self {
        debug_assert!(counter >= 1, "rounds are 1-based");
        debug_assert!(window_size >= 1, "window_size must be at least 1");

        let reach = (counter as usize).saturating_mul(window_size);
        let start = reach.saturating_sub(window_size).min(len);
        let end = reach.min(len);
        Self {
            counter,
            start,
            end,
            is_final: reach >= len,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of units in the batch.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Number of accepted rounds needed to move `len` units, `ceil(len / W)`.
pub fn round_count(len: usize, window_size: usize) -> u32 {
    len.div_ceil(window_size) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_round_starts_at_zero() {
        let r = Round::new(1, 5, 55);
        assert_eq!(r.range(), 0..5);
        assert!(!r.is_final);
    }

    #[test]
    fn exact_multiple_last_round_is_full() {
        let r = Round::new(11, 5, 55);
        assert_eq!(r.range(), 50..55);
        assert_eq!(r.len(), 5);
        assert!(r.is_final);
    }

    #[test]
    fn partial_last_round() {
        let r = Round::new(8, 7, 55);
        assert_eq!(r.range(), 49..55);
        assert_eq!(r.len(), 6);
        assert!(r.is_final);

        let before = Round::new(7, 7, 55);
        assert_eq!(before.range(), 42..49);
        assert!(!before.is_final);
    }

    #[test]
    fn window_larger_than_stream() {
        let r = Round::new(1, 64, 10);
        assert_eq!(r.range(), 0..10);
        assert!(r.is_final);
    }

    #[test]
    fn past_the_end_is_empty() {
        let r = Round::new(3, 5, 10);
        assert!(r.is_empty());
        assert!(r.is_final);
    }

    #[test]
    fn rounds_tile_the_stream() {
        let (len, w) = (23, 4);
        let mut next = 0;
        for counter in 1..=round_count(len, w) {
            let r = Round::new(counter, w, len);
            assert_eq!(r.start, next);
            next = r.end;
        }
        assert_eq!(next, len);
    }

    #[test]
    fn round_counts() {
        assert_eq!(round_count(55, 5), 11);
        assert_eq!(round_count(55, 7), 8);
        assert_eq!(round_count(1, 1), 1);
        assert_eq!(round_count(3, 10), 1);
    }

    #[test]
    fn huge_counter_saturates() {
        let r = Round::new(u32::MAX, usize::MAX / 2, 100);
        assert!(r.is_empty());
        assert!(r.is_final);
    }
}
