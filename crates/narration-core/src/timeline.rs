//! Immutable global timeline and the "which word is spoken now" lookup.
//!
//! Lookups run on every playback tick, so they are binary searches over data
//! prepared once in [`Timeline::new`] and never allocate.

use crate::timing::{GlobalWordTiming, WordSpan};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    words: Vec<GlobalWordTiming>,
    /// `running_end[i]` is the latest interval end among `words[..=i]`.
    #[serde(skip)]
    running_end: Vec<f64>,
}

impl Timeline {
    /// `words` must already be in narration order with non-decreasing
    /// starts; the order is kept as given.
    pub fn new(words: Vec<GlobalWordTiming>) -> Self {
        debug_assert!(
            words.windows(2).all(|pair| pair[0].start_secs <= pair[1].start_secs),
            "timeline starts must be non-decreasing"
        );
        let mut running_end = Vec::with_capacity(words.len());
        let mut latest = f64::NEG_INFINITY;
        for word in &words {
            latest = latest.max(word.end_secs());
            running_end.push(latest);
        }
        Self { words, running_end }
    }

    pub fn words(&self) -> &[GlobalWordTiming] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Index of the earliest-starting word whose `[start, start + duration)`
    /// contains `position_secs`.
    pub fn active_index_at(&self, position_secs: f64) -> Option<usize> {
        if position_secs.is_nan() {
            return None;
        }
        let started = self
            .words
            .partition_point(|word| word.start_secs <= position_secs);
        if started == 0 {
            return None;
        }
        let first_live = self.running_end[..started].partition_point(|end| *end <= position_secs);
        (first_live < started).then_some(first_live)
    }

    pub fn active_at(&self, position_secs: f64) -> Option<WordSpan> {
        self.active_index_at(position_secs)
            .map(|idx| self.words[idx].span())
    }
}
