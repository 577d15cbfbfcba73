//! Chunk-local → global timing conversion.
//!
//! Chunks must be pushed in order: each one is shifted by the audio time and
//! text length of everything pushed before it.

use crate::chunker::CHUNK_SEPARATOR_CHARS;
use crate::timeline::Timeline;
use crate::timing::{GlobalWordTiming, WordTiming};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct TimelineReconciler {
    cumulative_secs: f64,
    cumulative_chars: usize,
    chunks: usize,
    words: Vec<GlobalWordTiming>,
}

impl TimelineReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio time covered by the chunks pushed so far.
    pub fn cumulative_secs(&self) -> f64 {
        self.cumulative_secs
    }

    /// Chars of reconstructed text covered so far, trailing separator
    /// included.
    pub fn cumulative_chars(&self) -> usize {
        self.cumulative_chars
    }

    /// Shift `local` into global coordinates and advance the running totals by
    /// `duration_secs` and the chunk's length plus one separator. Timings
    /// whose span does not fit inside `content` are dropped, and a start
    /// earlier than the previous word's is raised to it. Returns how many
    /// timings were kept.
    pub fn push_chunk(&mut self, content: &str, local: Vec<WordTiming>, duration_secs: f64) -> usize {
        let content_chars = content.chars().count();
        let chunk_idx = self.chunks;
        let mut kept = 0usize;

        for timing in local {
            if !timing.fits_within(content_chars) {
                warn!(
                    chunk = chunk_idx,
                    word = %timing.word,
                    offset = timing.text_offset,
                    length = timing.word_length,
                    content_chars,
                    "Dropping word timing outside its chunk text"
                );
                continue;
            }
            if !timing.start_secs.is_finite() || !timing.duration_secs.is_finite() {
                warn!(chunk = chunk_idx, word = %timing.word, "Dropping non-finite word timing");
                continue;
            }
            // Starts never move backwards: a word spilling past a short
            // chunk's duration must not precede the next chunk's words.
            let shifted = timing.start_secs + self.cumulative_secs;
            let end = shifted + timing.duration_secs.max(0.0);
            let start_secs = self
                .words
                .last()
                .map_or(shifted, |prev| shifted.max(prev.start_secs));
            self.words.push(GlobalWordTiming {
                word: timing.word,
                start_secs,
                duration_secs: (end - start_secs).max(0.0),
                text_offset: timing.text_offset + self.cumulative_chars,
                word_length: timing.word_length,
            });
            kept += 1;
        }

        let duration_secs = if duration_secs.is_finite() {
            duration_secs.max(0.0)
        } else {
            0.0
        };
        self.cumulative_secs += duration_secs;
        self.cumulative_chars += content_chars + CHUNK_SEPARATOR_CHARS;
        self.chunks += 1;

        debug!(
            chunk = chunk_idx,
            kept,
            duration_secs,
            cumulative_secs = self.cumulative_secs,
            cumulative_chars = self.cumulative_chars,
            "Reconciled chunk timings"
        );
        kept
    }

    /// Freeze the accumulated words. Also returns the total audio duration.
    pub fn finish(self) -> (Timeline, f64) {
        (Timeline::new(self.words), self.cumulative_secs)
    }
}
