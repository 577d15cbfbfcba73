//! Word timing records.
//!
//! Chunk-local and global timings are separate types so an un-reconciled
//! offset can never reach the playback side; only the reconciler turns one
//! into the other.

use serde::{Deserialize, Serialize};

/// A spoken word relative to its own chunk: seconds from the start of the
/// chunk's audio, chars from the start of the chunk's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub text_offset: usize,
    pub word_length: usize,
}

impl WordTiming {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    /// Whether the word's char span fits inside a text of `text_chars` chars.
    pub fn fits_within(&self, text_chars: usize) -> bool {
        self.text_offset
            .checked_add(self.word_length)
            .is_some_and(|end| end <= text_chars)
    }
}

/// A spoken word relative to the merged audio and the reconstructed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalWordTiming {
    pub word: String,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub text_offset: usize,
    pub word_length: usize,
}

impl GlobalWordTiming {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    pub fn span(&self) -> WordSpan {
        WordSpan {
            offset: self.text_offset,
            length: self.word_length,
        }
    }
}

/// Char range of one word inside the reconstructed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordSpan {
    pub offset: usize,
    pub length: usize,
}

impl WordSpan {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}
