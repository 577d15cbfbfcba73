//! Paragraph-aligned chunking of normalized text.
//!
//! Each chunk is one synthesis request. Paragraphs are never split, so a
//! paragraph longer than the limit travels alone.

use serde::Serialize;

/// Fixed joiner between chunks; global text offsets assume exactly this.
pub const CHUNK_SEPARATOR: &str = "\n\n";
pub const CHUNK_SEPARATOR_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub content: String,
    /// Char offset of `content` inside the normalized text.
    pub start_offset: usize,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

struct PendingChunk {
    content: String,
    start_offset: usize,
    /// Sum of paragraph lengths; separators are not counted.
    text_len: usize,
}

impl From<PendingChunk> for TextChunk {
    fn from(pending: PendingChunk) -> Self {
        TextChunk {
            content: pending.content,
            start_offset: pending.start_offset,
        }
    }
}

/// Split `text` into chunks whose paragraphs total at most `max_chars`
/// chars, breaking only at `"\n\n"`. Separators do not count toward the
/// limit.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let limit = max_chars.max(1);

    let mut chunks = Vec::new();
    let mut current: Option<PendingChunk> = None;
    let mut cursor = 0usize;

    for para in text.split(CHUNK_SEPARATOR) {
        let para_len = para.chars().count();
        let para_start = cursor;
        cursor += para_len + CHUNK_SEPARATOR_CHARS;

        if let Some(pending) = current.as_mut() {
            if pending.text_len + para_len <= limit {
                pending.content.push_str(CHUNK_SEPARATOR);
                pending.content.push_str(para);
                pending.text_len += para_len;
                continue;
            }
        }
        if let Some(full) = current.take() {
            chunks.push(full.into());
        }

        if para_len > limit {
            chunks.push(TextChunk {
                content: para.to_string(),
                start_offset: para_start,
            });
        } else {
            current = Some(PendingChunk {
                content: para.to_string(),
                start_offset: para_start,
                text_len: para_len,
            });
        }
    }

    if let Some(last) = current {
        chunks.push(last.into());
    }

    tracing::debug!(
        chunks = chunks.len(),
        limit,
        total_chars = cursor.saturating_sub(CHUNK_SEPARATOR_CHARS),
        "Split text into chunks"
    );
    chunks
}

/// Rebuild the text the chunks were cut from.
pub fn join_chunks(chunks: &[TextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}
