//! Teleprompter highlighting driven by the playback clock.

use crate::timeline::Timeline;
use crate::timing::WordSpan;
use std::sync::Arc;

/// Rendering side of the teleprompter.
pub trait Highlighter {
    fn clear(&mut self, span: WordSpan);
    fn apply(&mut self, span: WordSpan);
}

/// Keeps exactly one span highlighted, following the playback position.
#[derive(Debug, Clone)]
pub struct TeleprompterSync {
    timeline: Arc<Timeline>,
    active: Option<WordSpan>,
}

impl TeleprompterSync {
    pub fn new(timeline: Arc<Timeline>) -> Self {
        Self {
            timeline,
            active: None,
        }
    }

    pub fn active(&self) -> Option<WordSpan> {
        self.active
    }

    /// Move the highlight to whatever is spoken at `position_secs`. Returns
    /// true when the highlighted span changed.
    pub fn update(&mut self, position_secs: f64, highlighter: &mut impl Highlighter) -> bool {
        let next = self.timeline.active_at(position_secs);
        if next == self.active {
            return false;
        }
        if let Some(previous) = self.active.take() {
            highlighter.clear(previous);
        }
        if let Some(span) = next {
            highlighter.apply(span);
        }
        self.active = next;
        true
    }

    /// Drop the highlight, e.g. when playback stops.
    pub fn reset(&mut self, highlighter: &mut impl Highlighter) {
        if let Some(previous) = self.active.take() {
            highlighter.clear(previous);
        }
    }
}
