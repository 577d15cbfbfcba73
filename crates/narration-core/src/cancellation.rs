use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation flag shared between a generation worker and
/// whoever started it. The pipeline only looks at it between chunks.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` if cancellation was requested before reaching
    /// `boundary`.
    pub fn checkpoint(&self, boundary: Boundary) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            tracing::debug!(?boundary, "Cancellation observed");
            return Err(Cancelled { boundary });
        }
        Ok(())
    }
}

/// Points in a generation run where cancellation is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    BeforeChunk { index: usize },
    BeforeMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    pub boundary: Boundary,
}
