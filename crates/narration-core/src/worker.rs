//! Background execution of one generation.

use crate::cancellation::CancellationToken;
use crate::pipeline::{Generation, GenerationOutcome, GenerationRequest, Pipeline};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Messages a worker sends back. Cancelled runs send no terminal event.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Progress {
        request_id: u64,
        percent: u8,
    },
    Finished {
        request_id: u64,
        generation: Arc<Generation>,
    },
    Failed {
        request_id: u64,
        message: String,
    },
}

impl GenerationEvent {
    pub fn request_id(&self) -> u64 {
        match self {
            GenerationEvent::Progress { request_id, .. }
            | GenerationEvent::Finished { request_id, .. }
            | GenerationEvent::Failed { request_id, .. } => *request_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationEvent::Progress { .. })
    }
}

/// Handle to a generation running on its own thread. Dropping the handle
/// cancels the run without waiting for it.
#[derive(Debug)]
pub struct GenerationWorker {
    request_id: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl GenerationWorker {
    /// Start `request` on a new thread. When `previous` is given it is
    /// cancelled and the new thread waits for it to exit before running.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        request: GenerationRequest,
        request_id: u64,
        events: Sender<GenerationEvent>,
        previous: Option<GenerationWorker>,
    ) -> std::io::Result<Self> {
        let previous_handle = previous.and_then(|mut worker| {
            worker.cancel();
            worker.handle.take()
        });
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("narration-{request_id}"))
            .spawn(move || {
                if let Some(previous) = previous_handle {
                    if previous.join().is_err() {
                        warn!(request_id, "Previous generation worker panicked");
                    }
                }
                if worker_cancel.is_cancelled() {
                    debug!(request_id, "Generation cancelled before it started");
                    return;
                }
                run_generation(&pipeline, &request, request_id, &worker_cancel, &events);
            })?;

        Ok(Self {
            request_id,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this run, for signal handlers and other threads.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Block until the worker thread exits.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(request_id = self.request_id, "Generation worker panicked");
            }
        }
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

fn run_generation(
    pipeline: &Pipeline,
    request: &GenerationRequest,
    request_id: u64,
    cancel: &CancellationToken,
    events: &Sender<GenerationEvent>,
) {
    let outcome = pipeline.run(request, cancel, |percent| {
        let _ = events.send(GenerationEvent::Progress {
            request_id,
            percent,
        });
    });
    let event = match outcome {
        Ok(GenerationOutcome::Completed(generation)) => GenerationEvent::Finished {
            request_id,
            generation: Arc::new(generation),
        },
        Ok(GenerationOutcome::Cancelled(cancelled)) => {
            info!(request_id, boundary = ?cancelled.boundary, "Generation stopped");
            return;
        }
        Err(err) => {
            warn!(request_id, "Generation failed: {err}");
            GenerationEvent::Failed {
                request_id,
                message: err.to_string(),
            }
        }
    };
    if events.send(event).is_err() {
        debug!(request_id, "Generation result dropped; nobody is listening");
    }
}
