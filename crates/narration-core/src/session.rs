//! Caller-facing state: at most one generation in flight, the latest
//! finished generation kept for playback.

use crate::cancellation::CancellationToken;
use crate::pipeline::{Generation, GenerationRequest, Pipeline};
use crate::worker::{GenerationEvent, GenerationWorker};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What the caller should react to after handling an event.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Progress(u8),
    Ready(Arc<Generation>),
    Failed(String),
}

pub struct NarrationSession {
    pipeline: Arc<Pipeline>,
    events_tx: Sender<GenerationEvent>,
    events_rx: Receiver<GenerationEvent>,
    request_id: u64,
    active: Option<GenerationWorker>,
    current: Option<Arc<Generation>>,
    progress: u8,
}

impl NarrationSession {
    pub fn new(pipeline: Pipeline) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            pipeline: Arc::new(pipeline),
            events_tx,
            events_rx,
            request_id: 0,
            active: None,
            current: None,
            progress: 0,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Start a generation, cancelling any that is still running. Returns the
    /// new request id.
    pub fn start_generation(&mut self, request: GenerationRequest) -> Result<u64> {
        self.request_id = self.request_id.wrapping_add(1);
        let request_id = self.request_id;
        let previous = self.active.take();
        if let Some(previous) = &previous {
            debug!(
                previous = previous.request_id(),
                request_id, "Superseding in-flight generation"
            );
        }
        let worker = GenerationWorker::spawn(
            Arc::clone(&self.pipeline),
            request,
            request_id,
            self.events_tx.clone(),
            previous,
        )
        .context("spawning generation worker")?;
        self.active = Some(worker);
        self.progress = 0;
        Ok(request_id)
    }

    pub fn cancel(&mut self) {
        if let Some(worker) = &self.active {
            worker.cancel();
        }
    }

    pub fn cancel_token(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(GenerationWorker::cancel_token)
    }

    pub fn is_generating(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|worker| !worker.is_cancelled() && !worker.is_finished())
    }

    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.clone()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Apply one worker event. Events from superseded requests are dropped.
    pub fn handle(&mut self, event: GenerationEvent) -> Option<SessionUpdate> {
        if event.request_id() != self.request_id {
            debug!(
                request_id = event.request_id(),
                current = self.request_id,
                "Ignoring stale generation event"
            );
            return None;
        }
        match event {
            GenerationEvent::Progress { percent, .. } => {
                self.progress = percent;
                Some(SessionUpdate::Progress(percent))
            }
            GenerationEvent::Finished { generation, .. } => {
                self.progress = 100;
                // The replaced generation's temporary audio goes away once
                // nobody else holds it.
                self.current = Some(Arc::clone(&generation));
                Some(SessionUpdate::Ready(generation))
            }
            GenerationEvent::Failed { message, .. } => Some(SessionUpdate::Failed(message)),
        }
    }

    /// Handle every event already queued.
    pub fn poll(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(update) = self.handle(event) {
                updates.push(update);
            }
        }
        updates
    }

    /// Block until the active generation ends. Returns the terminal update,
    /// or `None` when it was cancelled or nothing is running.
    pub fn wait(&mut self, mut on_update: impl FnMut(&SessionUpdate)) -> Option<SessionUpdate> {
        loop {
            match self.events_rx.recv_timeout(WAIT_POLL_INTERVAL) {
                Ok(event) => {
                    let Some(update) = self.handle(event) else {
                        continue;
                    };
                    on_update(&update);
                    if !matches!(update, SessionUpdate::Progress(_)) {
                        return Some(update);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let finished = self.active.as_ref().is_none_or(GenerationWorker::is_finished);
                    if finished {
                        // The worker may have sent right before exiting.
                        for update in self.poll() {
                            on_update(&update);
                            if !matches!(update, SessionUpdate::Progress(_)) {
                                return Some(update);
                            }
                        }
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

impl Drop for NarrationSession {
    /// Cancel and wait, so the run's chunk files are gone once the session
    /// is.
    fn drop(&mut self) {
        if let Some(worker) = self.active.take() {
            worker.cancel();
            worker.join();
        }
    }
}
