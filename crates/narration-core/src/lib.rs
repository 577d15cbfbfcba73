//! Narrated audio with word-level teleprompter timing.
//!
//! Text flows through [`normalizer`], [`chunker`], [`synthesis`], [`probe`],
//! [`reconcile`] and [`concat`] inside a [`pipeline::Pipeline`]; the result is
//! a merged audio file plus a [`timeline::Timeline`] that
//! [`playback::TeleprompterSync`] follows during playback.

pub mod artifacts;
pub mod cancellation;
pub mod chunker;
pub mod concat;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod playback;
pub mod probe;
pub mod reconcile;
pub mod session;
pub mod synthesis;
pub mod timeline;
pub mod timing;
pub mod worker;

pub use cancellation::CancellationToken;
pub use error::GenerationError;
pub use pipeline::{Generation, GenerationOutcome, GenerationRequest, MergedAudio, Pipeline};
pub use playback::{Highlighter, TeleprompterSync};
pub use session::{NarrationSession, SessionUpdate};
pub use timeline::Timeline;
pub use timing::{GlobalWordTiming, WordSpan, WordTiming};
pub use worker::{GenerationEvent, GenerationWorker};
