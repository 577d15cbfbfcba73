//! Speech synthesis boundary.
//!
//! Backends only ever hand back [`SynthesizedChunk`]s; whatever wire format
//! a backend speaks stays inside its own module.

pub mod command;
pub mod voices;

pub use command::CommandBackend;
pub use voices::{VoiceCatalog, filter_voices};

use crate::error::GenerationError;
use crate::timing::WordTiming;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const MIN_SPEED: f32 = 0.0;
pub const MAX_SPEED: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub text: String,
    /// Resolved backend voice id.
    pub voice: String,
    /// Signed percent delta, e.g. `"+50%"`.
    pub rate: String,
}

#[derive(Debug, Clone, Default)]
pub struct SynthesizedChunk {
    pub audio: Vec<u8>,
    pub timings: Vec<WordTiming>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub gender: String,
    pub locale: String,
}

pub trait SpeechBackend: Send + Sync {
    fn synthesize(&self, request: &BackendRequest) -> Result<SynthesizedChunk>;
    fn list_voices(&self) -> Result<Vec<VoiceInfo>>;
}

/// `1.5` → `"+50%"`, `0.8` → `"-20%"`.
pub fn speed_to_rate(speed: f32) -> String {
    let delta = ((speed - 1.0) * 100.0).round() as i32;
    format!("{delta:+}%")
}

/// Voice and rate fixed for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub voice: String,
    pub rate: String,
}

#[derive(Clone)]
pub struct Synthesizer {
    backend: Arc<dyn SpeechBackend>,
    voices: VoiceCatalog,
}

impl Synthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>, voices: VoiceCatalog) -> Self {
        Self { backend, voices }
    }

    pub fn voices(&self) -> &VoiceCatalog {
        &self.voices
    }

    /// Validate `speed` and resolve `voice`. Never touches the backend.
    pub fn prepare(&self, voice: &str, speed: f32) -> Result<VoiceSettings, GenerationError> {
        if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(GenerationError::validation(format!(
                "Speed must be between {MIN_SPEED} and {MAX_SPEED} (inclusive), got {speed}"
            )));
        }
        let resolved = self.voices.resolve(voice);
        if resolved.is_empty() {
            return Err(GenerationError::validation("Voice must not be empty"));
        }
        Ok(VoiceSettings {
            voice: resolved.to_string(),
            rate: speed_to_rate(speed),
        })
    }

    /// Synthesize one chunk. Blank text is silent and skips the backend.
    pub fn synthesize(&self, text: &str, settings: &VoiceSettings) -> Result<SynthesizedChunk> {
        if text.trim().is_empty() {
            debug!("Skipping synthesis of blank chunk");
            return Ok(SynthesizedChunk::default());
        }
        let request = BackendRequest {
            text: text.to_string(),
            voice: settings.voice.clone(),
            rate: settings.rate.clone(),
        };
        debug!(
            voice = %request.voice,
            rate = %request.rate,
            chars = text.chars().count(),
            "Synthesizing chunk"
        );
        self.backend.synthesize(&request)
    }

    pub fn list_voices(
        &self,
        languages: &[String],
        default_language: &str,
    ) -> Result<Vec<VoiceInfo>> {
        let voices = self.backend.list_voices()?;
        Ok(filter_voices(voices, languages, default_language))
    }
}
