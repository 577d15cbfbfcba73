//! One narration run: normalize, chunk, synthesize, measure, reconcile, merge.

use crate::artifacts::{TempArtifacts, unique_temp_path};
use crate::cancellation::{Boundary, CancellationToken, Cancelled};
use crate::chunker::split_into_chunks;
use crate::concat::{FfmpegConcat, MergeStrategy, MergeTool, concatenate};
use crate::config::AppConfig;
use crate::error::GenerationError;
use crate::normalizer::TextNormalizer;
use crate::probe::{DurationProbe, chunk_duration, fallback_duration, probe_from_config};
use crate::reconcile::TimelineReconciler;
use crate::synthesis::{CommandBackend, SpeechBackend, Synthesizer, VoiceCatalog};
use crate::timeline::Timeline;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const MIN_REQUEST_SPEED: f32 = 0.5;
pub const MAX_REQUEST_SPEED: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    /// Where to keep the merged audio. `None` writes a temporary file that
    /// is deleted with the [`Generation`].
    pub output_path: Option<PathBuf>,
}

/// The merged audio file of a finished generation.
#[derive(Debug)]
pub struct MergedAudio {
    path: PathBuf,
    temporary: bool,
}

impl MergedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

impl Drop for MergedAudio {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temporary merged audio"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), "Failed to remove merged audio: {err}"),
        }
    }
}

#[derive(Debug)]
pub struct Generation {
    pub audio: MergedAudio,
    pub timeline: Arc<Timeline>,
    /// Normalized text; timeline spans index into it.
    pub display_text: String,
    pub duration_secs: f64,
    pub merge_strategy: MergeStrategy,
}

#[derive(Debug)]
pub enum GenerationOutcome {
    Completed(Generation),
    Cancelled(Cancelled),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_chunk_chars: usize,
    pub work_dir: PathBuf,
    pub audio_extension: String,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_chunk_chars: config.max_chunk_chars,
            work_dir: config.resolved_work_dir(),
            audio_extension: config.audio_extension().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    normalizer: TextNormalizer,
    synthesizer: Synthesizer,
    probe: Arc<dyn DurationProbe>,
    merger: Arc<dyn MergeTool>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        normalizer: TextNormalizer,
        synthesizer: Synthesizer,
        probe: Arc<dyn DurationProbe>,
        merger: Arc<dyn MergeTool>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            normalizer,
            synthesizer,
            probe,
            merger,
            settings,
        }
    }

    /// Wire the helper-process backend, the configured probe and ffmpeg
    /// concat together.
    pub fn from_config(config: &AppConfig, normalizer: TextNormalizer) -> Self {
        let settings = PipelineSettings::from(config);
        let backend: Arc<dyn SpeechBackend> = Arc::new(CommandBackend::new(
            config.backend_command.clone(),
            config.backend_args.clone(),
            settings.work_dir.clone(),
            &settings.audio_extension,
        )
        .with_timeout(config.backend_timeout()));
        let synthesizer = Synthesizer::new(backend, VoiceCatalog::with_overrides(&config.voice_aliases));
        let merger = Arc::new(FfmpegConcat::new(
            config.ffmpeg_bin.clone(),
            settings.work_dir.clone(),
        ));
        Self::new(normalizer, synthesizer, probe_from_config(config), merger, settings)
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// Run one generation. `progress` receives percentages in increasing
    /// order. Cancellation is honored between chunks and before the merge;
    /// every chunk artifact is removed whatever the outcome.
    pub fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        mut progress: impl FnMut(u8),
    ) -> Result<GenerationOutcome, GenerationError> {
        let started = Instant::now();

        if !request.speed.is_finite()
            || !(MIN_REQUEST_SPEED..=MAX_REQUEST_SPEED).contains(&request.speed)
        {
            return Err(GenerationError::validation(format!(
                "Speed must be between {MIN_REQUEST_SPEED} and {MAX_REQUEST_SPEED}, got {}",
                request.speed
            )));
        }
        let voice = self.synthesizer.prepare(&request.voice, request.speed)?;

        let display_text = self.normalizer.normalize(&request.text);
        if display_text.is_empty() {
            return Err(GenerationError::validation(
                "Nothing to read: the text is empty after normalization",
            ));
        }
        progress(5);

        let chunks = split_into_chunks(&display_text, self.settings.max_chunk_chars);
        let total = chunks.len();
        progress(10);
        info!(
            chunks = total,
            chars = display_text.chars().count(),
            voice = %voice.voice,
            rate = %voice.rate,
            "Starting narration generation"
        );

        let mut artifacts = TempArtifacts::new(&self.settings.work_dir, &self.settings.audio_extension);
        let mut reconciler = TimelineReconciler::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            if let Err(cancelled) = cancel.checkpoint(Boundary::BeforeChunk { index: idx }) {
                info!(chunk = idx, total, "Generation cancelled");
                return Ok(GenerationOutcome::Cancelled(cancelled));
            }

            let synthesized = self
                .synthesizer
                .synthesize(&chunk.content, &voice)
                .map_err(|cause| GenerationError::Backend {
                    chunk: idx + 1,
                    total,
                    cause,
                })?;

            let duration = if synthesized.audio.is_empty() {
                fallback_duration(&synthesized.timings)
            } else {
                let path = artifacts.write_chunk(idx, &synthesized.audio).map_err(|err| {
                    GenerationError::Io(std::io::Error::other(format!("{err:#}")))
                })?;
                chunk_duration(self.probe.as_ref(), &path, &synthesized.timings)
            };
            debug!(chunk = idx, duration, words = synthesized.timings.len(), "Chunk synthesized");

            reconciler.push_chunk(&chunk.content, synthesized.timings, duration);
            progress((10 + (idx + 1) * 80 / total) as u8);
        }

        if let Err(cancelled) = cancel.checkpoint(Boundary::BeforeMerge) {
            info!("Generation cancelled before merge");
            return Ok(GenerationOutcome::Cancelled(cancelled));
        }
        progress(95);

        let (path, temporary) = match &request.output_path {
            Some(path) => (path.clone(), false),
            None => (
                unique_temp_path(&self.settings.work_dir, "narration", &self.settings.audio_extension),
                true,
            ),
        };
        let merge_strategy =
            concatenate(self.merger.as_ref(), artifacts.paths(), &path).map_err(GenerationError::Merge)?;
        let audio = MergedAudio { path, temporary };
        drop(artifacts);

        let (timeline, duration_secs) = reconciler.finish();
        progress(100);
        info!(
            words = timeline.len(),
            duration_secs,
            ?merge_strategy,
            output = %audio.path().display(),
            elapsed_ms = started.elapsed().as_millis(),
            "Narration generation finished"
        );

        Ok(GenerationOutcome::Completed(Generation {
            audio,
            timeline: Arc::new(timeline),
            display_text,
            duration_secs,
            merge_strategy,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::synthesis::{BackendRequest, SynthesizedChunk, VoiceInfo};
    use crate::timing::WordTiming;
    use anyhow::{Result, anyhow};
    use std::sync::Mutex;

    /// Word timings for every whitespace-delimited token, 0.3 s apart.
    pub(crate) fn words_in(content: &str) -> Vec<WordTiming> {
        let mut out = Vec::new();
        let mut current: Option<(usize, String)> = None;
        for (char_idx, ch) in content.chars().enumerate() {
            if ch.is_whitespace() {
                if let Some((start, word)) = current.take() {
                    out.push((start, word));
                }
            } else {
                current
                    .get_or_insert_with(|| (char_idx, String::new()))
                    .1
                    .push(ch);
            }
        }
        if let Some(last) = current {
            out.push(last);
        }
        out.into_iter()
            .enumerate()
            .map(|(i, (start, word))| WordTiming {
                word_length: word.chars().count(),
                word,
                start_secs: i as f64 * 0.3,
                duration_secs: 0.25,
                text_offset: start,
            })
            .collect()
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockBackend {
        pub(crate) requests: Arc<Mutex<Vec<BackendRequest>>>,
        pub(crate) fail_on_call: Option<usize>,
        pub(crate) cancel_on_call: Option<(usize, CancellationToken)>,
        pub(crate) delay: Option<std::time::Duration>,
    }

    impl MockBackend {
        pub(crate) fn request_count(&self) -> usize {
            self.requests
                .lock()
                .expect("requests lock should be available")
                .len()
        }
    }

    impl SpeechBackend for MockBackend {
        fn synthesize(&self, request: &BackendRequest) -> Result<SynthesizedChunk> {
            let call = {
                let mut requests = self
                    .requests
                    .lock()
                    .expect("requests lock should be available");
                requests.push(request.clone());
                requests.len()
            };
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if let Some((at, token)) = &self.cancel_on_call {
                if *at == call {
                    token.cancel();
                }
            }
            if self.fail_on_call == Some(call) {
                return Err(anyhow!("simulated backend outage"));
            }
            Ok(SynthesizedChunk {
                audio: format!("[audio {call}]").into_bytes(),
                timings: words_in(&request.text),
            })
        }

        fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
            Ok(Vec::new())
        }
    }

    /// Every artifact lasts exactly two seconds.
    pub(crate) struct TwoSecondProbe;

    impl DurationProbe for TwoSecondProbe {
        fn probe(&self, path: &Path) -> Result<f64> {
            if path.exists() {
                Ok(2.0)
            } else {
                Err(anyhow!("missing artifact"))
            }
        }
    }

    /// Concatenates in-process so tests never need ffmpeg.
    pub(crate) struct InProcessMerge;

    impl MergeTool for InProcessMerge {
        fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            let mut merged = Vec::new();
            for input in inputs {
                merged.extend(fs::read(input)?);
            }
            fs::write(output, merged)?;
            Ok(())
        }
    }

    pub(crate) fn scratch_dir(tag: &str) -> PathBuf {
        unique_temp_path(&std::env::temp_dir(), tag, "")
    }

    pub(crate) fn pipeline_with(backend: MockBackend, work_dir: &Path, max_chunk_chars: usize) -> Pipeline {
        let synthesizer = Synthesizer::new(Arc::new(backend), VoiceCatalog::default());
        Pipeline::new(
            TextNormalizer::default(),
            synthesizer,
            Arc::new(TwoSecondProbe),
            Arc::new(InProcessMerge),
            PipelineSettings {
                max_chunk_chars,
                work_dir: work_dir.to_path_buf(),
                audio_extension: "mp3".to_string(),
            },
        )
    }

    pub(crate) fn request(text: &str) -> GenerationRequest {
        GenerationRequest {
            text: text.to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            output_path: None,
        }
    }

    const THREE_PARAGRAPHS: &str = "# Opening\n\nThe **first** paragraph speaks.\n\nA second one with [a link](https://example.com).\n\nThe naïve ending.";

    fn dir_is_empty(dir: &Path) -> bool {
        fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    fn substring(text: &str, offset: usize, length: usize) -> String {
        text.chars().skip(offset).take(length).collect()
    }

    #[test]
    fn completed_generation_merges_chunks_and_aligns_words() {
        let work_dir = scratch_dir("pipeline-complete");
        let backend = MockBackend::default();
        let pipeline = pipeline_with(backend.clone(), &work_dir, 40);
        let output = work_dir.join("out").join("narration.mp3");
        let mut req = request(THREE_PARAGRAPHS);
        req.output_path = Some(output.clone());

        let mut seen = Vec::new();
        let outcome = pipeline
            .run(&req, &CancellationToken::new(), |p| seen.push(p))
            .expect("generation should succeed");
        let GenerationOutcome::Completed(generation) = outcome else {
            panic!("generation should complete");
        };

        let calls = backend.request_count();
        assert!(calls >= 3, "small chunk limit splits the text");
        assert_eq!(generation.duration_secs, 2.0 * calls as f64);
        assert_eq!(generation.merge_strategy, MergeStrategy::Preferred);
        assert!(!generation.audio.is_temporary());
        let merged = fs::read(&output).expect("merged audio exists");
        assert!(merged.starts_with(b"[audio 1]"));

        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.get(1), Some(&10));
        assert_eq!(&seen[seen.len() - 2..], &[95, 100]);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));

        assert!(generation.display_text.starts_with("Title — Opening"));
        for word in generation.timeline.words() {
            assert_eq!(
                substring(&generation.display_text, word.text_offset, word.word_length),
                word.word
            );
        }

        let leftovers = fs::read_dir(&work_dir)
            .expect("work dir exists")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .count();
        assert_eq!(leftovers, 0, "chunk artifacts are removed");
        let _ = fs::remove_dir_all(work_dir);
    }

    #[test]
    fn progress_for_three_chunks() {
        let work_dir = scratch_dir("pipeline-progress");
        let pipeline = pipeline_with(MockBackend::default(), &work_dir, 5);
        let mut seen = Vec::new();
        pipeline
            .run(&request("one\n\ntwo\n\nthree"), &CancellationToken::new(), |p| {
                seen.push(p)
            })
            .expect("generation should succeed");
        assert_eq!(seen, vec![5, 10, 36, 63, 90, 95, 100]);
        let _ = fs::remove_dir_all(work_dir);
    }

    #[test]
    fn temporary_output_is_removed_with_the_generation() {
        let work_dir = scratch_dir("pipeline-temporary");
        let pipeline = pipeline_with(MockBackend::default(), &work_dir, 2000);
        let outcome = pipeline
            .run(&request("Just one chunk."), &CancellationToken::new(), |_| {})
            .expect("generation should succeed");
        let GenerationOutcome::Completed(generation) = outcome else {
            panic!("generation should complete");
        };
        let path = generation.audio.path().to_path_buf();
        assert!(generation.audio.is_temporary());
        assert!(path.exists());
        drop(generation);
        assert!(!path.exists());
        let _ = fs::remove_dir_all(work_dir);
    }

    #[test]
    fn cancel_after_first_of_three_chunks_leaves_nothing_behind() {
        let work_dir = scratch_dir("pipeline-cancel");
        let token = CancellationToken::new();
        let backend = MockBackend {
            cancel_on_call: Some((1, token.clone())),
            ..MockBackend::default()
        };
        let pipeline = pipeline_with(backend.clone(), &work_dir, 5);
        let output = work_dir.join("never.mp3");
        let mut req = request("one\n\ntwo\n\nthree");
        req.output_path = Some(output.clone());

        let mut seen = Vec::new();
        let outcome = pipeline
            .run(&req, &token, |p| seen.push(p))
            .expect("cancellation is not an error");

        match outcome {
            GenerationOutcome::Cancelled(cancelled) => {
                assert_eq!(cancelled.boundary, Boundary::BeforeChunk { index: 1 })
            }
            GenerationOutcome::Completed(_) => panic!("generation should be cancelled"),
        }
        assert_eq!(backend.request_count(), 1);
        assert!(!output.exists());
        assert!(dir_is_empty(&work_dir));
        assert!(!seen.contains(&100));
        let _ = fs::remove_dir_all(work_dir);
    }

    #[test]
    fn backend_failure_is_fatal_and_cleans_up() {
        let work_dir = scratch_dir("pipeline-backend-failure");
        let backend = MockBackend {
            fail_on_call: Some(2),
            ..MockBackend::default()
        };
        let pipeline = pipeline_with(backend, &work_dir, 5);
        let output = work_dir.join("never.mp3");
        let mut req = request("one\n\ntwo\n\nthree");
        req.output_path = Some(output.clone());

        let err = pipeline
            .run(&req, &CancellationToken::new(), |_| {})
            .expect_err("backend failure aborts the run");
        match &err {
            GenerationError::Backend { chunk, total, .. } => {
                assert_eq!((*chunk, *total), (2, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("simulated backend outage"));
        assert!(!output.exists());
        assert!(dir_is_empty(&work_dir));
        let _ = fs::remove_dir_all(work_dir);
    }

    #[test]
    fn invalid_requests_fail_before_the_backend() {
        let work_dir = scratch_dir("pipeline-validation");
        let backend = MockBackend::default();
        let pipeline = pipeline_with(backend.clone(), &work_dir, 2000);

        for speed in [0.3, 2.5] {
            let mut req = request("Hello");
            req.speed = speed;
            let err = pipeline
                .run(&req, &CancellationToken::new(), |_| {})
                .expect_err("speed is out of range");
            assert!(err.is_validation());
        }
        for text in ["", "   \n\n ", "🎉 👋"] {
            let err = pipeline
                .run(&request(text), &CancellationToken::new(), |_| {})
                .expect_err("nothing speakable");
            assert!(err.is_validation(), "{text:?}");
        }
        assert_eq!(backend.request_count(), 0);
        assert!(dir_is_empty(&work_dir));
    }

    #[test]
    fn cancelled_before_start_never_calls_the_backend() {
        let work_dir = scratch_dir("pipeline-precancelled");
        let backend = MockBackend::default();
        let pipeline = pipeline_with(backend.clone(), &work_dir, 2000);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = pipeline
            .run(&request("Hello there"), &token, |_| {})
            .expect("cancellation is not an error");
        assert!(matches!(outcome, GenerationOutcome::Cancelled(_)));
        assert_eq!(backend.request_count(), 0);
    }
}
