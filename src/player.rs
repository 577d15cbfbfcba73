//! Audio playback of a finished generation with a terminal teleprompter.

use anyhow::{Context, Result};
use narration_core::cancellation::CancellationToken;
use narration_core::{Generation, Highlighter, TeleprompterSync, WordSpan};
use rodio::{Decoder, OutputStream, Sample, Sink, Source};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chars of context shown on each side of the active word.
const CONTEXT_CHARS: usize = 32;

/// Audio position derived from the samples the sink has pulled.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    played: Arc<AtomicU64>,
    samples_per_sec: u64,
}

impl PlaybackClock {
    pub fn position(&self) -> Duration {
        let played = self.played.load(Ordering::Relaxed);
        Duration::from_secs_f64(played as f64 / self.samples_per_sec as f64)
    }
}

/// Source wrapper counting every sample handed to the output.
struct PlayedSamples<S> {
    inner: S,
    played: Arc<AtomicU64>,
}

impl<S> PlayedSamples<S>
where
    S: Source,
    S::Item: Sample,
{
    fn new(inner: S) -> Self {
        Self {
            inner,
            played: Arc::new(AtomicU64::new(0)),
        }
    }

    fn clock(&self) -> PlaybackClock {
        let samples_per_sec =
            u64::from(self.inner.sample_rate()) * u64::from(self.inner.channels());
        PlaybackClock {
            played: Arc::clone(&self.played),
            samples_per_sec: samples_per_sec.max(1),
        }
    }
}

impl<S> Iterator for PlayedSamples<S>
where
    S: Source,
    S::Item: Sample,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.inner.next()?;
        self.played.fetch_add(1, Ordering::Relaxed);
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for PlayedSamples<S>
where
    S: Source,
    S::Item: Sample,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

pub struct NarrationPlayback {
    /// Keeps the output device open; `None` for a sink with no device.
    _stream: Option<OutputStream>,
    sink: Sink,
    clock: PlaybackClock,
}

impl NarrationPlayback {
    pub fn open(path: &Path) -> Result<Self> {
        let (_stream, handle) = OutputStream::try_default().context("Opening audio output")?;
        let sink = Sink::try_new(&handle).context("Creating sink")?;
        let file = File::open(path).with_context(|| format!("Opening {}", path.display()))?;
        let source = Decoder::new(BufReader::new(file))
            .with_context(|| format!("Decoding {}", path.display()))?;
        let source = PlayedSamples::new(source);
        let clock = source.clock();
        sink.append(source);
        sink.play();
        info!(path = %path.display(), "Starting narration playback");
        Ok(Self {
            _stream: Some(_stream),
            sink,
            clock,
        })
    }

    /// How far into the audio the output has consumed samples. Stalls and
    /// underruns do not advance it.
    pub fn position(&self) -> Duration {
        self.clock.position()
    }

    pub fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    pub fn stop(self) {
        debug!("Stopping playback");
        self.sink.stop();
    }
}

/// Prints the active word in reverse video with some surrounding text.
pub struct TerminalHighlighter<W: Write> {
    text: Vec<char>,
    out: W,
}

impl<W: Write> TerminalHighlighter<W> {
    pub fn new(display_text: &str, out: W) -> Self {
        Self {
            text: display_text.chars().collect(),
            out,
        }
    }

    fn slice(&self, from: usize, to: usize) -> String {
        let to = to.min(self.text.len());
        let from = from.min(to);
        self.text[from..to]
            .iter()
            .map(|ch| if ch.is_whitespace() { ' ' } else { *ch })
            .collect()
    }

    fn write_line(&mut self, line: &str) {
        if let Err(err) = write!(self.out, "\r\x1b[2K{line}").and_then(|()| self.out.flush()) {
            warn!("Failed to draw teleprompter line: {err}");
        }
    }

    pub fn finish(&mut self) {
        self.write_line("\n");
    }
}

impl<W: Write> Highlighter for TerminalHighlighter<W> {
    fn clear(&mut self, _span: WordSpan) {
        self.write_line("");
    }

    fn apply(&mut self, span: WordSpan) {
        let before = self.slice(span.offset.saturating_sub(CONTEXT_CHARS), span.offset);
        let word = self.slice(span.offset, span.end());
        let after = self.slice(span.end(), span.end() + CONTEXT_CHARS);
        self.write_line(&format!("{before}\x1b[7m{word}\x1b[0m{after}"));
    }
}

/// Play the merged audio and follow it on the terminal until it ends or
/// `stop` is cancelled.
pub fn play_with_teleprompter(
    generation: Arc<Generation>,
    tick: Duration,
    stop: &CancellationToken,
) -> Result<()> {
    let playback = NarrationPlayback::open(generation.audio.path())?;
    let mut sync = TeleprompterSync::new(Arc::clone(&generation.timeline));
    let mut highlighter = TerminalHighlighter::new(&generation.display_text, std::io::stdout());

    while !playback.is_finished() && !stop.is_cancelled() {
        sync.update(playback.position().as_secs_f64(), &mut highlighter);
        thread::sleep(tick);
    }

    sync.reset(&mut highlighter);
    highlighter.finish();
    info!(
        position_secs = playback.position().as_secs_f64(),
        interrupted = stop.is_cancelled(),
        "Narration playback ended"
    );
    playback.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::source::SineWave;

    fn rendered(highlighter: &TerminalHighlighter<Vec<u8>>) -> String {
        String::from_utf8_lossy(&highlighter.out).into_owned()
    }

    #[test]
    fn highlights_the_active_word_with_context() {
        let mut highlighter = TerminalHighlighter::new("Title — Über\n\nnaïve words", Vec::new());
        highlighter.apply(WordSpan {
            offset: 14,
            length: 5,
        });
        let out = rendered(&highlighter);
        assert!(out.ends_with("Title — Über  \x1b[7mnaïve\x1b[0m words"));
    }

    #[test]
    fn clearing_blanks_the_line() {
        let mut highlighter = TerminalHighlighter::new("one two", Vec::new());
        highlighter.apply(WordSpan {
            offset: 4,
            length: 3,
        });
        highlighter.clear(WordSpan {
            offset: 4,
            length: 3,
        });
        assert!(rendered(&highlighter).ends_with("\r\x1b[2K"));
    }

    #[test]
    fn finish_clears_and_ends_the_line() {
        let mut highlighter = TerminalHighlighter::new("one", Vec::new());
        highlighter.apply(WordSpan {
            offset: 0,
            length: 3,
        });
        highlighter.finish();
        assert!(rendered(&highlighter).ends_with("\r\x1b[2K\n"));
    }

    struct BrokenTerminal;

    impl Write for BrokenTerminal {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_do_not_interrupt_playback() {
        let mut highlighter = TerminalHighlighter::new("one", BrokenTerminal);
        highlighter.apply(WordSpan {
            offset: 0,
            length: 3,
        });
        highlighter.finish();
    }

    #[test]
    fn position_counts_consumed_samples() {
        let mut source = PlayedSamples::new(SineWave::new(440.0));
        let clock = source.clock();
        assert_eq!((&mut source).take(4_800).count(), 4_800);
        // SineWave is 48 kHz mono.
        assert_eq!(clock.position(), Duration::from_millis(100));
    }

    #[test]
    fn stalled_output_does_not_advance_the_position() {
        let (sink, _queue) = Sink::new_idle();
        let source = PlayedSamples::new(SineWave::new(440.0).take_duration(Duration::from_secs(5)));
        let clock = source.clock();
        sink.append(source);
        let playback = NarrationPlayback {
            _stream: None,
            sink,
            clock,
        };
        thread::sleep(Duration::from_millis(60));
        // Nothing pulled samples from the queue, so nothing was heard yet.
        assert_eq!(playback.position(), Duration::ZERO);
        assert!(!playback.is_finished());
    }

    #[test]
    fn spans_past_the_end_are_clamped() {
        let mut highlighter = TerminalHighlighter::new("short", Vec::new());
        highlighter.apply(WordSpan {
            offset: 3,
            length: 10,
        });
        assert!(rendered(&highlighter).contains("\x1b[7mrt\x1b[0m"));
    }
}
