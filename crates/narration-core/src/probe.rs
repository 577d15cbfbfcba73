//! Audio duration measurement with a timing-based fallback.

use crate::config::{AppConfig, ProbeKind};
use crate::timing::WordTiming;
use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

/// Padding added after the last spoken word when the probe gives nothing.
pub const FALLBACK_TAIL_SECS: f64 = 0.5;

static RE_FFMPEG_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2}\.\d+)").unwrap());

pub trait DurationProbe: Send + Sync {
    /// Duration of the audio file at `path`, in seconds.
    fn probe(&self, path: &Path) -> Result<f64>;
}

/// Reads the `Duration:` line ffmpeg prints for its input.
#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    ffmpeg_bin: String,
}

impl FfmpegProbe {
    pub fn new(ffmpeg_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }
}

impl DurationProbe for FfmpegProbe {
    fn probe(&self, path: &Path) -> Result<f64> {
        // ffmpeg exits non-zero without an output file; only stderr matters.
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .output()
            .with_context(|| format!("failed to run {}", self.ffmpeg_bin))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_ffmpeg_duration(&stderr)
            .ok_or_else(|| anyhow!("no duration reported for {}", path.display()))
    }
}

pub fn parse_ffmpeg_duration(stderr: &str) -> Option<f64> {
    let caps = RE_FFMPEG_DURATION.captures(stderr)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Decodes the container header with rodio.
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioProbe;

impl DurationProbe for RodioProbe {
    fn probe(&self, path: &Path) -> Result<f64> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("decoding {}", path.display()))?;
        decoder
            .total_duration()
            .map(|d| d.as_secs_f64())
            .ok_or_else(|| anyhow!("decoder reports no total duration for {}", path.display()))
    }
}

pub fn probe_from_config(config: &AppConfig) -> Arc<dyn DurationProbe> {
    match config.probe {
        ProbeKind::Ffmpeg => Arc::new(FfmpegProbe::new(config.ffmpeg_bin.clone())),
        ProbeKind::Rodio => Arc::new(RodioProbe),
    }
}

/// Audio length of one chunk: the probe's answer when positive, otherwise
/// the end of the last word plus [`FALLBACK_TAIL_SECS`], otherwise `0.0`.
pub fn chunk_duration(probe: &dyn DurationProbe, path: &Path, timings: &[WordTiming]) -> f64 {
    match probe.probe(path) {
        Ok(secs) if secs.is_finite() && secs > 0.0 => return secs,
        Ok(secs) => debug!(path = %path.display(), secs, "Probe returned no usable duration"),
        Err(err) => debug!(path = %path.display(), "Duration probe failed: {err:#}"),
    }
    fallback_duration(timings)
}

/// Estimate from word timings alone: end of the last word plus
/// [`FALLBACK_TAIL_SECS`], or `0.0` without any words.
pub fn fallback_duration(timings: &[WordTiming]) -> f64 {
    timings
        .last()
        .map(|last| last.end_secs() + FALLBACK_TAIL_SECS)
        .unwrap_or(0.0)
}
