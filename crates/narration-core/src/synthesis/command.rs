//! Speech backend hosted in a helper process.
//!
//! The helper reads one JSON request per line on stdin and answers with one
//! JSON line on stdout:
//!
//! - `{"text","voice","rate","path"}` synthesizes into `path` and answers
//!   `{"ok","error","boundaries":[..]}` with offsets and durations in 100 ns
//!   ticks;
//! - `{"list_voices":true}` answers `{"ok","voices":[..]}`;
//! - `{"shutdown":true}` stops the helper.
//!
//! A helper that does not answer within the configured timeout is killed and
//! started again on the next request.

use super::{BackendRequest, SpeechBackend, SynthesizedChunk, VoiceInfo};
use crate::artifacts::{ensure_dir, unique_temp_path};
use crate::timing::WordTiming;
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const TICKS_PER_SECOND: f64 = 10_000_000.0;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize, Default)]
struct WorkerRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    list_voices: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shutdown: Option<bool>,
}

#[derive(Deserialize)]
struct WorkerResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    boundaries: Vec<WireBoundary>,
    #[serde(default)]
    voices: Vec<VoiceInfo>,
}

#[derive(Deserialize)]
struct WireBoundary {
    text: String,
    offset: f64,
    duration: f64,
    text_offset: usize,
    word_length: usize,
}

impl From<WireBoundary> for WordTiming {
    fn from(boundary: WireBoundary) -> Self {
        WordTiming {
            word: boundary.text,
            start_secs: boundary.offset / TICKS_PER_SECOND,
            duration_secs: boundary.duration / TICKS_PER_SECOND,
            text_offset: boundary.text_offset,
            word_length: boundary.word_length,
        }
    }
}

struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    /// Lines read from the helper's stdout on a reader thread.
    lines: Receiver<std::io::Result<String>>,
}

impl WorkerProcess {
    fn exchange(&mut self, payload: &str, timeout: Duration) -> std::io::Result<String> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::from(ErrorKind::BrokenPipe))?;
        stdin.write_all(payload.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;

        match self.lines.recv_timeout(timeout) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => Err(std::io::Error::new(
                ErrorKind::TimedOut,
                format!(
                    "speech helper did not answer within {:.1}s",
                    timeout.as_secs_f64()
                ),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "speech helper closed its output",
            )),
        }
    }
}

fn forward_lines(stdout: ChildStdout, lines: Sender<std::io::Result<String>>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if lines.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = lines.send(Err(err));
                break;
            }
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Ok(payload) = serde_json::to_string(&WorkerRequest {
                shutdown: Some(true),
                ..WorkerRequest::default()
            }) {
                let _ = writeln!(stdin, "{payload}");
                let _ = stdin.flush();
            }
        }
        for _ in 0..20 {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(Duration::from_millis(25)),
                Err(_) => break,
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// [`SpeechBackend`] that drives a helper process over JSON lines. The
/// helper is spawned on first use and respawned once if its pipe breaks.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    audio_extension: String,
    timeout: Duration,
    process: Mutex<Option<WorkerProcess>>,
}

impl CommandBackend {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        work_dir: impl Into<PathBuf>,
        audio_extension: &str,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            audio_extension: audio_extension.trim_start_matches('.').to_string(),
            timeout: DEFAULT_TIMEOUT,
            process: Mutex::new(None),
        }
    }

    /// How long one request may wait for the helper's answer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<WorkerProcess> {
        info!(program = %self.program, args = ?self.args, "Starting speech helper");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start speech helper `{}`", self.program))?;
        let stdin = child.stdin.take().context("speech helper has no stdin")?;
        let stdout = child.stdout.take().context("speech helper has no stdout")?;
        let (lines_tx, lines) = mpsc::channel();
        if let Err(err) = thread::Builder::new()
            .name("speech-helper-stdout".to_string())
            .spawn(move || forward_lines(stdout, lines_tx))
        {
            let _ = child.kill();
            let _ = child.wait();
            return Err(err).context("starting speech helper reader");
        }
        Ok(WorkerProcess {
            child,
            stdin: Some(stdin),
            lines,
        })
    }

    fn roundtrip(&self, request: &WorkerRequest<'_>) -> Result<WorkerResponse> {
        let payload = serde_json::to_string(request).context("encoding helper request")?;
        let mut guard = self
            .process
            .lock()
            .map_err(|_| anyhow!("speech helper lock poisoned"))?;

        let mut attempt = 0;
        let line = loop {
            if guard.is_none() {
                *guard = Some(self.spawn()?);
            }
            let Some(worker) = guard.as_mut() else {
                bail!("speech helper is not running");
            };
            match worker.exchange(&payload, self.timeout) {
                Ok(line) => break line,
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    warn!(program = %self.program, "Speech helper timed out, stopping it: {err}");
                    *guard = None;
                    return Err(err).context("speech helper stopped responding");
                }
                Err(err) if attempt == 0 => {
                    warn!("Speech helper pipe failed, respawning: {err}");
                    *guard = None;
                    attempt += 1;
                }
                Err(err) => {
                    *guard = None;
                    return Err(err).context("speech helper stopped responding");
                }
            }
        };

        let response: WorkerResponse = serde_json::from_str(line.trim())
            .with_context(|| format!("invalid helper response: {}", line.trim()))?;
        if !response.ok {
            bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| "speech helper reported a failure".to_string())
            );
        }
        Ok(response)
    }
}

impl SpeechBackend for CommandBackend {
    fn synthesize(&self, request: &BackendRequest) -> Result<SynthesizedChunk> {
        ensure_dir(&self.work_dir)?;
        let path = unique_temp_path(&self.work_dir, "helper", &self.audio_extension);
        let response = self.roundtrip(&WorkerRequest {
            text: Some(&request.text),
            voice: Some(&request.voice),
            rate: Some(&request.rate),
            path: Some(path.to_string_lossy().into_owned()),
            ..WorkerRequest::default()
        });
        let result = response.and_then(|response| {
            let audio =
                fs::read(&path).with_context(|| format!("reading helper audio {}", path.display()))?;
            let timings = response
                .boundaries
                .into_iter()
                .map(WordTiming::from)
                .collect::<Vec<_>>();
            Ok(SynthesizedChunk { audio, timings })
        });
        let _ = fs::remove_file(&path);

        let chunk = result?;
        debug!(
            bytes = chunk.audio.len(),
            words = chunk.timings.len(),
            "Helper synthesized chunk"
        );
        Ok(chunk)
    }

    fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let response = self.roundtrip(&WorkerRequest {
            list_voices: Some(true),
            ..WorkerRequest::default()
        })?;
        Ok(response.voices)
    }
}
