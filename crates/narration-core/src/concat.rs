//! Joining chunk artifacts into one playable file.

use crate::artifacts::{ensure_dir, unique_temp_path};
use anyhow::{Context, Result, anyhow};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub trait MergeTool: Send + Sync {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// How the merged file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Preferred,
    ByteAppend,
}

/// Stream-copies inputs with ffmpeg's concat demuxer.
#[derive(Debug, Clone)]
pub struct FfmpegConcat {
    ffmpeg_bin: String,
    manifest_dir: PathBuf,
}

impl FfmpegConcat {
    pub fn new(ffmpeg_bin: impl Into<String>, manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            manifest_dir: manifest_dir.into(),
        }
    }

    fn run(&self, manifest: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.ffmpeg_bin)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-c", "copy", "-y"])
            .arg(output)
            .output()
            .with_context(|| format!("failed to run {}", self.ffmpeg_bin))?;
        if !result.status.success() {
            return Err(anyhow!(
                String::from_utf8_lossy(&result.stderr).trim().to_string()
            ));
        }
        Ok(())
    }
}

impl MergeTool for FfmpegConcat {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        ensure_dir(&self.manifest_dir)?;
        let manifest = unique_temp_path(&self.manifest_dir, "concat", "txt");
        let mut listing = String::new();
        for input in inputs {
            listing.push_str(&manifest_line(input)?);
            listing.push('\n');
        }

        let result = fs::write(&manifest, listing)
            .with_context(|| format!("writing concat manifest {}", manifest.display()))
            .and_then(|()| self.run(&manifest, output));
        let _ = fs::remove_file(&manifest);
        result
    }
}

/// `file '<absolute path>'`, with `/` separators and quotes escaped for the
/// concat demuxer.
pub fn manifest_line(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("resolving {}", path.display()))?;
    let normalized = absolute.to_string_lossy().replace('\\', "/");
    Ok(format!("file '{}'", normalized.replace('\'', r"'\''")))
}

/// Append the raw bytes of every input to `output`. Returns the bytes written.
pub fn byte_append(inputs: &[PathBuf], output: &Path) -> Result<u64> {
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;
    for input in inputs {
        let mut reader =
            File::open(input).with_context(|| format!("opening {}", input.display()))?;
        written += io::copy(&mut reader, &mut writer)
            .with_context(|| format!("appending {}", input.display()))?;
    }
    writer.flush().context("flushing merged audio")?;
    Ok(written)
}

/// Merge with `tool`, falling back to byte append. When both fail, any
/// partial output is removed and the last error is returned.
pub fn concatenate(tool: &dyn MergeTool, inputs: &[PathBuf], output: &Path) -> Result<MergeStrategy> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    if !inputs.is_empty() {
        match tool.merge(inputs, output) {
            Ok(()) => {
                info!(inputs = inputs.len(), output = %output.display(), "Merged audio chunks");
                return Ok(MergeStrategy::Preferred);
            }
            Err(err) => warn!("Merge tool failed, appending bytes instead: {err:#}"),
        }
    }

    match byte_append(inputs, output) {
        Ok(bytes) => {
            debug!(inputs = inputs.len(), bytes, output = %output.display(), "Byte-appended audio chunks");
            Ok(MergeStrategy::ByteAppend)
        }
        Err(err) => {
            let _ = fs::remove_file(output);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct FailingTool {
        calls: Arc<Mutex<usize>>,
    }

    impl MergeTool for FailingTool {
        fn merge(&self, _inputs: &[PathBuf], output: &Path) -> Result<()> {
            *self.calls.lock().expect("calls lock") += 1;
            fs::write(output, b"partial").expect("write partial output");
            Err(anyhow!("tool exploded"))
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = unique_temp_path(&std::env::temp_dir(), tag, "");
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn write_inputs(dir: &Path, contents: &[&[u8]]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                let path = dir.join(format!("part{i}.mp3"));
                fs::write(&path, bytes).expect("write input");
                path
            })
            .collect()
    }

    #[test]
    fn byte_append_output_is_the_sum_of_inputs() {
        let dir = scratch_dir("concat-append");
        let inputs = write_inputs(&dir, &[b"ID3aaaa", b"bbbbbbbbb", b"cc"]);
        let output = dir.join("merged.mp3");

        let written = byte_append(&inputs, &output).expect("append succeeds");
        assert_eq!(written, 18);
        assert_eq!(fs::read(&output).expect("read merged"), b"ID3aaaabbbbbbbbbcc");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn failing_tool_falls_back_to_byte_append() {
        let dir = scratch_dir("concat-fallback");
        let inputs = write_inputs(&dir, &[b"one", b"two", b"three"]);
        let output = dir.join("merged.mp3");
        let calls = Arc::new(Mutex::new(0));
        let tool = FailingTool {
            calls: calls.clone(),
        };

        let strategy = concatenate(&tool, &inputs, &output).expect("fallback succeeds");
        assert_eq!(strategy, MergeStrategy::ByteAppend);
        assert_eq!(*calls.lock().expect("calls lock"), 1);
        assert_eq!(fs::read(&output).expect("read merged"), b"onetwothree");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_ffmpeg_still_produces_output() {
        let dir = scratch_dir("concat-no-ffmpeg");
        let inputs = write_inputs(&dir, &[b"ab", b"cd"]);
        let output = dir.join("out").join("merged.mp3");
        let tool = FfmpegConcat::new("definitely-not-ffmpeg", &dir);

        let strategy = concatenate(&tool, &inputs, &output).expect("fallback succeeds");
        assert_eq!(strategy, MergeStrategy::ByteAppend);
        assert_eq!(fs::read(&output).expect("read merged"), b"abcd");
        let leftover_manifests = fs::read_dir(&dir)
            .expect("list scratch dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "txt"))
            .count();
        assert_eq!(leftover_manifests, 0);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn total_failure_removes_partial_output() {
        let dir = scratch_dir("concat-total-failure");
        let mut inputs = write_inputs(&dir, &[b"real"]);
        inputs.push(dir.join("vanished.mp3"));
        let output = dir.join("merged.mp3");
        let tool = FailingTool {
            calls: Arc::new(Mutex::new(0)),
        };

        assert!(concatenate(&tool, &inputs, &output).is_err());
        assert!(!output.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn manifest_lines_are_absolute_and_escaped() {
        let line = manifest_line(Path::new("/tmp/it's here.mp3")).expect("absolute path");
        assert_eq!(line, r"file '/tmp/it'\''s here.mp3'");
        let relative = manifest_line(Path::new("chunk.mp3")).expect("relative path");
        assert!(relative.starts_with("file '/") || relative.contains(":/"));
    }
}
