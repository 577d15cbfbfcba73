//! Temporary chunk files and their cleanup.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// A fresh path inside `dir`; unique across threads and processes.
pub fn unique_temp_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nonce = SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let pid = std::process::id();
    let ext = extension.trim_start_matches('.');
    let name = if ext.is_empty() {
        format!("{prefix}-{pid}-{ts_nanos}-{nonce}")
    } else {
        format!("{prefix}-{pid}-{ts_nanos}-{nonce}.{ext}")
    };
    dir.join(name)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("creating directory {}", path.display()))
}

/// Deletes every tracked file when dropped, whatever the outcome of the run.
#[derive(Debug)]
pub struct TempArtifacts {
    dir: PathBuf,
    extension: String,
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
            paths: Vec::new(),
        }
    }

    /// Write one chunk's audio to a new tracked file.
    pub fn write_chunk(&mut self, index: usize, audio: &[u8]) -> Result<PathBuf> {
        ensure_dir(&self.dir)?;
        let path = unique_temp_path(&self.dir, &format!("chunk{index:04}"), &self.extension);
        // Track first so a failed write still gets cleaned up.
        self.paths.push(path.clone());
        fs::write(&path, audio)
            .with_context(|| format!("writing chunk audio to {}", path.display()))?;
        debug!(index, bytes = audio.len(), path = %path.display(), "Wrote chunk artifact");
        Ok(path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), "Failed to remove chunk artifact: {err}"),
            }
        }
    }
}
