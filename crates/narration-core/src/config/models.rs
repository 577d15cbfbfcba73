use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Flat runtime configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "crate::config::defaults::default_backend_command")]
    pub backend_command: String,
    #[serde(default = "crate::config::defaults::default_backend_args")]
    pub backend_args: Vec<String>,
    /// Seconds to wait for one helper answer before it is restarted.
    #[serde(default = "crate::config::defaults::default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_voice")]
    pub default_voice: String,
    #[serde(default = "crate::config::defaults::default_speed")]
    pub default_speed: f32,
    #[serde(default = "crate::config::defaults::default_language")]
    pub default_language: String,
    #[serde(default = "crate::config::defaults::default_voice_aliases")]
    pub voice_aliases: BTreeMap<String, String>,
    #[serde(default = "crate::config::defaults::default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "crate::config::defaults::default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    #[serde(default)]
    pub probe: ProbeKind,
    #[serde(default = "crate::config::defaults::default_audio_extension")]
    pub audio_extension: String,
    #[serde(default = "crate::config::defaults::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "crate::config::defaults::default_work_dir")]
    pub work_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            backend_command: crate::config::defaults::default_backend_command(),
            backend_args: crate::config::defaults::default_backend_args(),
            backend_timeout_secs: crate::config::defaults::default_backend_timeout_secs(),
            default_voice: crate::config::defaults::default_voice(),
            default_speed: crate::config::defaults::default_speed(),
            default_language: crate::config::defaults::default_language(),
            voice_aliases: crate::config::defaults::default_voice_aliases(),
            max_chunk_chars: crate::config::defaults::default_max_chunk_chars(),
            ffmpeg_bin: crate::config::defaults::default_ffmpeg_bin(),
            probe: ProbeKind::default(),
            audio_extension: crate::config::defaults::default_audio_extension(),
            tick_interval_ms: crate::config::defaults::default_tick_interval_ms(),
            log_level: crate::config::defaults::default_log_level(),
            work_dir: crate::config::defaults::default_work_dir(),
        }
    }
}

impl AppConfig {
    /// Directory for chunk artifacts, manifests and unnamed merged output.
    pub fn resolved_work_dir(&self) -> PathBuf {
        let trimmed = self.work_dir.trim();
        if trimmed.is_empty() {
            std::env::temp_dir().join("faster-reader")
        } else {
            PathBuf::from(trimmed)
        }
    }

    /// Helper answer timeout; `0` is treated as one second.
    pub fn backend_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.backend_timeout_secs.max(1))
    }

    pub fn audio_extension(&self) -> &str {
        let ext = self.audio_extension.trim().trim_start_matches('.');
        if ext.is_empty() { "mp3" } else { ext }
    }
}

/// Which duration probe measures chunk artifacts.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Ffmpeg,
    Rodio,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProbeKind::Ffmpeg => "ffmpeg",
            ProbeKind::Rodio => "rodio",
        };
        write!(f, "{}", label)
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Debug
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
