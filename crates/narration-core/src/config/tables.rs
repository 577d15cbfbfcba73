use super::defaults;
use super::models::{AppConfig, LogLevel, ProbeKind};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Sectioned on-disk layout of `conf/config.toml`.
#[derive(Debug, Clone, Deserialize, serde::Serialize, Default)]
pub(super) struct ConfigTables {
    #[serde(default)]
    synthesis: SynthesisConfig,
    #[serde(default)]
    chunking: ChunkingConfig,
    #[serde(default)]
    audio: AudioConfig,
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    paths: PathsConfig,
}

pub(super) const TABLE_NAMES: [&str; 6] =
    ["synthesis", "chunking", "audio", "playback", "logging", "paths"];

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            backend_command: tables.synthesis.backend_command,
            backend_args: tables.synthesis.backend_args,
            backend_timeout_secs: tables.synthesis.backend_timeout_secs,
            default_voice: tables.synthesis.default_voice,
            default_speed: tables.synthesis.default_speed,
            default_language: tables.synthesis.default_language,
            voice_aliases: tables.synthesis.voice_aliases,
            max_chunk_chars: tables.chunking.max_chunk_chars,
            ffmpeg_bin: tables.audio.ffmpeg_bin,
            probe: tables.audio.probe,
            audio_extension: tables.audio.audio_extension,
            tick_interval_ms: tables.playback.tick_interval_ms,
            log_level: tables.logging.log_level,
            work_dir: tables.paths.work_dir,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            synthesis: SynthesisConfig {
                backend_command: config.backend_command.clone(),
                backend_args: config.backend_args.clone(),
                backend_timeout_secs: config.backend_timeout_secs,
                default_voice: config.default_voice.clone(),
                default_speed: config.default_speed,
                default_language: config.default_language.clone(),
                voice_aliases: config.voice_aliases.clone(),
            },
            chunking: ChunkingConfig {
                max_chunk_chars: config.max_chunk_chars,
            },
            audio: AudioConfig {
                ffmpeg_bin: config.ffmpeg_bin.clone(),
                probe: config.probe,
                audio_extension: config.audio_extension.clone(),
            },
            playback: PlaybackConfig {
                tick_interval_ms: config.tick_interval_ms,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
            paths: PathsConfig {
                work_dir: config.work_dir.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct SynthesisConfig {
    #[serde(default = "defaults::default_backend_command")]
    backend_command: String,
    #[serde(default = "defaults::default_backend_args")]
    backend_args: Vec<String>,
    #[serde(default = "defaults::default_backend_timeout_secs")]
    backend_timeout_secs: u64,
    #[serde(default = "defaults::default_voice")]
    default_voice: String,
    #[serde(default = "defaults::default_speed")]
    default_speed: f32,
    #[serde(default = "defaults::default_language")]
    default_language: String,
    #[serde(default = "defaults::default_voice_aliases")]
    voice_aliases: BTreeMap<String, String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        SynthesisConfig {
            backend_command: defaults::default_backend_command(),
            backend_args: defaults::default_backend_args(),
            backend_timeout_secs: defaults::default_backend_timeout_secs(),
            default_voice: defaults::default_voice(),
            default_speed: defaults::default_speed(),
            default_language: defaults::default_language(),
            voice_aliases: defaults::default_voice_aliases(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct ChunkingConfig {
    #[serde(default = "defaults::default_max_chunk_chars")]
    max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            max_chunk_chars: defaults::default_max_chunk_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct AudioConfig {
    #[serde(default = "defaults::default_ffmpeg_bin")]
    ffmpeg_bin: String,
    #[serde(default)]
    probe: ProbeKind,
    #[serde(default = "defaults::default_audio_extension")]
    audio_extension: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            ffmpeg_bin: defaults::default_ffmpeg_bin(),
            probe: ProbeKind::default(),
            audio_extension: defaults::default_audio_extension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct PlaybackConfig {
    #[serde(default = "defaults::default_tick_interval_ms")]
    tick_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            tick_interval_ms: defaults::default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct PathsConfig {
    #[serde(default = "defaults::default_work_dir")]
    work_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            work_dir: defaults::default_work_dir(),
        }
    }
}
