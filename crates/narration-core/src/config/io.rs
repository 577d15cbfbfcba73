use super::models::AppConfig;
use super::tables::{ConfigTables, TABLE_NAMES};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err:#}");
            AppConfig::default()
        }
    }
}

/// Parse either the sectioned layout (`[synthesis]`, `[audio]`, ...) or the
/// flat key layout.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let value: toml::Table = toml::from_str(contents).context("Parsing config TOML")?;
    let sectioned = TABLE_NAMES
        .iter()
        .any(|name| value.get(*name).is_some_and(toml::Value::is_table));
    if sectioned {
        let tables: ConfigTables =
            toml::from_str(contents).context("Reading sectioned config layout")?;
        Ok(tables.into())
    } else {
        toml::from_str(contents).context("Reading flat config layout")
    }
}

/// Serialize to the sectioned layout.
pub fn serialize_config(config: &AppConfig) -> Result<String> {
    toml::to_string(&ConfigTables::from(config)).context("Serializing config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, ProbeKind};

    #[test]
    fn reads_sectioned_layout() {
        let cfg = parse_config(
            r#"
            [synthesis]
            default_voice = "nova"
            backend_timeout_secs = 15
            voice_aliases = { narrator = "en-GB-RyanNeural" }

            [chunking]
            max_chunk_chars = 500

            [audio]
            probe = "rodio"

            [logging]
            log_level = "warn"
            "#,
        )
        .expect("sectioned config should parse");

        assert_eq!(cfg.default_voice, "nova");
        assert_eq!(cfg.max_chunk_chars, 500);
        assert_eq!(cfg.probe, ProbeKind::Rodio);
        assert_eq!(cfg.log_level, LogLevel::Warn);
        assert_eq!(
            cfg.voice_aliases.get("narrator").map(String::as_str),
            Some("en-GB-RyanNeural")
        );
        assert_eq!(cfg.ffmpeg_bin, "ffmpeg");
        assert_eq!(cfg.backend_timeout(), std::time::Duration::from_secs(15));
    }

    #[test]
    fn shipped_sample_config_parses() {
        let cfg = parse_config(include_str!("../../../../conf/config.toml"))
            .expect("sample config should parse");
        assert_eq!(cfg.backend_command, "edge-tts-worker");
        assert_eq!(cfg.backend_timeout_secs, 120);
        assert_eq!(cfg.max_chunk_chars, 2000);
        assert_eq!(cfg.log_level, LogLevel::Info);
    }

    #[test]
    fn reads_flat_layout() {
        let cfg = parse_config("max_chunk_chars = 120\naudio_extension = \".wav\"\n")
            .expect("flat config should parse");
        assert_eq!(cfg.max_chunk_chars, 120);
        assert_eq!(cfg.audio_extension(), "wav");
        assert_eq!(cfg.default_voice, "alloy");
        assert_eq!(cfg.backend_timeout_secs, 120);
    }

    #[test]
    fn serialized_config_round_trips_through_tables() {
        let mut cfg = AppConfig::default();
        cfg.tick_interval_ms = 20;
        cfg.work_dir = "/tmp/narration".to_string();
        let text = serialize_config(&cfg).expect("config should serialize");
        assert!(text.contains("[playback]"));
        assert_eq!(parse_config(&text).expect("reparse"), cfg);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config(Path::new("/definitely/not/here/config.toml"));
        assert_eq!(cfg.max_chunk_chars, 2000);
        assert_eq!(cfg.probe, ProbeKind::Ffmpeg);
    }
}
