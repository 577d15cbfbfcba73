use std::collections::BTreeMap;

/// Not shipped with the crate; see the helper protocol in
/// `conf/config.toml` and `synthesis::command`.
pub(crate) fn default_backend_command() -> String {
    "edge-tts-worker".to_string()
}

pub(crate) fn default_backend_args() -> Vec<String> {
    Vec::new()
}

pub(crate) fn default_backend_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_voice() -> String {
    "alloy".to_string()
}

pub(crate) fn default_speed() -> f32 {
    1.0
}

/// Honors `DEFAULT_LANGUAGE` so voice listings can be scoped without a
/// config file.
pub(crate) fn default_language() -> String {
    std::env::var("DEFAULT_LANGUAGE")
        .ok()
        .filter(|lang| !lang.trim().is_empty())
        .unwrap_or_else(|| "en-US".to_string())
}

pub(crate) fn default_voice_aliases() -> BTreeMap<String, String> {
    BTreeMap::new()
}

pub(crate) fn default_max_chunk_chars() -> usize {
    2000
}

pub(crate) fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

pub(crate) fn default_audio_extension() -> String {
    "mp3".to_string()
}

pub(crate) fn default_tick_interval_ms() -> u64 {
    50
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}

pub(crate) fn default_work_dir() -> String {
    String::new()
}
