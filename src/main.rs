//! Entry point for `faster-reader`.
//!
//! Reads text from a file or stdin, narrates it through the configured
//! speech helper, and optionally plays the result while highlighting the
//! spoken word in the terminal.

mod cli;
mod player;

use anyhow::{Context, Result, bail};
use narration_core::cancellation::CancellationToken;
use narration_core::config::{AppConfig, load_config};
use narration_core::normalizer::TextNormalizer;
use narration_core::{
    Generation, GenerationRequest, GlobalWordTiming, NarrationSession, Pipeline, SessionUpdate,
};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = cli::parse_args()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        config = %config_path.display(),
        level = %config.log_level,
        backend = %config.backend_command,
        probe = %config.probe,
        max_chunk_chars = config.max_chunk_chars,
        "Starting faster-reader"
    );

    let pipeline = Pipeline::from_config(&config, TextNormalizer::load_default());

    if let Some(languages) = &args.list_voices {
        return list_voices(&pipeline, languages, &config);
    }

    let input = args.input.as_deref().unwrap_or("-");
    let text = read_input(input)?;
    let output_path = match (&args.out, args.play) {
        (Some(path), _) => Some(path.clone()),
        // Playing only: the merged file is temporary.
        (None, true) => None,
        (None, false) => Some(PathBuf::from(format!("narration.{}", config.audio_extension()))),
    };
    let request = GenerationRequest {
        text,
        voice: args.voice.clone().unwrap_or_else(|| config.default_voice.clone()),
        speed: args.speed.unwrap_or(config.default_speed),
        output_path,
    };

    let mut session = NarrationSession::new(pipeline);
    session.start_generation(request)?;

    let interrupted = CancellationToken::new();
    if let Some(generation_token) = session.cancel_token() {
        let interrupted = interrupted.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            warn!("Received Ctrl+C; cancelling");
            generation_token.cancel();
            interrupted.cancel();
        }) {
            warn!("Failed to install Ctrl+C signal handler: {err}");
        }
    }

    let update = session.wait(|update| {
        if let SessionUpdate::Progress(percent) = update {
            info!(percent, "Generation progress");
        }
    });

    let generation = match update {
        Some(SessionUpdate::Ready(generation)) => generation,
        Some(SessionUpdate::Failed(message)) => bail!("{message}"),
        Some(SessionUpdate::Progress(_)) | None => {
            warn!("Generation cancelled; nothing was written");
            return Ok(());
        }
    };

    if !generation.audio.is_temporary() {
        println!("{}", generation.audio.path().display());
    }
    if let Some(timeline_path) = &args.timeline {
        write_timeline(&generation, timeline_path)?;
    }
    if args.play {
        let tick = Duration::from_millis(config.tick_interval_ms.max(1));
        player::play_with_teleprompter(Arc::clone(&generation), tick, &interrupted)?;
    }
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Reading text from stdin")?;
        return Ok(text);
    }
    let path = Path::new(input);
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
}

fn list_voices(pipeline: &Pipeline, languages: &[String], config: &AppConfig) -> Result<()> {
    let voices = pipeline
        .synthesizer()
        .list_voices(languages, &config.default_language)
        .context("Listing voices")?;
    info!(count = voices.len(), "Listing voices");
    for voice in voices {
        println!("{}\t{}\t{}", voice.name, voice.gender, voice.locale);
    }
    Ok(())
}

#[derive(Serialize)]
struct TimelineExport<'a> {
    audio: String,
    duration_secs: f64,
    display_text: &'a str,
    words: &'a [GlobalWordTiming],
}

fn write_timeline(generation: &Generation, path: &Path) -> Result<()> {
    let export = TimelineExport {
        audio: generation.audio.path().display().to_string(),
        duration_secs: generation.duration_secs,
        display_text: &generation.display_text,
        words: generation.timeline.words(),
    };
    let json = serde_json::to_string_pretty(&export).context("Serializing timeline")?;
    fs::write(path, json).with_context(|| format!("Writing timeline {}", path.display()))?;
    info!(path = %path.display(), words = export.words.len(), "Wrote timeline");
    Ok(())
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    // RUST_LOG wins over the config file.
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
