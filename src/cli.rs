//! Command-line parsing for `faster-reader`.

use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;

pub const USAGE: &str = "Usage: faster-reader [--voice NAME] [--speed X] [--out FILE] [--timeline FILE] [--play] [--config FILE] <INPUT|->\n       faster-reader [--config FILE] --list-voices [LANG,...]";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// File path, or `-` for stdin.
    pub input: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub out: Option<PathBuf>,
    pub timeline: Option<PathBuf>,
    pub play: bool,
    pub config: Option<PathBuf>,
    /// `Some` when `--list-voices` was given; empty means the default language.
    pub list_voices: Option<Vec<String>>,
}

pub fn parse_args() -> Result<CliArgs> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--voice" => parsed.voice = Some(value_for(&arg, args.next())?),
            "--speed" => {
                let raw = value_for(&arg, args.next())?;
                let speed = raw
                    .parse::<f32>()
                    .with_context(|| format!("--speed expects a number, got {raw:?}"))?;
                parsed.speed = Some(speed);
            }
            "--out" => parsed.out = Some(PathBuf::from(value_for(&arg, args.next())?)),
            "--timeline" => parsed.timeline = Some(PathBuf::from(value_for(&arg, args.next())?)),
            "--config" => parsed.config = Some(PathBuf::from(value_for(&arg, args.next())?)),
            "--play" => parsed.play = true,
            "--list-voices" => {
                let has_languages = args.peek().is_some_and(|next| !next.starts_with("--"));
                let languages = if has_languages {
                    args.next()
                        .unwrap_or_default()
                        .split(',')
                        .map(str::trim)
                        .filter(|lang| !lang.is_empty())
                        .map(str::to_string)
                        .collect()
                } else {
                    Vec::new()
                };
                parsed.list_voices = Some(languages);
            }
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("Unknown option {flag}\n{USAGE}"),
            _ => {
                if parsed.input.is_some() {
                    bail!("Only one input may be given\n{USAGE}");
                }
                parsed.input = Some(arg);
            }
        }
    }

    if parsed.list_voices.is_none() && parsed.input.is_none() {
        return Err(anyhow!("{USAGE}"));
    }
    Ok(parsed)
}

fn value_for(flag: &str, value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.starts_with("--"))
        .ok_or_else(|| anyhow!("{flag} needs a value\n{USAGE}"))
}
