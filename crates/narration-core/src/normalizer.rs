//! Markdown-to-speech text cleanup.
//!
//! The rules run in a fixed order and each one sees the output of the rules
//! before it. The result is a single linear string whose char offsets are the
//! coordinate space for chunking and word timings, so the transform must stay
//! deterministic.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_NORMALIZER_PATH: &str = "conf/normalizer.toml";
const CODE_BLOCK_PLACEHOLDER: &str = "(code block omitted)";

static RE_EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[0-9#*]\u{FE0F}?\u{20E3}|(?:\p{Extended_Pictographic}|\p{Regional_Indicator})(?:[\u{FE0E}\u{FE0F}\u{20E3}]|\p{Emoji_Modifier}|\u{200D}(?:\p{Extended_Pictographic}|\p{Regional_Indicator}))*",
    )
    .unwrap()
});
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.*)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|__|\*|_").unwrap());
static RE_FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]+?```").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]+\)").unwrap());
static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+(?:>|$)").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
static RE_SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
struct NormalizerFile {
    normalization: NormalizerConfig,
}

/// Per-rule switches; the rule order itself is not configurable.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct NormalizerConfig {
    pub enabled: bool,
    pub strip_emoji: bool,
    pub heading_hints: bool,
    pub strip_links: bool,
    pub describe_inline_code: bool,
    pub strip_emphasis: bool,
    pub omit_code_blocks: bool,
    pub describe_images: bool,
    pub strip_html: bool,
    pub collapse_blank_lines: bool,
    pub collapse_spaces: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strip_emoji: true,
            heading_hints: true,
            strip_links: true,
            describe_inline_code: true,
            strip_emphasis: true,
            omit_code_blocks: true,
            describe_images: true,
            strip_html: true,
            collapse_blank_lines: true,
            collapse_spaces: true,
        }
    }
}

impl TextNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn load_default() -> Self {
        Self::load(Path::new(DEFAULT_NORMALIZER_PATH))
    }

    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<NormalizerFile>(&contents) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "Loaded text normalizer config");
                    Self {
                        config: file.normalization,
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), "Invalid normalizer config TOML: {err}");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), "Falling back to default normalizer config: {err}");
                Self::default()
            }
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Produce the speakable text. Returns an empty string when nothing
    /// speakable is left.
    pub fn normalize(&self, raw: &str) -> String {
        if !self.config.enabled {
            return raw.trim().to_string();
        }

        let cfg = &self.config;
        let mut text = raw.to_string();

        if cfg.strip_emoji {
            text = RE_EMOJI.replace_all(&text, "").into_owned();
        }

        if cfg.heading_hints {
            text = RE_HEADING
                .replace_all(&text, |caps: &Captures| {
                    let heading = caps[2].trim();
                    match caps[1].len() {
                        1 => format!("Title — {heading}\n"),
                        2 => format!("Section — {heading}\n"),
                        _ => format!("Subsection — {heading}\n"),
                    }
                })
                .into_owned();
        }

        if cfg.strip_links {
            text = RE_LINK.replace_all(&text, "$1").into_owned();
        }

        if cfg.describe_inline_code {
            text = RE_INLINE_CODE
                .replace_all(&text, "code snippet: $1")
                .into_owned();
        }

        if cfg.strip_emphasis {
            text = RE_EMPHASIS.replace_all(&text, "").into_owned();
        }

        if cfg.omit_code_blocks {
            text = RE_FENCED_BLOCK
                .replace_all(&text, CODE_BLOCK_PLACEHOLDER)
                .into_owned();
        }

        if cfg.describe_images {
            text = RE_IMAGE.replace_all(&text, "Image: $1").into_owned();
        }

        if cfg.strip_html {
            text = RE_HTML_TAG.replace_all(&text, "").into_owned();
        }

        if cfg.collapse_blank_lines {
            text = RE_BLANK_LINES.replace_all(&text, "\n\n").into_owned();
        }

        if cfg.collapse_spaces {
            text = RE_SPACE_RUNS.replace_all(&text, " ").into_owned();
        }

        text.trim().to_string()
    }
}
