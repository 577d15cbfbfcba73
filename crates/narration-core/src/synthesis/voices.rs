//! Voice name resolution and listing filters.

use super::VoiceInfo;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// OpenAI-style names accepted in place of full neural voice ids.
static BUILTIN_ALIASES: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("alloy", "en-US-JennyNeural"),
        ("ash", "en-US-AndrewNeural"),
        ("ballad", "en-GB-ThomasNeural"),
        ("coral", "en-AU-NatashaNeural"),
        ("echo", "en-US-GuyNeural"),
        ("fable", "en-GB-SoniaNeural"),
        ("nova", "en-US-AriaNeural"),
        ("onyx", "en-US-EricNeural"),
        ("sage", "en-US-JennyNeural"),
        ("shimmer", "en-US-EmmaNeural"),
        ("verse", "en-US-BrianNeural"),
    ])
});

/// Alias table fixed at startup. Configured aliases win over built-in ones.
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    aliases: BTreeMap<String, String>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self {
            aliases: BUILTIN_ALIASES
                .iter()
                .map(|(alias, voice)| (alias.to_string(), voice.to_string()))
                .collect(),
        }
    }
}

impl VoiceCatalog {
    pub fn with_overrides(extra: &BTreeMap<String, String>) -> Self {
        let mut catalog = Self::default();
        for (alias, voice) in extra {
            let alias = alias.trim();
            let voice = voice.trim();
            if alias.is_empty() || voice.is_empty() {
                tracing::warn!(alias, voice, "Ignoring blank voice alias entry");
                continue;
            }
            catalog.aliases.insert(alias.to_string(), voice.to_string());
        }
        catalog
    }

    /// Backend voice id for `name`; names without an alias pass through.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        let name = name.trim();
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }
}

/// Keep voices whose locale starts with one of `languages`. `"all"` keeps
/// everything; an empty filter means `default_language`.
pub fn filter_voices(
    voices: Vec<VoiceInfo>,
    languages: &[String],
    default_language: &str,
) -> Vec<VoiceInfo> {
    let prefixes: Vec<&str> = if languages.is_empty() {
        vec![default_language]
    } else {
        languages.iter().map(|lang| lang.trim()).collect()
    };
    if prefixes.iter().any(|lang| lang.eq_ignore_ascii_case("all")) {
        return voices;
    }
    voices
        .into_iter()
        .filter(|voice| prefixes.iter().any(|lang| voice.locale.starts_with(lang)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, locale: &str) -> VoiceInfo {
        VoiceInfo {
            name: name.to_string(),
            gender: "Female".to_string(),
            locale: locale.to_string(),
        }
    }

    fn sample_voices() -> Vec<VoiceInfo> {
        vec![
            voice("en-US-JennyNeural", "en-US"),
            voice("en-GB-SoniaNeural", "en-GB"),
            voice("fr-FR-DeniseNeural", "fr-FR"),
        ]
    }

    #[test]
    fn builtin_aliases_resolve_and_unknown_names_pass_through() {
        let catalog = VoiceCatalog::default();
        assert_eq!(catalog.resolve("alloy"), "en-US-JennyNeural");
        assert_eq!(catalog.resolve("coral"), "en-AU-NatashaNeural");
        assert_eq!(catalog.resolve("de-DE-KatjaNeural"), "de-DE-KatjaNeural");
    }

    #[test]
    fn configured_aliases_override_builtins() {
        let extra = BTreeMap::from([
            ("alloy".to_string(), "en-GB-RyanNeural".to_string()),
            ("narrator".to_string(), "en-IE-EmilyNeural".to_string()),
            (" ".to_string(), "ignored".to_string()),
        ]);
        let catalog = VoiceCatalog::with_overrides(&extra);
        assert_eq!(catalog.resolve("alloy"), "en-GB-RyanNeural");
        assert_eq!(catalog.resolve("narrator"), "en-IE-EmilyNeural");
        assert_eq!(catalog.aliases().len(), 12);
    }

    #[test]
    fn filters_by_locale_prefix() {
        let names = |voices: Vec<VoiceInfo>| -> Vec<String> {
            voices.into_iter().map(|v| v.name).collect()
        };
        assert_eq!(
            names(filter_voices(sample_voices(), &[], "en-US")),
            vec!["en-US-JennyNeural"]
        );
        assert_eq!(
            names(filter_voices(sample_voices(), &["en".to_string()], "fr")),
            vec!["en-US-JennyNeural", "en-GB-SoniaNeural"]
        );
        assert_eq!(
            filter_voices(sample_voices(), &["all".to_string()], "en-US").len(),
            3
        );
    }
}
