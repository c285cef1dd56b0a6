//! Layered settings resolution: explicit override > qpg-prefixed env var >
//! generic env var > config file (YAML or dotenv-shaped) > static default.

use crate::paths::config_yaml_path;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub openai_model: Option<String>,
}

/// Resolved OpenAI-compatible chat-completion endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Heuristic: a dotenv file's first non-comment, non-blank line looks like
/// `KEY=value`, not `key: value` (YAML). Mirrors how the original settings
/// loader tells the two config formats apart without a file extension.
fn looks_like_dotenv(contents: &str) -> bool {
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        return trimmed.contains('=') && !trimmed.splitn(2, '=').next().unwrap_or("").contains(':');
    }
    false
}

fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            map.insert(key.trim().to_string(), value.to_string());
        }
    }
    map
}

fn load_config_file(path: &Path) -> ConfigFile {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return ConfigFile::default();
    };
    if looks_like_dotenv(&contents) {
        let map = parse_dotenv(&contents);
        ConfigFile {
            openai_api_key: map.get("QPG_OPENAI_API_KEY").or_else(|| map.get("OPENAI_API_KEY")).cloned(),
            openai_base_url: map.get("QPG_OPENAI_BASE_URL").or_else(|| map.get("OPENAI_BASE_URL")).cloned(),
            openai_model: map.get("QPG_OPENAI_MODEL").or_else(|| map.get("OPENAI_MODEL")).cloned(),
        }
    } else {
        serde_yaml::from_str(&contents).unwrap_or_default()
    }
}

fn env_value(qpg_prefixed: &str, generic: &str) -> Option<String> {
    std::env::var(qpg_prefixed)
        .ok()
        .or_else(|| std::env::var(generic).ok())
        .filter(|v| !v.is_empty())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolves OpenAI settings with precedence:
/// explicit override > `QPG_OPENAI_*` env > `OPENAI_*` env > config file > default.
pub fn resolve_openai_settings(
    api_key_override: Option<String>,
    base_url_override: Option<String>,
    model_override: Option<String>,
) -> OpenAiSettings {
    let config = load_config_file(&config_yaml_path());

    let api_key = clean_optional(api_key_override)
        .or_else(|| env_value("QPG_OPENAI_API_KEY", "OPENAI_API_KEY"))
        .or(config.openai_api_key)
        .unwrap_or_default();

    let base_url = clean_optional(base_url_override)
        .or_else(|| env_value("QPG_OPENAI_BASE_URL", "OPENAI_BASE_URL"))
        .or(config.openai_base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let model = clean_optional(model_override)
        .or_else(|| env_value("QPG_OPENAI_MODEL", "OPENAI_MODEL"))
        .or(config.openai_model)
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    OpenAiSettings {
        api_key,
        base_url,
        model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_detection_matches_key_equals_value() {
        assert!(looks_like_dotenv("QPG_OPENAI_API_KEY=sk-test\n"));
        assert!(!looks_like_dotenv("openai_api_key: sk-test\n"));
    }

    #[test]
    fn dotenv_detection_skips_comments_and_blanks() {
        assert!(looks_like_dotenv("# comment\n\nQPG_OPENAI_MODEL=gpt-4o\n"));
    }

    #[test]
    fn default_base_url_and_model_when_nothing_set() {
        let settings = resolve_openai_settings(None, None, None);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn explicit_override_wins_over_everything() {
        let settings = resolve_openai_settings(
            Some("explicit-key".to_string()),
            Some("https://explicit".to_string()),
            Some("explicit-model".to_string()),
        );
        assert_eq!(settings.api_key, "explicit-key");
        assert_eq!(settings.base_url, "https://explicit");
        assert_eq!(settings.model, "explicit-model");
    }
}
