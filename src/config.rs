use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Application version, embedded in localization resource filenames.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Languages the application can serve, with their display names
/// (the display name is what the translation prompt uses).
pub const SUPPORTED_LANGS: &[(&str, &str)] = &[("en", "English"), ("fr", "French")];

pub const DEFAULT_LANG: &str = "en";

pub fn lang_supported(code: &str) -> bool {
    SUPPORTED_LANGS.iter().any(|(c, _)| *c == code)
}

pub fn lang_display_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Preferred translations for specific term pairs, injected into the
/// translation prompt so the model keeps established vocabulary.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferredTranslations {
    /// Sentence introducing the list of notes.
    pub intro: String,
    /// Per-pair note template with `{source_term}` and `{dest_term}` holes.
    pub note: String,
    /// Term pairs keyed by "<source>-<dest>" language codes.
    #[serde(flatten)]
    pub pairs: BTreeMap<String, Vec<(String, String)>>,
}

/// Application configuration, loaded from a JSON file.
///
/// Key names are kept uppercase for compatibility with config files from
/// earlier deployments of the application.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    /// Path to the SQLite catalog database.
    pub database: PathBuf,
    /// Folder holding the images being tagged.
    pub images_folder: PathBuf,
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Folder with localization resource files.
    #[serde(default = "default_resources")]
    pub resources_folder: PathBuf,
    /// Folder with the static front-end assets.
    #[serde(default = "default_static")]
    pub static_folder: PathBuf,

    pub ollama_host: Option<String>,
    pub ollama_port: Option<u16>,
    pub ollama_model: Option<String>,
    pub ollama_translate_tags_prompt: Option<String>,
    pub ollama_preferred_translations: Option<PreferredTranslations>,
}

/// The fully-configured subset of the Ollama settings.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub prompt: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path).map_err(|e| {
            tracing::error!("Failed to read config file {}: {e}", path.display());
            AppError::operational("config_unreadable")
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            tracing::error!("Failed to parse config file {}: {e}", path.display());
            AppError::operational("config_invalid")
        })
    }

    /// Translation settings, or None when any required field is missing.
    pub fn ollama(&self) -> Option<OllamaConfig> {
        Some(OllamaConfig {
            host: self.ollama_host.clone()?,
            port: self.ollama_port?,
            model: self.ollama_model.clone()?,
            prompt: self.ollama_translate_tags_prompt.clone()?,
        })
    }
}

fn default_bind() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_resources() -> PathBuf {
    PathBuf::from("resources")
}

fn default_static() -> PathBuf {
    PathBuf::from("static")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"DATABASE": "tagger.db", "IMAGES_FOLDER": "/srv/images"}}"#
        )
        .unwrap();

        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.database, PathBuf::from("tagger.db"));
        assert_eq!(cfg.resources_folder, PathBuf::from("resources"));
        assert!(cfg.ollama().is_none());
    }

    #[test]
    fn ollama_requires_all_four_fields() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{
                "DATABASE": "tagger.db",
                "IMAGES_FOLDER": "/srv/images",
                "OLLAMA_HOST": "localhost",
                "OLLAMA_PORT": 11434,
                "OLLAMA_MODEL": "gemma2",
                "OLLAMA_TRANSLATE_TAGS_PROMPT": "translate {{tags}}"
            }}"#
        )
        .unwrap();

        let cfg = Config::load(f.path()).unwrap();
        let ollama = cfg.ollama().unwrap();
        assert_eq!(ollama.port, 11434);
        assert_eq!(ollama.model, "gemma2");
        assert_eq!(ollama.prompt, "translate {tags}");
    }

    #[test]
    fn unsupported_language_is_rejected() {
        assert!(lang_supported("en"));
        assert!(lang_supported("fr"));
        assert!(!lang_supported("de"));
        assert_eq!(lang_display_name("fr"), Some("French"));
    }
}
