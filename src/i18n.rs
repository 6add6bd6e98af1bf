//! Localized resource loading.
//!
//! Human-readable strings live in versioned JSON files under the
//! resources folder, one per endpoint and language
//! (`<endpoint>-<version>.<lang>.json`), with a `common-…` file merged
//! on top. The engine only ever refers to messages by `(category, key)`;
//! this module owns the text.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::{lang_supported, DEFAULT_LANG, VERSION};

/// Endpoints with their own resource files. Used when bumping versions.
const RESOURCE_ENDPOINTS: &[&str] = &[
    "common",
    "root",
    "tag_management",
    "images",
    "search_images",
    "load_image",
    "tags",
    "image_tags",
    "translate_tags",
    "add_tag",
    "toggle_tags",
    "tag_info",
    "update_tag",
    "de_duplicate",
    "delete_tags",
    "latest",
];

/// The merged resource tree for one endpoint in one language.
#[derive(Debug, Clone, Default)]
pub struct Resources(Map<String, Value>);

impl Resources {
    /// Look up a message by category and key, falling back to the key
    /// itself when no resource file provides it.
    pub fn message(&self, category: &str, key: &str) -> String {
        self.0
            .get(category)
            .and_then(|c| c.get(key))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| key.to_string())
    }
}

/// Pick the best supported language from an `Accept-Language` header.
pub fn resolve_lang(accept_language: Option<&str>) -> String {
    let Some(header) = accept_language else {
        return DEFAULT_LANG.to_string();
    };

    let mut best: Option<(f32, String)> = None;
    for part in header.split(',') {
        let mut pieces = part.split(';');
        let tag = pieces.next().unwrap_or("").trim();
        if tag.is_empty() {
            continue;
        }
        let q: f32 = pieces
            .find_map(|p| p.trim().strip_prefix("q=").map(str::to_string))
            .and_then(|q| q.parse().ok())
            .unwrap_or(1.0);

        // "fr-CH" matches the supported "fr"
        let primary = tag.split('-').next().unwrap_or(tag).to_ascii_lowercase();
        if lang_supported(&primary) && best.as_ref().map_or(true, |(bq, _)| q > *bq) {
            best = Some((q, primary));
        }
    }

    best.map(|(_, lang)| lang)
        .unwrap_or_else(|| DEFAULT_LANG.to_string())
}

/// Load the resources for an endpoint in a language, merging the common
/// file on top and falling back to the default language per file.
pub fn load(resources_dir: &Path, endpoint: &str, lang: &str) -> Resources {
    let mut merged = Map::new();
    for name in [endpoint, "common"] {
        if let Some(value) = load_one(resources_dir, name, lang) {
            merge_recursively(&mut merged, value);
        }
    }
    Resources(merged)
}

fn load_one(dir: &Path, name: &str, lang: &str) -> Option<Map<String, Value>> {
    for candidate in [lang, DEFAULT_LANG] {
        let path = dir.join(format!("{name}-{VERSION}.{candidate}.json"));
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => return Some(map),
                Ok(_) | Err(_) => {
                    warn!("Resource file {} is not a JSON object", path.display());
                    return None;
                }
            },
            Err(_) => continue,
        }
    }
    None
}

/// Merge `b` into `a`: nested objects merge key by key, everything else
/// is replaced.
fn merge_recursively(a: &mut Map<String, Value>, b: Map<String, Value>) {
    for (key, value) in b {
        match (a.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_recursively(existing, incoming);
            }
            (_, value) => {
                a.insert(key, value);
            }
        }
    }
}

/// Rename versioned resource files to the current application version.
///
/// Used after releases that did not change any localized text, so the
/// existing files keep being picked up. Returns the number of renames.
pub fn bump_versions(resources_dir: &Path) -> std::io::Result<usize> {
    let mut renamed = 0;

    info!("Scanning folder: {}", resources_dir.display());
    for entry in fs::read_dir(resources_dir)? {
        let entry = entry?;
        let fn_ = entry.file_name();
        let Some(fn_) = fn_.to_str() else { continue };
        let Some((endpoint, version, lang)) = parse_resource_name(fn_) else {
            continue;
        };

        if version == VERSION {
            info!("Resource file \"{fn_}\" already at the current version, skipping");
            continue;
        }

        let new_fn = format!("{endpoint}-{VERSION}.{lang}.json");
        fs::rename(entry.path(), resources_dir.join(&new_fn))?;
        info!("Renamed \"{fn_}\" to \"{new_fn}\"");
        renamed += 1;
    }

    if renamed == 0 {
        info!("No resource file versions were bumped");
    }
    Ok(renamed)
}

/// Split `<endpoint>-<version>.<lang>.json` into its parts, or None for
/// filenames that are not versioned resource files.
fn parse_resource_name(fn_: &str) -> Option<(&str, &str, &str)> {
    let stem = fn_.strip_suffix(".json")?;
    let (rest, lang) = stem.rsplit_once('.')?;
    let (endpoint, version) = rest.split_once('-')?;

    if !RESOURCE_ENDPOINTS.contains(&endpoint) || !lang_supported(lang) {
        return None;
    }

    // <major>.<minor>.<patch> with an optional a/b pre-release letter
    let version_digits = version
        .strip_suffix('a')
        .or_else(|| version.strip_suffix('b'))
        .unwrap_or(version);
    let parts: Vec<&str> = version_digits.split('.').collect();
    if parts.len() != 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    Some((endpoint, version, lang))
}
