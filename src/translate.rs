//! Tag translation through the Ollama API.
//!
//! The model is asked for a JSON array of `{id, name, description}`
//! entries; anything short of a fully conforming reply is an upstream
//! error and nothing is persisted. Conforming entries are upserted as
//! per-language overrides in a single transaction.

use std::time::Duration;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::{lang_display_name, Config, OllamaConfig};
use crate::error::{AppError, Result};

/// A tag entry sent to the model for translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagEntry {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A translated entry as returned by the model. All three fields are
/// required; a reply missing any of them is rejected wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedTag {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Validate the language pair and ask the model for translations.
pub async fn request_translations(
    cfg: &Config,
    source_lang: &str,
    dest_lang: &str,
    entries: &[TagEntry],
) -> Result<Vec<TranslatedTag>> {
    let ollama = cfg
        .ollama()
        .ok_or_else(|| AppError::operational("api_not_configured"))?;
    let source_name =
        lang_display_name(source_lang).ok_or_else(|| AppError::validation("unsupported_language"))?;
    let dest_name =
        lang_display_name(dest_lang).ok_or_else(|| AppError::validation("unsupported_language"))?;

    let notes = compile_preferred_notes(cfg, source_lang, dest_lang);
    let prompt = build_prompt(&ollama.prompt, source_name, dest_name, entries, &notes)?;
    debug!("Translation prompt: {prompt}");

    let payload = json!({
        "model": ollama.model,
        "prompt": prompt,
        "format": reply_schema(),
        "stream": false,
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| AppError::upstream("model_unreachable", e.to_string()))?;

    let response = client
        .post(generate_url(&ollama))
        .json(&payload)
        .send()
        .await
        .map_err(|e| AppError::upstream("model_unreachable", e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::upstream(
            "model_http_status",
            format!("HTTP {status}"),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AppError::upstream("model_unreachable", e.to_string()))?;
    debug!("Response received: {body}");

    parse_model_reply(&body)
}

/// Upsert the translated entries as `(tag_id, lang)` overrides. One
/// transaction: either every entry lands or none does.
pub fn persist_overrides(
    conn: &mut Connection,
    dest_lang: &str,
    entries: &[TranslatedTag],
) -> Result<()> {
    let tx = conn.transaction()?;
    for entry in entries {
        tx.execute(
            "INSERT INTO tag_overrides (tag_id, lang, name, description)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tag_id, lang) DO UPDATE
             SET name = excluded.name, description = excluded.description",
            params![entry.id, dest_lang, entry.name, entry.description],
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn generate_url(ollama: &OllamaConfig) -> String {
    format!("http://{}:{}/api/generate", ollama.host, ollama.port)
}

/// Fill the configured prompt template. Recognized holes:
/// `{source_lang}`, `{dest_lang}`, `{tags}` and
/// `{preferred_translations_notes}`.
fn build_prompt(
    template: &str,
    source_name: &str,
    dest_name: &str,
    entries: &[TagEntry],
    notes: &str,
) -> Result<String> {
    let tags = serde_json::to_string_pretty(entries)
        .map_err(|e| AppError::upstream("prompt_serialization", e.to_string()))?;
    Ok(template
        .replace("{source_lang}", source_name)
        .replace("{dest_lang}", dest_name)
        .replace("{tags}", &tags)
        .replace("{preferred_translations_notes}", notes))
}

/// Build the notes block nudging the model toward established
/// translations for the given language pair, if any are configured.
fn compile_preferred_notes(cfg: &Config, source_lang: &str, dest_lang: &str) -> String {
    let Some(preferred) = &cfg.ollama_preferred_translations else {
        return String::new();
    };
    let key = format!("{source_lang}-{dest_lang}");
    let Some(pairs) = preferred.pairs.get(&key) else {
        return String::new();
    };

    let notes: Vec<String> = pairs
        .iter()
        .map(|(source_term, dest_term)| {
            preferred
                .note
                .replace("{source_term}", source_term)
                .replace("{dest_term}", dest_term)
        })
        .collect();
    format!("{}\n{}\n", preferred.intro, notes.join("\n"))
}

/// JSON schema constraining the model reply to an array of tag entries.
fn reply_schema() -> serde_json::Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "id": {
                    "type": "integer",
                    "description": "The unique identifier for the tag."
                },
                "name": {
                    "type": "string",
                    "description": "The name of the tag."
                },
                "description": {
                    "type": "string",
                    "description": "A brief description of the tag."
                }
            },
            "required": ["id", "name"]
        }
    })
}

/// Extract the translated entries from a raw Ollama response body.
fn parse_model_reply(body: &str) -> Result<Vec<TranslatedTag>> {
    #[derive(Deserialize)]
    struct OllamaReply {
        #[serde(default)]
        response: String,
    }

    let reply: OllamaReply = serde_json::from_str(body)
        .map_err(|e| AppError::upstream("malformed_model_reply", e.to_string()))?;

    let output = reply.response.trim();
    if output.is_empty() {
        return Err(AppError::upstream(
            "empty_model_output",
            "the model output was empty",
        ));
    }

    let translated: Vec<TranslatedTag> = serde_json::from_str(output)
        .map_err(|e| AppError::upstream("malformed_model_reply", e.to_string()))?;
    if translated.is_empty() {
        return Err(AppError::upstream(
            "empty_model_output",
            "no translations were received from the model",
        ));
    }

    Ok(translated)
}
