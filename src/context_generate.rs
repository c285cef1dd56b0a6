//! Suggests human-readable context notes for tables that look
//! under-documented, by asking an OpenAI-compatible chat endpoint. Results
//! are cached in `llm_cache` keyed by a hash of the exact inputs, so
//! repeated `qpg context generate` runs over an unchanged schema don't
//! re-spend tokens.

use crate::error::ContextGenerationError;
use crate::get::ObjectPayload;
use crate::settings::OpenAiSettings;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Columns that carry no domain signal on their own; a table whose only
/// columns are these doesn't have enough to infer a context note from.
const BOILERPLATE_COLUMNS: &[&str] = &[
    "id", "created_at", "updated_at", "deleted_at", "inserted_at", "version", "uuid", "row_version",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDecision {
    pub generate: bool,
    pub context: Option<String>,
    pub rationale: String,
}

/// Gate: does this object have enough non-boilerplate signal (name,
/// comment, or distinguishing columns) to be worth an LLM call?
pub fn has_sufficient_signal(object: &ObjectPayload) -> bool {
    if !object.comment.trim().is_empty() {
        return true;
    }
    object.columns.iter().any(|c| !BOILERPLATE_COLUMNS.contains(&c.column_name.to_lowercase().as_str()))
}

fn cache_key(object: &ObjectPayload, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(object.object_id.as_bytes());
    hasher.update(b":");
    hasher.update(model.as_bytes());
    hasher.update(b":");
    hasher.update(object.definition.as_bytes());
    hasher.update(object.comment.as_bytes());
    for column in &object.columns {
        hasher.update(column.column_name.as_bytes());
        hasher.update(column.data_type.as_bytes());
    }
    hex::encode(hasher.finalize())
}

async fn cache_get(pool: &SqlitePool, key: &str) -> Result<Option<GenerationDecision>, sqlx::Error> {
    let row: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT value_json, expires_at FROM llm_cache WHERE key = ?").bind(key).fetch_optional(pool).await?;

    let Some((value_json, expires_at)) = row else {
        return Ok(None);
    };
    if let Some(expires_at) = expires_at {
        if let Ok(expiry) = chrono::DateTime::parse_from_rfc3339(&expires_at) {
            if expiry < chrono::Utc::now() {
                return Ok(None);
            }
        }
    }
    Ok(serde_json::from_str(&value_json).ok())
}

async fn cache_put(pool: &SqlitePool, key: &str, decision: &GenerationDecision) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();
    let expires = now + chrono::Duration::days(30);
    let value_json = serde_json::to_string(decision).unwrap_or_else(|_| "{}".to_string());
    sqlx::query(
        "INSERT INTO llm_cache (key, value_json, created_at, expires_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, created_at = excluded.created_at, expires_at = excluded.expires_at",
    )
    .bind(key)
    .bind(&value_json)
    .bind(now.to_rfc3339())
    .bind(expires.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

fn build_prompt(object: &ObjectPayload) -> String {
    let columns = object
        .columns
        .iter()
        .map(|c| format!("- {} {}{}", c.column_name, c.data_type, if c.is_nullable { "" } else { " NOT NULL" }))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are documenting a database schema for other engineers. Given the table below, decide whether a short \
         business-context note would help, and if so, write one to two sentences describing what the table represents \
         and how it's used. Respond as JSON: {{\"generate\": bool, \"context\": string|null, \"rationale\": string}}.\n\n\
         Table: {}\nExisting comment: {}\nColumns:\n{}",
        object.fqname, object.comment, columns
    )
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

async fn call_chat_completion(settings: &OpenAiSettings, prompt: &str) -> Result<GenerationDecision, ContextGenerationError> {
    let client = reqwest::Client::new();
    let request = ChatRequest {
        model: &settings.model,
        messages: vec![ChatMessage { role: "user", content: prompt.to_string() }],
        temperature: 0.2,
    };

    let response = client
        .post(format!("{}/chat/completions", settings.base_url.trim_end_matches('/')))
        .bearer_auth(&settings.api_key)
        .json(&request)
        .send()
        .await?
        .error_for_status()?;

    let parsed: ChatResponse = response.json().await?;
    let content = parsed
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .ok_or_else(|| ContextGenerationError::Model("empty choices array".to_string()))?;

    serde_json::from_str(&content).map_err(|e| ContextGenerationError::Model(format!("could not parse model output as JSON: {e}")))
}

/// Runs the full generate flow for a single object: signal gate, cache
/// lookup, model call, cache store. Returns `InsufficientSignal` rather
/// than spending a call on a table with nothing to say about it.
pub async fn generate_context_for_object(
    pool: &SqlitePool,
    settings: &OpenAiSettings,
    object: &ObjectPayload,
) -> Result<GenerationDecision, ContextGenerationError> {
    if !has_sufficient_signal(object) {
        return Err(ContextGenerationError::InsufficientSignal);
    }

    let key = cache_key(object, &settings.model);
    if let Some(cached) = cache_get(pool, &key).await? {
        return Ok(cached);
    }

    let prompt = build_prompt(object);
    let decision = call_chat_completion(settings, &prompt).await?;
    cache_put(pool, &key, &decision).await?;
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::get::ColumnRow;

    fn object_with_columns(columns: Vec<&str>) -> ObjectPayload {
        ObjectPayload {
            object_id: "abc123456789".to_string(),
            source_name: "prod".to_string(),
            schema_name: Some("public".to_string()),
            object_name: "widgets".to_string(),
            object_type: "table".to_string(),
            fqname: "public.widgets".to_string(),
            definition: String::new(),
            comment: String::new(),
            signature: None,
            owner: None,
            is_system: false,
            columns: columns
                .into_iter()
                .map(|name| ColumnRow {
                    column_name: name.to_string(),
                    data_type: "text".to_string(),
                    is_nullable: true,
                    ordinal_position: 1,
                    default_expr: None,
                    comment: None,
                })
                .collect(),
            constraints: vec![],
            indexes: vec![],
            dependencies: vec![],
            dependents: vec![],
            effective_context: String::new(),
        }
    }

    #[test]
    fn boilerplate_only_table_has_insufficient_signal() {
        let object = object_with_columns(vec!["id", "created_at", "updated_at"]);
        assert!(!has_sufficient_signal(&object));
    }

    #[test]
    fn table_with_domain_column_has_signal() {
        let object = object_with_columns(vec!["id", "created_at", "sku", "price_cents"]);
        assert!(has_sufficient_signal(&object));
    }

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let object = object_with_columns(vec!["sku"]);
        assert_eq!(cache_key(&object, "gpt-4o-mini"), cache_key(&object, "gpt-4o-mini"));
    }

    #[test]
    fn cache_key_differs_by_model() {
        let object = object_with_columns(vec!["sku"]);
        assert_ne!(cache_key(&object, "gpt-4o-mini"), cache_key(&object, "gpt-4o"));
    }
}
