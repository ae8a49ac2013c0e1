// Generative backend boundary
// Prompt in, JSON out; transport failures and schema violations kept apart

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::schema::Schema;

/// Errors raised by a single stage call
#[derive(Debug, Error)]
pub enum StageError {
    /// The backend call itself failed (network, auth, quota, blocked prompt)
    #[error("{0}")]
    Generation(String),

    /// The backend answered, but not with JSON matching the stage schema
    #[error("{0}")]
    SchemaViolation(String),
}

/// One request to the generative backend
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// Model-selection parameter of the calling stage
    pub model: &'a str,
    pub prompt: &'a str,
    pub schema: &'a Schema,
}

/// Opaque generative backend.
///
/// Implementations return the model's raw text; parsing and validation
/// happen in [`invoke`] so every backend is held to the same contract.
#[async_trait]
pub trait GenerativeInvoker: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, StageError>;
}

/// Call the backend and return its reply as a value conforming to `schema`
pub async fn invoke(
    invoker: &dyn GenerativeInvoker,
    model: &str,
    prompt: &str,
    schema: &Schema,
) -> Result<Value, StageError> {
    let request = GenerationRequest {
        model,
        prompt,
        schema,
    };

    let text = invoker.generate(request).await?;

    let value: Value = serde_json::from_str(extract_json(&text)).map_err(|e| {
        StageError::SchemaViolation(format!("Model did not return valid JSON: {}", e))
    })?;

    schema.validate(&value).map_err(|violation| {
        StageError::SchemaViolation(format!("Model output does not match schema at {}", violation))
    })?;

    Ok(value)
}

/// Strip surrounding whitespace and an optional Markdown code fence
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json") up to the first newline
    let body = match fenced.find('\n') {
        Some(newline) => &fenced[newline + 1..],
        None => fenced,
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
