// Gemini backend
// GenerativeInvoker over the Generative Language REST API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::invoker::{GenerationRequest, GenerativeInvoker, StageError};
use crate::config::GenerationConfig;

const USER_AGENT: &str = concat!("echodepict/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    response_mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Gemini `generateContent` client
pub struct GeminiInvoker {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    temperature: Option<f32>,
}

impl GeminiInvoker {
    pub fn new(config: &GenerationConfig) -> Result<Self, StageError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::Generation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(GeminiInvoker {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("googleai/").unwrap_or(model);
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GenerativeInvoker for GeminiInvoker {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, StageError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            StageError::Generation(
                "No Gemini API key configured (set GEMINI_API_KEY or generation.api_key)".to_string(),
            )
        })?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: request.prompt,
                }],
            }],
            generation_config: GenerationSettings {
                response_mime_type: "application/json",
                temperature: self.temperature,
            },
        };

        log::debug!("Calling Gemini model {}", request.model);

        let response = self
            .http_client
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::Generation(format!("Network error: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StageError::Generation(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(StageError::Generation(format!(
                "Gemini API error {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| StageError::Generation(format!("Unreadable Gemini response: {}", e)))?;

        candidate_text(parsed)
    }
}

/// Concatenated text of the first candidate
fn candidate_text(response: GenerateContentResponse) -> Result<String, StageError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(StageError::Generation(format!("Prompt was blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| StageError::Generation("Gemini returned no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(StageError::Generation(format!(
            "Gemini returned an empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_endpoint_strips_provider_prefix() {
        let invoker = GeminiInvoker::new(&GenerationConfig::default()).unwrap();

        assert_eq!(
            invoker.endpoint("googleai/gemini-1.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: "hi" }],
            }],
            generation_config: GenerationSettings {
                response_mime_type: "application/json",
                temperature: None,
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert!(json["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn test_candidate_text_joins_parts() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"a\":"},{"text":"1}]"}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(candidate_text(response).unwrap(), r#"[{"a":1}]"#);
    }

    #[test]
    fn test_blocked_prompt_is_generation_error() {
        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        let err = candidate_text(response).unwrap_err();

        assert!(matches!(err, StageError::Generation(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_empty_candidate_reports_finish_reason() {
        let response = parse(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#);
        let err = candidate_text(response).unwrap_err();

        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let invoker = GeminiInvoker::new(&GenerationConfig::default()).unwrap();
        let schema = crate::stages::Schema::any();

        let err = invoker
            .generate(GenerationRequest {
                model: "gemini-1.5-flash",
                prompt: "hi",
                schema: &schema,
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No Gemini API key"));
    }
}
