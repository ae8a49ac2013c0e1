// Stage contracts
// Typed input, prompt template, output schema and model for each stage

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::invoker::{invoke, GenerativeInvoker, StageError};
use super::schema::Schema;

/// A single generative pipeline stage
pub trait StageContract: Send + Sync {
    type Input: Serialize + Send + Sync;
    type Output: Send;

    /// Stage name used in logs, traces and error messages
    fn name(&self) -> &'static str;

    /// Model-selection parameter
    fn model(&self) -> &str;

    fn output_schema(&self) -> Schema;

    /// Prompt body for `input`, without output instructions
    fn prompt_body(&self, input: &Self::Input) -> String;

    /// Convert a schema-conforming value into the typed output
    fn decode(&self, value: Value) -> Result<Self::Output, StageError>;

    /// Full prompt sent to the backend
    fn prompt(&self, input: &Self::Input) -> String {
        with_output_instructions(&self.prompt_body(input), &self.output_schema())
    }
}

/// Run one stage: build the prompt, invoke the backend, decode the reply
pub async fn run_stage<S: StageContract>(
    invoker: &dyn GenerativeInvoker,
    stage: &S,
    input: &S::Input,
) -> Result<S::Output, StageError> {
    let schema = stage.output_schema();
    let prompt = stage.prompt(input);

    log::debug!(
        "{} stage - model {} via {} - input: {}",
        stage.name(),
        stage.model(),
        invoker.name(),
        serde_json::to_string(input).unwrap_or_else(|_| "<unserializable>".to_string())
    );

    let value = invoke(invoker, stage.model(), &prompt, &schema).await?;
    log::debug!("{} stage - output: {}", stage.name(), value);

    stage.decode(value)
}

/// Append the schema and the single-JSON-value instruction to a prompt body
pub fn with_output_instructions(body: &str, schema: &Schema) -> String {
    let rendered = serde_json::to_string_pretty(&schema.to_json_schema())
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        "{}\n\nOutput should be in JSON format and conform to the following schema:\n\n```\n{}\n```\n\nCRITICAL: Your response must be a single, valid JSON value and nothing else. Do not include any explanatory text before or after the JSON.",
        body.trim_end(),
        rendered
    )
}

/// Deserialize a validated value into a stage output type
pub fn decode_value<T: DeserializeOwned>(stage: &str, value: Value) -> Result<T, StageError> {
    serde_json::from_value(value).map_err(|e| {
        StageError::SchemaViolation(format!("{} output could not be decoded: {}", stage, e))
    })
}
