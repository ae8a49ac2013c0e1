// Pipeline errors
// One taxonomy for every way a composition run can fail

use thiserror::Error;

use crate::composition::NormalizeError;
use crate::stages::StageError;

/// Message shown when an error carries no text of its own
pub const FALLBACK_MESSAGE: &str = "An unknown error occurred during AI composition.";

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed top-level request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend call failed at the transport/availability level
    #[error("{stage} stage failed: {message}")]
    Generation { stage: &'static str, message: String },

    /// Backend answered with JSON that does not match the stage schema
    #[error("{stage} stage returned malformed output: {message}")]
    SchemaViolation { stage: &'static str, message: String },

    /// Composer dataMapping is not a collection at all
    #[error(transparent)]
    InvalidMusicalStructure(#[from] NormalizeError),

    /// No note survived normalization
    #[error("The Composer AI failed to generate any valid musical notes. Please try a different input.")]
    EmptyComposition,
}

impl PipelineError {
    /// Attach the failing stage to a stage-level error
    pub fn from_stage(stage: &'static str, error: StageError) -> Self {
        match error {
            StageError::Generation(message) => PipelineError::Generation { stage, message },
            StageError::SchemaViolation(message) => PipelineError::SchemaViolation { stage, message },
        }
    }

    /// Stage that failed, if the failure came from a generative stage
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::Generation { stage, .. } | PipelineError::SchemaViolation { stage, .. } => {
                Some(*stage)
            }
            PipelineError::InvalidMusicalStructure(_) | PipelineError::EmptyComposition => {
                Some("Normalizer")
            }
            PipelineError::InvalidInput(_) => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Generation { .. } => "generation",
            PipelineError::SchemaViolation { .. } => "schema_violation",
            PipelineError::InvalidMusicalStructure(_) => "invalid_musical_structure",
            PipelineError::EmptyComposition => "empty_composition",
        }
    }

    /// Single user-facing message
    pub fn user_message(&self) -> String {
        let detail = match self {
            PipelineError::InvalidInput(message)
            | PipelineError::Generation { message, .. }
            | PipelineError::SchemaViolation { message, .. } => message.as_str(),
            _ => "",
        };

        let is_stage_error = matches!(
            self,
            PipelineError::InvalidInput(_)
                | PipelineError::Generation { .. }
                | PipelineError::SchemaViolation { .. }
        );

        if is_stage_error && detail.trim().is_empty() {
            return FALLBACK_MESSAGE.to_string();
        }
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_mapping() {
        let err = PipelineError::from_stage("Narrator", StageError::Generation("quota".to_string()));
        assert_eq!(err.to_string(), "Narrator stage failed: quota");
        assert_eq!(err.stage(), Some("Narrator"));
        assert_eq!(err.code(), "generation");

        let err = PipelineError::from_stage(
            "Composer",
            StageError::SchemaViolation("$.audioMapping: missing".to_string()),
        );
        assert_eq!(err.code(), "schema_violation");
        assert_eq!(err.stage(), Some("Composer"));
    }

    #[test]
    fn test_empty_message_uses_fallback() {
        let err = PipelineError::from_stage("Analyzer", StageError::Generation(String::new()));
        assert_eq!(err.user_message(), FALLBACK_MESSAGE);
    }

    #[test]
    fn test_user_message_is_error_text() {
        assert_eq!(
            PipelineError::EmptyComposition.user_message(),
            "The Composer AI failed to generate any valid musical notes. Please try a different input."
        );

        let err: PipelineError = NormalizeError::InvalidMusicalStructure { found: "string" }.into();
        assert!(err.user_message().contains("valid musical structure"));
        assert_eq!(err.stage(), Some("Normalizer"));
    }
}
