// Composer stage
// Translates the analysis into key, tempo, instrumentation and note mapping

use serde::Serialize;
use serde_json::Value;

use super::contract::{decode_value, StageContract};
use super::invoker::StageError;
use super::schema::Schema;
use crate::composition::RawAudioMapping;

#[derive(Debug, Clone, Serialize)]
pub struct ComposerInput {
    /// Canonical analysis JSON
    pub analysis: String,
}

/// Composer reply: the typed mapping plus its text exactly as generated
#[derive(Debug, Clone)]
pub struct ComposerOutput {
    pub mapping: RawAudioMapping,
    /// Serialized `audioMapping` value, handed unchanged to the Narrator
    pub mapping_json: String,
}

pub struct ComposerStage {
    model: String,
}

impl ComposerStage {
    pub fn new(model: impl Into<String>) -> Self {
        ComposerStage {
            model: model.into(),
        }
    }
}

impl StageContract for ComposerStage {
    type Input = ComposerInput;
    type Output = ComposerOutput;

    fn name(&self) -> &'static str {
        "Composer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn output_schema(&self) -> Schema {
        Schema::object(vec![(
            "audioMapping",
            Schema::object(vec![
                (
                    "key",
                    Schema::string().describe("The key of the composition (e.g., C minor)."),
                ),
                (
                    "tempo",
                    Schema::number_above(0.0).describe("The tempo of the composition in BPM."),
                ),
                (
                    "instrumentation",
                    Schema::array(Schema::string())
                        .describe("The instruments used in the composition."),
                ),
                (
                    "dataMapping",
                    Schema::any().describe(
                        "The mapping of data values to musical notes: an array of objects with time (seconds), note (pitch name such as C4), duration (seconds) and velocity (0-1).",
                    ),
                ),
            ])
            .describe("A detailed JSON object mapping data points to audio parameters."),
        )])
    }

    fn prompt_body(&self, input: &ComposerInput) -> String {
        format!(
            "You are an expert music composer translating data analysis into music theory.\n\n\
You will make a series of AUTONOMOUS DECISIONS to translate the analysis into music theory. You will decide the key (e.g., C minor for negative sentiment), tempo, instrumentation (e.g., strings for smooth trends, percussive hits for outliers), and the precise mapping of data values to musical notes (pitch, duration, velocity).\n\n\
Each entry of dataMapping must be an object with \"time\" (start in seconds), \"note\" (pitch name, e.g. \"C4\"), \"duration\" (seconds) and \"velocity\" (0.0 to 1.0), emitted in data order.\n\n\
Here is the data analysis:\n{}\n\n\
Output the final audioMapping JSON object, which serves as the \"sheet music\".",
            input.analysis
        )
    }

    fn decode(&self, mut value: Value) -> Result<ComposerOutput, StageError> {
        let raw = value
            .get_mut("audioMapping")
            .map(Value::take)
            .ok_or_else(|| StageError::SchemaViolation("Composer output has no audioMapping".to_string()))?;

        let mapping_json = serde_json::to_string(&raw).map_err(|e| {
            StageError::SchemaViolation(format!("Composer output could not be serialized: {}", e))
        })?;
        let mapping: RawAudioMapping = decode_value(self.name(), raw)?;

        Ok(ComposerOutput {
            mapping,
            mapping_json,
        })
    }
}
