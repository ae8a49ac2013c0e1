// Narrator stage
// Writes the timed script explaining what the listener hears

use serde::Serialize;
use serde_json::Value;

use super::contract::{decode_value, StageContract};
use super::invoker::StageError;
use super::schema::Schema;
use crate::composition::NarrationLine;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarratorInput {
    /// Canonical analysis JSON
    pub analysis: String,
    /// Composer's audioMapping as generated, before normalization
    pub audio_mapping: String,
}

pub struct NarratorStage {
    model: String,
}

impl NarratorStage {
    pub fn new(model: impl Into<String>) -> Self {
        NarratorStage {
            model: model.into(),
        }
    }
}

impl StageContract for NarratorStage {
    type Input = NarratorInput;
    type Output = Vec<NarrationLine>;

    fn name(&self) -> &'static str {
        "Narrator"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn output_schema(&self) -> Schema {
        Schema::array(Schema::object(vec![
            (
                "timestamp",
                Schema::number_at_least(0.0).describe("The timestamp of the narration item."),
            ),
            ("text", Schema::string().describe("The text of the narration item.")),
        ]))
    }

    fn prompt_body(&self, input: &NarratorInput) -> String {
        format!(
            "You are an AI narrator, creating a compelling, human-readable story of the data, in sync with the generated audio.\n\n\
You will receive the analysis of the data, and the audio mapping that translates data points into musical elements.\n\n\
Synthesize the information to generate a timed script (an array of objects), where each object has a timestamp (in seconds) and the text to be spoken at that time. Order the script by ascending timestamp.\n\n\
Make sure the script explains to the user what they are hearing, and why it is significant, for example: \"At 15 seconds, the sharp piano stabs represent the Q4 sales spike we identified.\"\n\n\
Analysis: {}\n\
Audio Mapping: {}\n\n\
Output the narration script as a JSON array of objects with timestamp and text properties. For example:\n\
[\n  {{ \"timestamp\": 0.5, \"text\": \"The data begins its ascent...\" }},\n  {{ \"timestamp\": 2.1, \"text\": \"Notice the anomaly here.\" }}\n]",
            input.analysis, input.audio_mapping
        )
    }

    fn decode(&self, value: Value) -> Result<Vec<NarrationLine>, StageError> {
        decode_value(self.name(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_contains_both_payloads() {
        let stage = NarratorStage::new("test-model");
        let prompt = stage.prompt(&NarratorInput {
            analysis: r#"{"summary":"S"}"#.to_string(),
            audio_mapping: r#"{"key":"C minor"}"#.to_string(),
        });

        assert!(prompt.contains(r#"Analysis: {"summary":"S"}"#));
        assert!(prompt.contains(r#"Audio Mapping: {"key":"C minor"}"#));
        assert!(prompt.contains("\"timestamp\": 0.5"));
    }

    #[test]
    fn test_decode_keeps_script_order() {
        let stage = NarratorStage::new("test-model");
        let value = json!([
            {"timestamp": 0, "text": "Opening."},
            {"timestamp": 4.5, "text": "The dip."}
        ]);

        let script = stage.decode(value).unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script[1].timestamp, 4.5);
        assert_eq!(script[1].text, "The dip.");
    }

    #[test]
    fn test_schema_rejects_negative_timestamp() {
        let stage = NarratorStage::new("test-model");
        let value = json!([{"timestamp": -1, "text": "Too early."}]);

        assert!(stage.output_schema().validate(&value).is_err());
    }
}
