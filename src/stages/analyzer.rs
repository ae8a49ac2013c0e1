// Analyzer stage
// Reads the raw input and produces summary, trends, patterns and sentiment

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::contract::{decode_value, StageContract};
use super::invoker::StageError;
use super::schema::Schema;
use crate::composition::{Analysis, InputKind};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerInput {
    pub input_type: InputKind,
    pub input_data: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzerOutput {
    analysis: Analysis,
}

pub struct AnalyzerStage {
    model: String,
}

impl AnalyzerStage {
    pub fn new(model: impl Into<String>) -> Self {
        AnalyzerStage {
            model: model.into(),
        }
    }
}

impl StageContract for AnalyzerStage {
    type Input = AnalyzerInput;
    type Output = Analysis;

    fn name(&self) -> &'static str {
        "Analyzer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn output_schema(&self) -> Schema {
        Schema::object(vec![(
            "analysis",
            Schema::object(vec![
                ("summary", Schema::string().describe("A summary of the analysis.")),
                ("trends", Schema::string().describe("Identified trends in the data.")),
                ("patterns", Schema::string().describe("Identified patterns in the data.")),
                ("sentiment", Schema::string().describe("Sentiment analysis of the data.")),
            ]),
        )])
    }

    fn prompt_body(&self, input: &AnalyzerInput) -> String {
        format!(
            "You are a data analysis expert. Analyze the following {} data and generate insights, identifying trends, patterns, and sentiment.\n\nData: {}",
            input.input_type.as_str(),
            input.input_data
        )
    }

    fn decode(&self, value: Value) -> Result<Analysis, StageError> {
        decode_value::<AnalyzerOutput>(self.name(), value).map(|output| output.analysis)
    }
}
