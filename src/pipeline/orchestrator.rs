// Pipeline orchestrator
// Analyzer -> Composer -> NoteNormalizer -> Narrator, strictly in order

use serde_json::json;
use std::sync::Arc;

use super::error::PipelineError;
use super::trace::{TraceEntry, TraceWriter};
use crate::composition::{
    normalize_data_mapping, AudioMapping, Composition, CompositionInput, InputKind, RawInput,
};
use crate::config::ModelConfig;
use crate::stages::{
    run_stage, AnalyzerInput, AnalyzerStage, ComposerInput, ComposerStage, GenerativeInvoker,
    NarratorInput, NarratorStage, StageContract,
};

/// Validate the top-level request shape
pub fn validate_input(raw: &RawInput) -> Result<CompositionInput, PipelineError> {
    let kind = InputKind::from_str_opt(&raw.input_type).ok_or_else(|| {
        PipelineError::InvalidInput(format!(
            "type must be \"csv\" or \"text\", got \"{}\"",
            raw.input_type
        ))
    })?;

    if raw.data.trim().is_empty() {
        return Err(PipelineError::InvalidInput("data must not be empty".to_string()));
    }

    Ok(CompositionInput::new(kind, raw.data.clone()))
}

/// Runs the three generative stages and assembles a [`Composition`]
pub struct Pipeline {
    invoker: Arc<dyn GenerativeInvoker>,
    analyzer: AnalyzerStage,
    composer: ComposerStage,
    narrator: NarratorStage,
}

impl Pipeline {
    pub fn new(invoker: Arc<dyn GenerativeInvoker>, models: &ModelConfig) -> Self {
        Pipeline {
            invoker,
            analyzer: AnalyzerStage::new(models.analyzer.clone()),
            composer: ComposerStage::new(models.composer.clone()),
            narrator: NarratorStage::new(models.narrator.clone()),
        }
    }

    /// Run the whole pipeline for one request
    pub async fn run(&self, input: &RawInput) -> Result<Composition, PipelineError> {
        self.run_traced(input, None).await
    }

    /// Run the pipeline, appending stage transitions to `trace`
    pub async fn run_traced(
        &self,
        input: &RawInput,
        trace: Option<&TraceWriter>,
    ) -> Result<Composition, PipelineError> {
        log::info!("Starting composition run ({} input)", input.input_type);

        match self.execute(input, trace).await {
            Ok(composition) => {
                log::info!(
                    "Composition complete: {} notes, {:.2}s, {} narration lines",
                    composition.notes().len(),
                    composition.duration(),
                    composition.narration_script.len()
                );
                Ok(composition)
            }
            Err(error) => {
                log::error!(
                    "Composition run failed at {}: {}",
                    error.stage().unwrap_or("input validation"),
                    error
                );
                if let Some(trace) = trace {
                    trace.record(
                        TraceEntry::new(error.stage().unwrap_or("Input"), 1.0, "Run failed")
                            .with_data(json!({"code": error.code(), "error": error.to_string()})),
                    );
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        raw: &RawInput,
        trace: Option<&TraceWriter>,
    ) -> Result<Composition, PipelineError> {
        let record = |entry: TraceEntry| {
            if let Some(trace) = trace {
                trace.record(entry);
            }
        };

        // 1. Input shape
        let input = validate_input(raw)?;
        record(
            TraceEntry::new("Input", 0.0, "Input validated")
                .with_data(json!({"type": input.kind.as_str(), "bytes": input.data.len()})),
        );

        // 2. Analyzer
        record(TraceEntry::new(self.analyzer.name(), 0.05, "Analyzing input"));
        let analysis = run_stage(
            self.invoker.as_ref(),
            &self.analyzer,
            &AnalyzerInput {
                input_type: input.kind,
                input_data: input.data.clone(),
            },
        )
        .await
        .map_err(|e| PipelineError::from_stage(self.analyzer.name(), e))?;

        let analysis_json = analysis.to_canonical_json().map_err(|e| PipelineError::SchemaViolation {
            stage: self.analyzer.name(),
            message: format!("Analysis could not be serialized: {}", e),
        })?;
        record(
            TraceEntry::new(self.analyzer.name(), 0.35, "Analysis complete")
                .with_data(json!({"sentiment": analysis.sentiment})),
        );

        // 3. Composer
        record(TraceEntry::new(self.composer.name(), 0.4, "Composing audio mapping"));
        let composed = run_stage(
            self.invoker.as_ref(),
            &self.composer,
            &ComposerInput {
                analysis: analysis_json.clone(),
            },
        )
        .await
        .map_err(|e| PipelineError::from_stage(self.composer.name(), e))?;
        record(
            TraceEntry::new(self.composer.name(), 0.65, "Audio mapping composed").with_data(json!({
                "key": composed.mapping.key,
                "tempo": composed.mapping.tempo,
            })),
        );

        // 4. Normalize notes
        let normalized = normalize_data_mapping(
            &composed.mapping.data_mapping,
            input.kind,
            Some(&input.data),
        )?;
        if normalized.notes.is_empty() {
            return Err(PipelineError::EmptyComposition);
        }
        record(
            TraceEntry::new("Normalizer", 0.7, "Notes normalized").with_data(json!({
                "notes": normalized.notes.len(),
                "duration": normalized.duration,
            })),
        );

        // 5. Audio mapping from the Composer's header and the normalized notes
        let audio_mapping = AudioMapping {
            key: composed.mapping.key,
            tempo: composed.mapping.tempo,
            instrumentation: composed.mapping.instrumentation,
            data_mapping: normalized.notes,
            duration: normalized.duration,
        };

        // 6. Narrator sees the mapping as generated, not the normalized one
        record(TraceEntry::new(self.narrator.name(), 0.75, "Writing narration"));
        let narration_script = run_stage(
            self.invoker.as_ref(),
            &self.narrator,
            &NarratorInput {
                analysis: analysis_json,
                audio_mapping: composed.mapping_json,
            },
        )
        .await
        .map_err(|e| PipelineError::from_stage(self.narrator.name(), e))?;
        record(
            TraceEntry::new(self.narrator.name(), 0.95, "Narration complete")
                .with_data(json!({"lines": narration_script.len()})),
        );

        // 7. Assemble
        let composition = Composition {
            audio_mapping,
            narration_script,
        };
        record(TraceEntry::new("Assembly", 1.0, "Composition assembled"));

        Ok(composition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::read_trace_file;
    use crate::stages::scripted::ScriptedInvoker;
    use crate::stages::StageError;
    use tempfile::TempDir;

    const ANALYSIS: &str =
        r#"{"analysis":{"summary":"S","trends":"T","patterns":"P","sentiment":"negative"}}"#;
    const COMPOSITION: &str = r#"{"audioMapping":{"key":"C minor","tempo":90,"instrumentation":["strings"],"dataMapping":[{"time":0.5,"note":"E4","duration":0.5},{"time":0,"note":"C4","duration":1,"velocity":0.8}]}}"#;
    const NARRATION: &str = r#"[{"timestamp":0,"text":"It begins."},{"timestamp":0.5,"text":"A rise."}]"#;

    fn pipeline(invoker: Arc<ScriptedInvoker>) -> Pipeline {
        Pipeline::new(invoker, &ModelConfig::default())
    }

    fn text_input(data: &str) -> RawInput {
        RawInput {
            input_type: "text".to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_validate_input() {
        assert!(validate_input(&text_input("hello")).is_ok());

        let bad_type = RawInput {
            input_type: "xml".to_string(),
            data: "<a/>".to_string(),
        };
        assert!(matches!(validate_input(&bad_type), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(validate_input(&text_input("  \n")), Err(PipelineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_full_run_assembles_composition() {
        let invoker = Arc::new(ScriptedInvoker::replying(&[ANALYSIS, COMPOSITION, NARRATION]));
        let composition = pipeline(invoker.clone()).run(&text_input("sales fell")).await.unwrap();

        let notes = composition.notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note, "C4");
        assert_eq!(notes[1].note, "E4");
        assert_eq!(notes[1].velocity, 0.8);
        assert_eq!(composition.duration(), 1.0);
        assert_eq!(composition.audio_mapping.key, "C minor");
        assert_eq!(composition.narration_script.len(), 2);
        assert_eq!(invoker.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_stages_receive_threaded_payloads() {
        let invoker = Arc::new(ScriptedInvoker::replying(&[ANALYSIS, COMPOSITION, NARRATION]));
        pipeline(invoker.clone()).run(&text_input("sales fell")).await.unwrap();

        let calls = invoker.calls();
        let canonical = r#"{"summary":"S","trends":"T","patterns":"P","sentiment":"negative"}"#;

        assert!(calls[0].prompt.contains("Data: sales fell"));
        assert!(calls[1].prompt.contains(canonical));
        assert!(calls[2].prompt.contains(canonical));
        // Narrator gets the unnormalized mapping: E4 still listed first
        assert!(calls[2]
            .prompt
            .contains(r#""dataMapping":[{"time":0.5,"note":"E4","duration":0.5}"#));
        assert_eq!(calls[0].model, crate::config::DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_empty_data_mapping_fails_run() {
        let composer = r#"{"audioMapping":{"key":"C","tempo":90,"instrumentation":[],"dataMapping":[]}}"#;
        let invoker = Arc::new(ScriptedInvoker::replying(&[ANALYSIS, composer, NARRATION]));

        let err = pipeline(invoker.clone()).run(&text_input("x")).await.unwrap_err();

        assert!(matches!(err, PipelineError::EmptyComposition));
        // Narrator never called
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_non_collection_mapping_fails_run() {
        let composer = r#"{"audioMapping":{"key":"C","tempo":90,"instrumentation":[],"dataMapping":"C4 E4 G4"}}"#;
        let invoker = Arc::new(ScriptedInvoker::replying(&[ANALYSIS, composer]));

        let err = pipeline(invoker).run(&text_input("x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMusicalStructure(_)));
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_calls() {
        let invoker = Arc::new(ScriptedInvoker::replying(&[]));
        let err = pipeline(invoker.clone()).run(&text_input("")).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_short_circuits() {
        let invoker = Arc::new(ScriptedInvoker::new(vec![
            Ok(ANALYSIS.to_string()),
            Err(StageError::Generation("503 Service Unavailable".to_string())),
        ]));

        let err = pipeline(invoker.clone()).run(&text_input("x")).await.unwrap_err();

        assert_eq!(err.to_string(), "Composer stage failed: 503 Service Unavailable");
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_narrator_schema_violation() {
        let invoker = Arc::new(ScriptedInvoker::replying(&[
            ANALYSIS,
            COMPOSITION,
            r#"{"script": []}"#,
        ]));

        let err = pipeline(invoker).run(&text_input("x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { stage: "Narrator", .. }));
    }

    #[tokio::test]
    async fn test_trace_records_stages() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(trace_path.clone());

        let invoker = Arc::new(ScriptedInvoker::replying(&[ANALYSIS, COMPOSITION, NARRATION]));
        pipeline(invoker)
            .run_traced(&text_input("x"), Some(&writer))
            .await
            .unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        let stages: Vec<&str> = entries.iter().map(|e| e.stage.as_str()).collect();
        assert_eq!(stages.first(), Some(&"Input"));
        assert_eq!(stages.last(), Some(&"Assembly"));
        assert!(stages.contains(&"Normalizer"));
        assert_eq!(entries.last().unwrap().progress, 1.0);
    }
}
