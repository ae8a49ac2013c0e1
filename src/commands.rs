// Command boundary
// Outermost entry points: every command answers with a {success, data} / {success, error} response
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::composition::{Composition, InputKind, NarrationLine, Note, RawInput};
use crate::config::Config;
use crate::export::{self, MidiExportOptions};
use crate::pipeline::{Pipeline, TraceWriter};
use crate::stages::{GeminiInvoker, GenerativeInvoker};
use crate::state::{self, ArtifactKind, DbConnection, Run, RunOutcome, RunStatus, RunWithArtifacts};
use crate::timeline::{format_time, progress_percent, InspectorView, TimelineIndex};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

type CommandResult<T> = Result<T, CommandError>;

/// Discriminated result returned by every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        CommandResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        CommandResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl<T> From<CommandResult<T>> for CommandResponse<T> {
    fn from(result: CommandResult<T>) -> Self {
        match result {
            Ok(data) => CommandResponse::ok(data),
            Err(e) => CommandResponse::err(e.message),
        }
    }
}

// ==================== APP STATE ====================

/// Everything the commands need for one process
pub struct AppState {
    pipeline: Pipeline,
    db: Option<DbConnection>,
    data_dir: Option<PathBuf>,
    trace: bool,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        db: Option<DbConnection>,
        data_dir: Option<PathBuf>,
        trace: bool,
    ) -> Self {
        AppState {
            pipeline,
            db,
            data_dir,
            trace,
        }
    }

    /// Build the Gemini-backed pipeline and open the run ledger.
    ///
    /// Storage problems only disable recording; they never prevent composing.
    pub fn from_config(config: &Config) -> CommandResult<Self> {
        let invoker: Arc<dyn GenerativeInvoker> = Arc::new(GeminiInvoker::new(&config.generation)?);
        let pipeline = Pipeline::new(invoker, &config.models);

        let storage = &config.storage;
        let data_dir = if storage.record_runs || storage.trace {
            match state::resolve_data_dir(storage.data_dir.as_deref()) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    log::warn!("Run storage disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let db = match (&data_dir, storage.record_runs) {
            (Some(dir), true) => match state::init_db(&state::database_path(dir)) {
                Ok(db) => Some(db),
                Err(e) => {
                    log::warn!("Run ledger disabled: {}", e);
                    None
                }
            },
            _ => None,
        };

        Ok(AppState::new(pipeline, db, data_dir, storage.trace))
    }

    pub fn db(&self) -> Option<&DbConnection> {
        self.db.as_ref()
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Open a ledger row for `input`. Invalid input types are not recorded.
    fn begin_run(&self, input: &RawInput) -> Option<Uuid> {
        let db = self.db.as_ref()?;
        let kind = InputKind::from_str_opt(&input.input_type)?;

        let recorded = state::create_run(
            db,
            kind,
            state::calculate_sha256(input.data.as_bytes()),
            input.data.len() as i64,
        )
        .and_then(|run| {
            state::update_run_status(db, &run.id, RunStatus::Processing)?;
            Ok(run.id)
        });

        match recorded {
            Ok(run_id) => Some(run_id),
            Err(e) => {
                log::warn!("Failed to record run: {}", e);
                None
            }
        }
    }

    fn trace_writer(&self, run_id: &Uuid) -> Option<TraceWriter> {
        if !self.trace {
            return None;
        }
        let data_dir = self.data_dir.as_deref()?;

        match state::storage::get_run_dir(data_dir, run_id) {
            Ok(dir) => Some(TraceWriter::for_run(dir.join("trace.jsonl"), *run_id)),
            Err(e) => {
                log::warn!("Stage trace disabled for run {}: {}", run_id, e);
                None
            }
        }
    }

    /// Store an artifact file and register it in the ledger
    fn record_artifact(&self, run_id: &Uuid, kind: ArtifactKind, filename: &str, data: &[u8]) {
        let (Some(db), Some(data_dir)) = (self.db.as_ref(), self.data_dir.as_deref()) else {
            return;
        };

        let stored = state::store_file(data_dir, run_id, filename, data).map_err(CommandError::from);
        let result = stored.and_then(|(path, sha256)| {
            state::create_artifact(
                db,
                *run_id,
                kind,
                path.to_string_lossy().to_string(),
                sha256,
                data.len() as i64,
            )
            .map_err(CommandError::from)
        });

        if let Err(e) = result {
            log::warn!("Failed to store {} artifact for run {}: {}", kind.as_str(), run_id, e.message);
        }
    }

    /// Register an already-written trace file
    async fn record_trace(&self, run_id: &Uuid, trace: &TraceWriter) {
        let Some(db) = self.db.as_ref() else {
            return;
        };
        let data = match tokio::fs::read(trace.path()).await {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Failed to read trace for run {}: {}", run_id, e);
                return;
            }
        };

        if let Err(e) = state::create_artifact(
            db,
            *run_id,
            ArtifactKind::Trace,
            trace.path().to_string_lossy().to_string(),
            state::calculate_sha256(&data),
            data.len() as i64,
        ) {
            log::warn!("Failed to register trace for run {}: {}", run_id, e);
        }
    }

    fn finish_run(&self, run_id: &Uuid, composition: &Composition) {
        match composition.to_json_pretty() {
            Ok(json) => self.record_artifact(
                run_id,
                ArtifactKind::Composition,
                "composition.json",
                json.as_bytes(),
            ),
            Err(e) => log::warn!("Failed to serialize composition for run {}: {}", run_id, e),
        }

        match export::export_midi(composition, &MidiExportOptions::default()) {
            Ok(bytes) => self.record_artifact(run_id, ArtifactKind::Midi, "composition.mid", &bytes),
            Err(e) => log::warn!("Skipping MIDI artifact for run {}: {}", run_id, e),
        }

        if let Some(db) = self.db.as_ref() {
            let outcome = RunOutcome::from_composition(composition);
            if let Err(e) = state::complete_run(db, run_id, &outcome) {
                log::warn!("Failed to mark run {} complete: {}", run_id, e);
            }
        }
    }

    fn fail_run(&self, run_id: &Uuid, message: &str) {
        if let Some(db) = self.db.as_ref() {
            if let Err(e) = state::fail_run(db, run_id, message) {
                log::warn!("Failed to mark run {} failed: {}", run_id, e);
            }
        }
    }
}

// ==================== COMPOSITION COMMANDS ====================

/// Run the full pipeline for one request.
///
/// Failures come back as `{success: false, error}` carrying the single
/// user-facing message; no partial composition is ever returned.
pub async fn compose(state: &AppState, input: RawInput) -> CommandResponse<Composition> {
    run_composition(state, &input).await.into()
}

async fn run_composition(state: &AppState, input: &RawInput) -> CommandResult<Composition> {
    let run_id = state.begin_run(input);
    let trace = run_id
        .or_else(|| state.trace.then(Uuid::new_v4))
        .and_then(|id| state.trace_writer(&id));

    let result = state.pipeline.run_traced(input, trace.as_ref()).await;

    if let Some(run_id) = run_id {
        match &result {
            Ok(composition) => state.finish_run(&run_id, composition),
            Err(e) => state.fail_run(&run_id, &e.user_message()),
        }
        if let Some(trace) = &trace {
            state.record_trace(&run_id, trace).await;
        }
    }

    result.map_err(|e| CommandError {
        message: e.user_message(),
    })
}

// ==================== RUN COMMANDS ====================

fn ledger(state: &AppState) -> CommandResult<&DbConnection> {
    state.db().ok_or_else(|| CommandError {
        message: "Run recording is disabled".to_string(),
    })
}

pub fn list_runs(state: &AppState, limit: u32) -> CommandResponse<Vec<Run>> {
    ledger(state)
        .and_then(|db| state::list_runs(db, limit).map_err(CommandError::from))
        .into()
}

pub fn get_run_with_artifacts(
    state: &AppState,
    id: &str,
) -> CommandResponse<Option<RunWithArtifacts>> {
    let result = ledger(state).and_then(|db| {
        let uuid = Uuid::parse_str(id)?;
        state::get_run_with_artifacts(db, &uuid).map_err(CommandError::from)
    });
    result.into()
}

// ==================== EXPORT COMMANDS ====================

#[derive(Debug, Deserialize)]
pub struct ExportMidiInput {
    pub composition: Composition,
    pub ppq: Option<u16>,
    pub include_tempo: Option<bool>,
    pub include_narration: Option<bool>,
    pub track_names: Option<bool>,
}

/// Export a composition as MIDI file bytes
pub fn export_midi_command(input: &ExportMidiInput) -> CommandResponse<Vec<u8>> {
    let mut options = MidiExportOptions::default();
    if let Some(ppq) = input.ppq {
        options.ppq = ppq;
    }
    if let Some(include_tempo) = input.include_tempo {
        options.include_tempo = include_tempo;
    }
    if let Some(include_narration) = input.include_narration {
        options.include_narration = include_narration;
    }
    if let Some(track_names) = input.track_names {
        options.track_names = track_names;
    }

    export::export_midi(&input.composition, &options)
        .map_err(|e| CommandError {
            message: format!("Failed to export MIDI: {}", e),
        })
        .into()
}

// ==================== TIMELINE COMMANDS ====================

/// Everything the playback consumers show at one instant
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    pub time: f64,
    pub formatted_time: String,
    pub formatted_duration: String,
    pub progress_percent: f64,
    pub active_note: Option<Note>,
    pub narration_index: Option<usize>,
    pub narration_line: Option<NarrationLine>,
    pub inspector: InspectorView,
}

pub fn inspect_at(composition: &Composition, time: f64) -> CommandResponse<InspectResult> {
    if !time.is_finite() {
        return CommandResponse::err(format!("Invalid playback time: {}", time));
    }

    let index = TimelineIndex::new(composition);
    let frame = index.frame(time);
    let duration = index.duration();

    CommandResponse::ok(InspectResult {
        time,
        formatted_time: format_time(time),
        formatted_duration: format_time(duration),
        progress_percent: progress_percent(time, duration),
        active_note: frame.active_note.cloned(),
        narration_index: frame.narration_index,
        narration_line: index.active_narration_line(time).cloned(),
        inspector: InspectorView::at(Some(composition), time),
    })
}
