// Composition data model
// Analysis, raw and normalized audio mappings, notes and narration

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of user input fed into the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Comma-separated rows, first row is a header
    Csv,
    /// Free-form text
    Text,
}

impl InputKind {
    /// Parse from the wire representation ("csv" / "text")
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(InputKind::Csv),
            "text" => Some(InputKind::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Csv => "csv",
            InputKind::Text => "text",
        }
    }

    /// Label prefix used when a note has no CSV row to point at
    pub fn segment_label(&self) -> &'static str {
        match self {
            InputKind::Csv => "Data point",
            InputKind::Text => "Text segment",
        }
    }
}

/// Unvalidated request as it arrives at the outer boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
    #[serde(rename = "type")]
    pub input_type: String,
    pub data: String,
}

/// Validated pipeline input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionInput {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub data: String,
}

impl CompositionInput {
    pub fn new(kind: InputKind, data: impl Into<String>) -> Self {
        CompositionInput {
            kind,
            data: data.into(),
        }
    }
}

/// Structured analysis produced by the Analyzer stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub trends: String,
    pub patterns: String,
    pub sentiment: String,
}

impl Analysis {
    /// Canonical JSON text threaded into the Composer and Narrator stages
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Composer output before normalization.
///
/// `data_mapping` is model-generated and untrusted; it only ever leaves this
/// shape through [`crate::composition::normalize_data_mapping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAudioMapping {
    pub key: String,
    pub tempo: f64,
    pub instrumentation: Vec<String>,
    pub data_mapping: Value,
}

/// A single timed musical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Start time in seconds (>= 0)
    pub time: f64,

    /// Pitch name, e.g. "C4"
    pub note: String,

    /// Duration in seconds (> 0)
    pub duration: f64,

    /// Velocity [0.0, 1.0]
    pub velocity: f64,

    /// Human-readable label of the source data that produced this note
    pub data_point: String,
}

impl Note {
    /// Time at which this note stops sounding
    pub fn end_time(&self) -> f64 {
        self.time + self.duration
    }

    /// Whether `time` falls inside the half-open window [start, end)
    pub fn is_sounding_at(&self, time: f64) -> bool {
        self.time <= time && time < self.end_time()
    }
}

/// Normalized audio mapping with derived duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMapping {
    pub key: String,
    pub tempo: f64,
    pub instrumentation: Vec<String>,
    /// Notes sorted by ascending start time
    pub data_mapping: Vec<Note>,
    /// Max end time over all notes, 0 if none
    pub duration: f64,
}

/// One line of the timed narration script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationLine {
    pub timestamp: f64,
    pub text: String,
}

/// Terminal artifact of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    pub audio_mapping: AudioMapping,
    pub narration_script: Vec<NarrationLine>,
}

impl Composition {
    pub fn notes(&self) -> &[Note] {
        &self.audio_mapping.data_mapping
    }

    pub fn duration(&self) -> f64 {
        self.audio_mapping.duration
    }

    /// Load a composition previously written as JSON.
    ///
    /// Files edited by hand may list notes out of order; they are stably
    /// re-sorted by start time so timeline lookups can bisect.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut composition: Composition = serde_json::from_slice(bytes)?;
        composition
            .audio_mapping
            .data_mapping
            .sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(composition)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
