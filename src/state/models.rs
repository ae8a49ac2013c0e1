// Data models for the run ledger
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::composition::{Composition, InputKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub input_type: InputKind,
    pub input_sha256: String,
    pub input_bytes: i64,
    pub status: RunStatus,
    /// User-facing failure message for failed runs
    pub error: Option<String>,
    pub key: Option<String>,
    pub tempo: Option<f64>,
    pub note_count: Option<i64>,
    pub duration_seconds: Option<f64>,
}

/// Summary of a successful run, written when it completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub key: String,
    pub tempo: f64,
    pub note_count: i64,
    pub duration_seconds: f64,
}

impl RunOutcome {
    pub fn from_composition(composition: &Composition) -> Self {
        RunOutcome {
            key: composition.audio_mapping.key.clone(),
            tempo: composition.audio_mapping.tempo,
            note_count: composition.notes().len() as i64,
            duration_seconds: composition.duration(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending" => RunStatus::Pending,
            "processing" => RunStatus::Processing,
            "complete" => RunStatus::Complete,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub run_id: Uuid,
    pub kind: ArtifactKind,
    pub path: String,
    pub sha256: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Composition,
    Trace,
    Midi,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Composition => "composition",
            ArtifactKind::Trace => "trace",
            ArtifactKind::Midi => "midi",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "composition" => Some(ArtifactKind::Composition),
            "trace" => Some(ArtifactKind::Trace),
            "midi" => Some(ArtifactKind::Midi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWithArtifacts {
    pub run: Run,
    pub artifacts: Vec<Artifact>,
}
