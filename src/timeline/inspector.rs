// Data inspector
// Explains which source data point is behind the note sounding at the playhead

use serde::{Deserialize, Serialize};

use super::index::TimelineIndex;
use crate::composition::{Composition, Note};

/// Shown when a composition is loaded but no note is sounding
pub const SCRUB_PLACEHOLDER: &str = "Scrub the waveform to inspect data points.";

/// Shown when there is no composition at all
pub const EMPTY_PLACEHOLDER: &str = "No data to inspect.";

/// Details of the note under the playhead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDetails {
    pub time: f64,
    pub pitch: String,
    pub duration: f64,
    /// Provenance label of the data that produced the note
    pub source: String,
}

impl NoteDetails {
    pub fn from_note(note: &Note) -> Self {
        NoteDetails {
            time: note.time,
            pitch: note.note.clone(),
            duration: note.duration,
            source: note.data_point.clone(),
        }
    }

    /// Human-readable lines, one per field
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Time: {:.2}s", self.time),
            format!("Pitch: {}", self.pitch),
            format!("Duration: {:.2}s", self.duration),
            format!("Source: {}", self.source),
        ]
    }
}

/// What the data inspector shows at one playback time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InspectorView {
    Note(NoteDetails),
    Placeholder { message: String },
}

impl InspectorView {
    pub fn at(composition: Option<&Composition>, time: f64) -> Self {
        let Some(composition) = composition else {
            return InspectorView::placeholder(EMPTY_PLACEHOLDER);
        };

        match TimelineIndex::new(composition).active_note(time) {
            Some(note) => InspectorView::Note(NoteDetails::from_note(note)),
            None => InspectorView::placeholder(SCRUB_PLACEHOLDER),
        }
    }

    fn placeholder(message: &str) -> Self {
        InspectorView::Placeholder {
            message: message.to_string(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            InspectorView::Note(details) => details.lines().join("\n"),
            InspectorView::Placeholder { message } => message.clone(),
        }
    }
}
