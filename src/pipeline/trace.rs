// Pipeline stage tracing
// Append-only JSONL record of one composition run, stage by stage

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A single trace entry for one stage transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp of when this entry was created
    pub timestamp: String,

    /// Run this entry belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    /// Stage name (e.g., "Analyzer", "Normalizer")
    pub stage: String,

    /// Overall run progress [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Optional structured data (note counts, errors, timings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: None,
            stage: stage.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends entries for one run to a JSONL file
pub struct TraceWriter {
    file_path: PathBuf,
    run_id: Option<Uuid>,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter {
            file_path,
            run_id: None,
        }
    }

    /// Stamp every written entry with `run_id`
    pub fn for_run(file_path: PathBuf, run_id: Uuid) -> Self {
        TraceWriter {
            file_path,
            run_id: Some(run_id),
        }
    }

    /// Append one entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let line = match self.run_id {
            Some(run_id) if entry.run_id.is_none() => TraceEntry {
                run_id: Some(run_id),
                ..entry.clone()
            }
            .to_json_line()?,
            _ => entry.to_json_line()?,
        };

        file.write_all(line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Append an entry, logging instead of failing
    pub fn record(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!(
                "Failed to write trace entry to {}: {}",
                self.file_path.display(),
                e
            );
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_clamping() {
        let low = TraceEntry::new("Analyzer", -0.5, "start");
        assert_eq!(low.progress, 0.0);

        let high = TraceEntry::new("Analyzer", 1.5, "done");
        assert_eq!(high.progress, 1.0);
    }

    #[test]
    fn test_json_line_format() {
        let entry = TraceEntry::new("Composer", 0.5, "Composing");
        let line = entry.to_json_line().unwrap();

        assert!(line.ends_with('\n'));
        assert!(!line.contains("run_id"));
        let parsed: TraceEntry = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.stage, "Composer");
    }

    #[test]
    fn test_writer_stamps_run_id() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let run_id = Uuid::new_v4();

        let writer = TraceWriter::for_run(trace_path.clone(), run_id);
        writer.record(TraceEntry::new("Analyzer", 0.0, "Start"));
        writer.record(
            TraceEntry::new("Normalizer", 0.7, "Normalized")
                .with_data(serde_json::json!({"notes": 12})),
        );

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.run_id == Some(run_id)));
        assert_eq!(entries[1].data.as_ref().unwrap()["notes"], 12);
    }

    #[test]
    fn test_record_swallows_io_errors() {
        let temp_dir = TempDir::new().unwrap();
        let writer = TraceWriter::new(temp_dir.path().join("missing").join("trace.jsonl"));

        // Parent directory does not exist; must not panic
        writer.record(TraceEntry::new("Analyzer", 0.0, "Start"));
        assert!(writer.write(&TraceEntry::new("Analyzer", 0.0, "Start")).is_err());
    }
}
