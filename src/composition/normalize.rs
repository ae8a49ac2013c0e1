// Note normalization
// Turns the Composer's untrusted dataMapping into sorted, validated notes

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{InputKind, Note};

/// Velocity applied when a record carries none
pub const DEFAULT_VELOCITY: f64 = 0.8;

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error(
        "Composer AI failed to generate a valid musical structure (expected an array or keyed mapping of notes, got {found})."
    )]
    InvalidMusicalStructure { found: &'static str },
}

/// Validated notes plus the derived composition length
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedNotes {
    /// Sorted by ascending start time, ties keep emission order
    pub notes: Vec<Note>,
    /// Max `time + duration` over all notes, 0 if none
    pub duration: f64,
}

/// Normalize a raw `dataMapping` value.
///
/// Accepts an array of records or a keyed mapping of records. Individual
/// malformed records are dropped; only a value that is not a collection at
/// all is an error.
///
/// # Arguments
/// * `data_mapping` - The Composer's raw `dataMapping`
/// * `kind` - Original input kind, selects the provenance label
/// * `input_data` - Original input text, used for CSV row lookup
pub fn normalize_data_mapping(
    data_mapping: &Value,
    kind: InputKind,
    input_data: Option<&str>,
) -> Result<NormalizedNotes, NormalizeError> {
    let records: Vec<&Value> = match data_mapping {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => object_values_in_enumeration_order(map),
        other => {
            log::error!("Composer dataMapping is not a collection: {}", other);
            return Err(NormalizeError::InvalidMusicalStructure {
                found: json_type_name(other),
            });
        }
    };

    let csv_rows = match (kind, input_data) {
        (InputKind::Csv, Some(data)) => Some(split_csv_rows(data)),
        _ => None,
    };

    let mut notes = Vec::with_capacity(records.len());
    let mut duration: f64 = 0.0;
    let mut dropped = 0usize;

    for (index, record) in records.iter().enumerate() {
        let Some(mut note) = note_from_record(record) else {
            log::debug!("Dropping malformed note record {}: {}", index, record);
            dropped += 1;
            continue;
        };

        note.data_point = provenance_label(csv_rows.as_deref(), kind, index);
        duration = duration.max(note.end_time());
        notes.push(note);
    }

    if dropped > 0 {
        log::warn!(
            "Dropped {} of {} note records from Composer output",
            dropped,
            records.len()
        );
    }

    // Stable: equal start times keep emission order
    notes.sort_by(|a, b| a.time.total_cmp(&b.time));

    Ok(NormalizedNotes { notes, duration })
}

/// Build a note from one record, or `None` if the record is malformed
fn note_from_record(record: &Value) -> Option<Note> {
    let fields = record.as_object()?;

    let pitch = pitch_name(fields.get("note")?)?;
    let time = coerce_number(fields.get("time")?)?;
    let duration = coerce_number(fields.get("duration")?)?;

    if time < 0.0 || duration <= 0.0 {
        return None;
    }

    let velocity = match fields.get("velocity") {
        None | Some(Value::Null) => DEFAULT_VELOCITY,
        Some(raw) => coerce_number(raw)
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_VELOCITY),
    };

    Some(Note {
        time,
        note: pitch,
        duration,
        velocity,
        data_point: String::new(),
    })
}

/// Accept a non-empty pitch string or a non-zero numeric pitch
fn pitch_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a JSON number or numeric string to a finite f64
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    number.is_finite().then_some(number)
}

/// Values of a keyed mapping in property enumeration order: array-index
/// keys ascending numerically first, then the remaining keys as inserted.
fn object_values_in_enumeration_order(map: &Map<String, Value>) -> Vec<&Value> {
    let mut indexed: Vec<(u32, &Value)> = Vec::new();
    let mut named: Vec<&Value> = Vec::new();

    for (key, value) in map {
        match array_index_key(key) {
            Some(index) => indexed.push((index, value)),
            None => named.push(value),
        }
    }

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, v)| v).chain(named).collect()
}

/// Canonical array index ("0", "1", ... without leading zeros)
fn array_index_key(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|index| *index < u32::MAX)
}

fn split_csv_rows(data: &str) -> Vec<Vec<&str>> {
    data.split('\n')
        .map(|row| row.strip_suffix('\r').unwrap_or(row))
        .map(|row| row.split(',').collect())
        .collect()
}

/// Label the note at `index` with its CSV row (row 0 is the header), or a
/// generic positional label
fn provenance_label(csv_rows: Option<&[Vec<&str>]>, kind: InputKind, index: usize) -> String {
    if let Some(row) = csv_rows.and_then(|rows| rows.get(index + 1)) {
        let label = row.join(", ");
        if !label.trim().is_empty() {
            return label;
        }
    }

    format!("{} {}", kind.segment_label(), index + 1)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_sorts_and_derives_duration() {
        let mapping = json!([
            {"time": 2.0, "note": "G4", "duration": 0.5, "velocity": 0.6},
            {"time": 0.0, "note": "C4", "duration": 1.0, "velocity": 0.8},
            {"time": 0.5, "note": "E4", "duration": 3.0}
        ]);

        let result = normalize_data_mapping(&mapping, InputKind::Text, None).unwrap();

        let pitches: Vec<&str> = result.notes.iter().map(|n| n.note.as_str()).collect();
        assert_eq!(pitches, vec!["C4", "E4", "G4"]);
        assert_eq!(result.duration, 3.5);
    }

    #[test]
    fn test_keyed_mapping_matches_array_form() {
        let array = json!([
            {"time": 0, "note": "C4", "duration": 1},
            {"time": 1, "note": "D4", "duration": 1}
        ]);
        let keyed = json!({
            "0": {"time": 0, "note": "C4", "duration": 1},
            "1": {"time": 1, "note": "D4", "duration": 1}
        });

        let from_array = normalize_data_mapping(&array, InputKind::Text, None).unwrap();
        let from_keyed = normalize_data_mapping(&keyed, InputKind::Text, None).unwrap();

        assert_eq!(from_array, from_keyed);
    }

    #[test]
    fn test_keyed_mapping_uses_numeric_key_order() {
        let keyed = json!({
            "10": {"time": 0, "note": "B4", "duration": 1},
            "2": {"time": 0, "note": "A4", "duration": 1},
            "intro": {"time": 0, "note": "G4", "duration": 1}
        });

        let result = normalize_data_mapping(&keyed, InputKind::Text, None).unwrap();

        // Equal start times keep enumeration order: "2", "10", then named keys
        let pitches: Vec<&str> = result.notes.iter().map(|n| n.note.as_str()).collect();
        assert_eq!(pitches, vec!["A4", "B4", "G4"]);
        assert_eq!(result.notes[0].data_point, "Text segment 1");
        assert_eq!(result.notes[2].data_point, "Text segment 3");
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let mapping = json!([
            {"time": 0, "duration": 1},
            {"time": "soon", "note": "C4", "duration": 1},
            {"time": 0, "note": "D4", "duration": "long"},
            {"time": 0, "note": "", "duration": 1},
            "not a record",
            {"time": "1.5", "note": "E4", "duration": "0.25"}
        ]);

        let result = normalize_data_mapping(&mapping, InputKind::Text, None).unwrap();

        assert_eq!(result.notes.len(), 1);
        assert_eq!(result.notes[0].note, "E4");
        assert_eq!(result.notes[0].time, 1.5);
        assert_eq!(result.notes[0].data_point, "Text segment 6");
        assert_eq!(result.duration, 1.75);
    }

    #[test]
    fn test_negative_time_and_zero_duration_are_dropped() {
        let mapping = json!([
            {"time": -1, "note": "C4", "duration": 1},
            {"time": 0, "note": "D4", "duration": 0},
            {"time": 0, "note": "E4", "duration": 1}
        ]);

        let result = normalize_data_mapping(&mapping, InputKind::Text, None).unwrap();
        assert_eq!(result.notes.len(), 1);
        assert_eq!(result.notes[0].note, "E4");
    }

    #[test]
    fn test_null_and_blank_numbers_are_not_zero() {
        let mapping = json!([
            {"time": null, "note": "C4", "duration": 1},
            {"time": "", "note": "D4", "duration": 1},
            {"time": 0, "note": "E4", "duration": null},
            {"time": 0, "note": "F4", "duration": "  "},
            {"time": true, "note": "G4", "duration": 1},
            {"time": 0, "note": "A4", "duration": 1}
        ]);

        let result = normalize_data_mapping(&mapping, InputKind::Text, None).unwrap();

        assert_eq!(result.notes.len(), 1);
        assert_eq!(result.notes[0].note, "A4");
        assert_eq!(result.notes[0].data_point, "Text segment 6");
    }

    #[test]
    fn test_velocity_defaults_and_clamps() {
        let mapping = json!([
            {"time": 0, "note": "C4", "duration": 1},
            {"time": 1, "note": "D4", "duration": 1, "velocity": null},
            {"time": 2, "note": "E4", "duration": 1, "velocity": 1.7},
            {"time": 3, "note": "F4", "duration": 1, "velocity": "0.25"}
        ]);

        let result = normalize_data_mapping(&mapping, InputKind::Text, None).unwrap();
        let velocities: Vec<f64> = result.notes.iter().map(|n| n.velocity).collect();

        assert_eq!(velocities, vec![0.8, 0.8, 1.0, 0.25]);
    }

    #[test]
    fn test_csv_provenance_skips_header() {
        let mapping = json!([{"time": 0, "note": "C4", "duration": 1}]);

        let result = normalize_data_mapping(&mapping, InputKind::Csv, Some("a,b\n1,2")).unwrap();

        assert_eq!(result.notes[0].data_point, "1, 2");
    }

    #[test]
    fn test_csv_provenance_falls_back_past_last_row() {
        let mapping = json!([
            {"time": 0, "note": "C4", "duration": 1},
            {"time": 1, "note": "D4", "duration": 1}
        ]);

        let result =
            normalize_data_mapping(&mapping, InputKind::Csv, Some("month,sales\r\nJan,10\r\n"))
                .unwrap();

        assert_eq!(result.notes[0].data_point, "Jan, 10");
        assert_eq!(result.notes[1].data_point, "Data point 2");
    }

    #[test]
    fn test_non_collection_is_rejected() {
        for value in [json!("C4 D4 E4"), json!(null), json!(42), json!(true)] {
            let err = normalize_data_mapping(&value, InputKind::Text, None).unwrap_err();
            assert!(matches!(err, NormalizeError::InvalidMusicalStructure { .. }));
        }
    }

    #[test]
    fn test_empty_collection_yields_no_notes() {
        let result = normalize_data_mapping(&json!([]), InputKind::Text, None).unwrap();
        assert!(result.notes.is_empty());
        assert_eq!(result.duration, 0.0);
    }

    #[test]
    fn test_array_index_key() {
        assert_eq!(array_index_key("0"), Some(0));
        assert_eq!(array_index_key("42"), Some(42));
        assert_eq!(array_index_key("007"), None);
        assert_eq!(array_index_key("-1"), None);
        assert_eq!(array_index_key("note1"), None);
        assert_eq!(array_index_key(""), None);
    }
}
