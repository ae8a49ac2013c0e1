// Timeline index
// Maps a playback time to the sounding note and the active narration line

use serde::Serialize;

use crate::composition::{Composition, NarrationLine, Note};

/// Read-only query layer over a fixed composition.
///
/// Every query is a pure function of `(composition, time)` and is meant to be
/// called once per playback tick.
#[derive(Debug, Clone, Copy)]
pub struct TimelineIndex<'a> {
    composition: &'a Composition,
}

/// Snapshot of the timeline at one playback tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineFrame<'a> {
    pub time: f64,
    pub active_note: Option<&'a Note>,
    pub narration_index: Option<usize>,
}

impl<'a> TimelineIndex<'a> {
    pub fn new(composition: &'a Composition) -> Self {
        TimelineIndex { composition }
    }

    pub fn composition(&self) -> &'a Composition {
        self.composition
    }

    pub fn duration(&self) -> f64 {
        self.composition.duration()
    }

    /// The most recently started note, if it is still sounding at `time`.
    ///
    /// Notes are sorted by start time, so the candidate is the last note with
    /// `note.time <= time`. Among equal start times the later-emitted note wins.
    pub fn active_note(&self, time: f64) -> Option<&'a Note> {
        let notes = self.composition.notes();
        let started = notes.partition_point(|note| note.time <= time);

        let candidate = notes.get(started.checked_sub(1)?)?;
        candidate.is_sounding_at(time).then_some(candidate)
    }

    /// Index of the last narration line whose timestamp is `<= time`.
    ///
    /// The script is kept in emitted order and never re-sorted, so this scans
    /// backward instead of bisecting.
    pub fn active_narration_index(&self, time: f64) -> Option<usize> {
        self.composition
            .narration_script
            .iter()
            .rposition(|line| line.timestamp <= time)
    }

    pub fn active_narration_line(&self, time: f64) -> Option<&'a NarrationLine> {
        self.active_narration_index(time)
            .map(|index| &self.composition.narration_script[index])
    }

    /// Notes with `from <= note.time < to`, for look-ahead scheduling
    pub fn notes_starting_in(&self, from: f64, to: f64) -> &'a [Note] {
        let notes = self.composition.notes();
        if to <= from {
            return &notes[..0];
        }

        let start = notes.partition_point(|note| note.time < from);
        let end = notes.partition_point(|note| note.time < to);
        &notes[start..end.max(start)]
    }

    pub fn frame(&self, time: f64) -> TimelineFrame<'a> {
        TimelineFrame {
            time,
            active_note: self.active_note(time),
            narration_index: self.active_narration_index(time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::AudioMapping;

    fn note(time: f64, pitch: &str, duration: f64) -> Note {
        Note {
            time,
            note: pitch.to_string(),
            duration,
            velocity: 0.8,
            data_point: format!("{} @ {}", pitch, time),
        }
    }

    fn line(timestamp: f64, text: &str) -> NarrationLine {
        NarrationLine {
            timestamp,
            text: text.to_string(),
        }
    }

    fn composition(notes: Vec<Note>, narration: Vec<NarrationLine>) -> Composition {
        let duration = notes.iter().map(Note::end_time).fold(0.0, f64::max);
        Composition {
            audio_mapping: AudioMapping {
                key: "A minor".to_string(),
                tempo: 100.0,
                instrumentation: vec!["piano".to_string()],
                data_mapping: notes,
                duration,
            },
            narration_script: narration,
        }
    }

    #[test]
    fn test_no_note_before_first_start() {
        let comp = composition(vec![note(1.0, "C4", 1.0)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert!(index.active_note(0.0).is_none());
        assert!(index.active_note(0.999).is_none());
        assert_eq!(index.active_note(1.0).unwrap().note, "C4");
    }

    #[test]
    fn test_no_note_at_or_after_duration() {
        let comp = composition(vec![note(0.0, "C4", 1.0), note(0.5, "E4", 0.5)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert_eq!(index.duration(), 1.0);
        assert!(index.active_note(1.0).is_none());
        assert!(index.active_note(7.5).is_none());
    }

    #[test]
    fn test_overlap_prefers_latest_start() {
        let comp = composition(vec![note(0.0, "C4", 1.0), note(0.5, "E4", 0.5)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert_eq!(index.active_note(0.25).unwrap().note, "C4");
        assert_eq!(index.active_note(0.5).unwrap().note, "E4");
        assert_eq!(index.active_note(0.99).unwrap().note, "E4");
    }

    #[test]
    fn test_ended_latest_note_hides_longer_earlier_note() {
        // C4 still rings at 0.8 but the most recently started note has ended
        let comp = composition(vec![note(0.0, "C4", 2.0), note(0.5, "E4", 0.2)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert_eq!(index.active_note(0.6).unwrap().note, "E4");
        assert!(index.active_note(0.8).is_none());
    }

    #[test]
    fn test_gap_between_notes() {
        let comp = composition(vec![note(0.0, "C4", 0.5), note(1.0, "D4", 0.5)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert!(index.active_note(0.75).is_none());
        assert_eq!(index.active_note(1.2).unwrap().note, "D4");
    }

    #[test]
    fn test_equal_start_times_pick_later_emitted() {
        let comp = composition(vec![note(0.0, "C4", 1.0), note(0.0, "G4", 1.0)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert_eq!(index.active_note(0.1).unwrap().note, "G4");
    }

    #[test]
    fn test_narration_boundaries() {
        let comp = composition(
            vec![note(0.0, "C4", 10.0)],
            vec![line(1.0, "first"), line(4.0, "second"), line(8.0, "third")],
        );
        let index = TimelineIndex::new(&comp);

        assert!(index.active_narration_line(0.99).is_none());
        assert_eq!(index.active_narration_line(1.0).unwrap().text, "first");
        assert_eq!(index.active_narration_line(3.99).unwrap().text, "first");
        assert_eq!(index.active_narration_line(4.0).unwrap().text, "second");
        assert_eq!(index.active_narration_line(100.0).unwrap().text, "third");
        assert_eq!(index.active_narration_index(5.0), Some(1));
    }

    #[test]
    fn test_empty_narration_script() {
        let comp = composition(vec![note(0.0, "C4", 1.0)], vec![]);
        let index = TimelineIndex::new(&comp);

        assert!(index.active_narration_line(0.5).is_none());
        assert!(index.active_narration_index(0.5).is_none());
    }

    #[test]
    fn test_notes_starting_in_window() {
        let comp = composition(
            vec![
                note(0.0, "C4", 0.5),
                note(0.5, "D4", 0.5),
                note(1.0, "E4", 0.5),
                note(1.5, "F4", 0.5),
            ],
            vec![],
        );
        let index = TimelineIndex::new(&comp);

        let window: Vec<&str> = index
            .notes_starting_in(0.5, 1.5)
            .iter()
            .map(|n| n.note.as_str())
            .collect();
        assert_eq!(window, vec!["D4", "E4"]);
        assert!(index.notes_starting_in(1.5, 1.0).is_empty());
        assert!(index.notes_starting_in(2.0, 3.0).is_empty());
    }

    #[test]
    fn test_frame_snapshot() {
        let comp = composition(vec![note(0.0, "C4", 1.0)], vec![line(0.0, "hello")]);
        let index = TimelineIndex::new(&comp);

        let frame = index.frame(0.5);
        assert_eq!(frame.active_note.unwrap().note, "C4");
        assert_eq!(frame.narration_index, Some(0));

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["activeNote"]["note"], "C4");
        assert_eq!(json["narrationIndex"], 0);
    }
}
