// MIDI Export - Convert compositions to MIDI files using midly crate
// Produces DAW-friendly MIDI files with tempo, instrument names and narration markers

use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::composition::{midi_note_number, Composition, Note};

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiExportOptions {
    /// Pulses per quarter note (PPQ) - typically 480 or 960
    pub ppq: u16,

    /// Include tempo metadata
    pub include_tempo: bool,

    /// Write narration lines as marker events
    pub include_narration: bool,

    /// Include track names
    pub track_names: bool,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            include_tempo: true,
            include_narration: true,
            track_names: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum MidiExportError {
    #[error("Invalid tempo for MIDI export: {0}")]
    InvalidTempo(f64),

    #[error("Invalid PPQ for MIDI export: {0}")]
    InvalidPpq(u16),

    #[error("Failed to write MIDI: {0}")]
    Write(String),
}

const NOTE_CHANNEL: u8 = 0;

/// Export a composition to MIDI file bytes.
///
/// Track 0 carries the tempo and narration markers, track 1 the notes.
/// Notes whose pitch name cannot be parsed are skipped.
pub fn export_midi(
    composition: &Composition,
    options: &MidiExportOptions,
) -> Result<Vec<u8>, MidiExportError> {
    let tempo = composition.audio_mapping.tempo;
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(MidiExportError::InvalidTempo(tempo));
    }
    // Metrical timing only has 15 bits
    if options.ppq == 0 || options.ppq > 0x7FFF {
        return Err(MidiExportError::InvalidPpq(options.ppq));
    }

    let header = Header {
        format: midly::Format::Parallel,
        timing: Timing::Metrical(options.ppq.into()),
    };

    let ticks_per_second = calculate_ticks_per_second(tempo, options.ppq);

    let meta_track = create_meta_track(composition, ticks_per_second, options);
    let note_track = create_note_track(composition, ticks_per_second, options);

    let smf = Smf {
        header,
        tracks: vec![meta_track, note_track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| MidiExportError::Write(e.to_string()))?;

    log::info!(
        "Exported MIDI: {} notes at {:.1} BPM, {} bytes",
        composition.notes().len(),
        tempo,
        bytes.len()
    );

    Ok(bytes)
}

/// Tempo, song title and narration markers
fn create_meta_track<'a>(
    composition: &'a Composition,
    ticks_per_second: f64,
    options: &MidiExportOptions,
) -> Track<'a> {
    let mut events: Vec<(u32, TrackEventKind<'a>)> = Vec::new();

    if options.track_names {
        events.push((
            0,
            TrackEventKind::Meta(MetaMessage::TrackName(
                composition.audio_mapping.key.as_bytes(),
            )),
        ));
    }

    if options.include_tempo {
        events.push((0, tempo_event(composition.audio_mapping.tempo)));
    }

    if options.include_narration {
        for line in &composition.narration_script {
            let tick = seconds_to_ticks(line.timestamp, ticks_per_second);
            events.push((
                tick,
                TrackEventKind::Meta(MetaMessage::Marker(line.text.as_bytes())),
            ));
        }
    }

    // Narration is not re-sorted upstream; markers must be
    events.sort_by_key(|(tick, _)| *tick);
    finish_track(events, 0)
}

/// Note on/off pairs on a single channel
fn create_note_track<'a>(
    composition: &'a Composition,
    ticks_per_second: f64,
    options: &MidiExportOptions,
) -> Track<'a> {
    let mut events: Vec<(u32, u8, TrackEventKind<'a>)> = Vec::new();

    if options.track_names {
        if let Some(instrument) = composition.audio_mapping.instrumentation.first() {
            events.push((
                0,
                0,
                TrackEventKind::Meta(MetaMessage::TrackName(instrument.as_bytes())),
            ));
        }
    }

    let mut skipped = 0usize;
    let mut end_tick = 0u32;

    for note in composition.notes() {
        let Some(key) = midi_note_number(&note.note) else {
            log::debug!("Skipping unparsable pitch {:?} at {:.3}s", note.note, note.time);
            skipped += 1;
            continue;
        };

        let tick_on = seconds_to_ticks(note.time, ticks_per_second);
        let tick_off = seconds_to_ticks(note.end_time(), ticks_per_second).max(tick_on + 1);
        end_tick = end_tick.max(tick_off);

        // Note-offs sort before note-ons on the same tick so repeated pitches retrigger
        events.push((
            tick_on,
            2,
            TrackEventKind::Midi {
                channel: NOTE_CHANNEL.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: midi_velocity(note).into(),
                },
            },
        ));
        events.push((
            tick_off,
            1,
            TrackEventKind::Midi {
                channel: NOTE_CHANNEL.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    if skipped > 0 {
        log::warn!("Skipped {} notes with unparsable pitch names", skipped);
    }

    events.sort_by_key(|(tick, order, _)| (*tick, *order));
    let events = events.into_iter().map(|(tick, _, kind)| (tick, kind)).collect();
    finish_track(events, end_tick)
}

/// Convert absolute ticks to deltas and close the track
fn finish_track<'a>(events: Vec<(u32, TrackEventKind<'a>)>, end_tick: u32) -> Track<'a> {
    let mut track = Track::new();
    let mut last_tick = 0;

    for (tick, kind) in events {
        let delta = tick.saturating_sub(last_tick);
        track.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
        last_tick = last_tick.max(tick);
    }

    track.push(TrackEvent {
        delta: end_tick.saturating_sub(last_tick).into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    track
}

fn tempo_event<'a>(bpm: f64) -> TrackEventKind<'a> {
    // 24-bit microseconds per quarter note
    let us_per_quarter = ((60_000_000.0 / bpm).round() as u32).clamp(1, 0x00FF_FFFF);
    TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into()))
}

fn calculate_ticks_per_second(bpm: f64, ppq: u16) -> f64 {
    ppq as f64 * bpm / 60.0
}

fn seconds_to_ticks(seconds: f64, ticks_per_second: f64) -> u32 {
    let ticks = (seconds.max(0.0) * ticks_per_second).round();
    // Delta times are 28-bit
    ticks.min(0x0FFF_FFFF as f64) as u32
}

/// `round(velocity * 127)`, kept audible
fn midi_velocity(note: &Note) -> u8 {
    (note.velocity * 127.0).round().clamp(1.0, 127.0) as u8
}
