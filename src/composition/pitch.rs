// Pitch names
// Scientific pitch notation ("C4", "F#3", "Bb5") to MIDI note numbers

/// Octave assumed when a pitch name carries none
pub const DEFAULT_OCTAVE: i32 = 4;

/// Parse a pitch name into a MIDI note number (C4 = 60).
///
/// Accepts a letter A-G (either case), any number of `#`/`♯` or `b`/`♭`
/// accidentals and an optional signed octave. Returns `None` for anything
/// else or when the result falls outside 0..=127.
pub fn midi_note_number(name: &str) -> Option<u8> {
    let mut chars = name.trim().chars().peekable();

    let letter = chars.next()?;
    let base: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut shift = 0;
    while let Some(&c) = chars.peek() {
        match c {
            '#' | '♯' => shift += 1,
            'b' | '♭' => shift -= 1,
            _ => break,
        }
        chars.next();
    }

    let rest: String = chars.collect();
    let octave = if rest.is_empty() {
        DEFAULT_OCTAVE
    } else {
        rest.parse::<i32>().ok()?
    };

    let midi = octave
        .checked_add(1)?
        .checked_mul(12)?
        .checked_add(base)?
        .checked_add(shift)?;
    u8::try_from(midi).ok().filter(|n| *n <= 127)
}
