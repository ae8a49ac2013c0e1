// Composition module
// Data model for one pipeline run and the note normalizer that builds it

pub mod normalize;
pub mod pitch;
pub mod types;

pub use normalize::{normalize_data_mapping, NormalizeError, NormalizedNotes, DEFAULT_VELOCITY};
pub use pitch::midi_note_number;
pub use types::{
    Analysis, AudioMapping, Composition, CompositionInput, InputKind, NarrationLine, Note,
    RawAudioMapping, RawInput,
};
