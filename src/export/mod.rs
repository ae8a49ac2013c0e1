// Export module
// Converts finished compositions into external formats

pub mod midi;

pub use midi::{export_midi, MidiExportError, MidiExportOptions};
