// Timeline module
// Playback-time queries against a finished composition

pub mod clock;
pub mod index;
pub mod inspector;

pub use clock::{
    format_time, progress_percent, PlaybackClock, PlaybackPosition, PlaybackTick, TransportState,
};
pub use index::{TimelineFrame, TimelineIndex};
pub use inspector::{InspectorView, NoteDetails, EMPTY_PLACEHOLDER, SCRUB_PLACEHOLDER};
