// EchoDepict - Data to Music and Narration Generator
// Module declarations

pub mod commands;
pub mod composition;
pub mod config;
pub mod export;
pub mod pipeline;
pub mod stages;
pub mod state;
pub mod timeline;

pub use composition::{Composition, Note, RawInput};
pub use config::Config;
pub use pipeline::{Pipeline, PipelineError};
pub use timeline::TimelineIndex;
