// Pipeline execution and monitoring module
// Orchestrates the Analyzer -> Composer -> Narrator run and traces it

pub mod error;
pub mod orchestrator;
pub mod trace;

pub use error::{PipelineError, FALLBACK_MESSAGE};
pub use orchestrator::{validate_input, Pipeline};
pub use trace::{read_trace_file, TraceEntry, TraceError, TraceWriter};
