// Generative stages
// Stage contracts, output schemas and the generative backend boundary

pub mod analyzer;
pub mod composer;
pub mod contract;
pub mod gemini;
pub mod invoker;
pub mod narrator;
pub mod schema;
#[cfg(test)]
pub(crate) mod scripted;

pub use analyzer::{AnalyzerInput, AnalyzerStage};
pub use composer::{ComposerInput, ComposerOutput, ComposerStage};
pub use contract::{run_stage, StageContract};
pub use gemini::GeminiInvoker;
pub use invoker::{invoke, GenerationRequest, GenerativeInvoker, StageError};
pub use narrator::{NarratorInput, NarratorStage};
pub use schema::{Schema, SchemaViolation};
