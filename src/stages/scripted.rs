// Scripted backend for tests
// Replays canned replies in order and records every prompt it receives

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::invoker::{GenerationRequest, GenerativeInvoker, StageError};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

pub struct ScriptedInvoker {
    replies: Mutex<VecDeque<Result<String, StageError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedInvoker {
    pub fn new(replies: Vec<Result<String, StageError>>) -> Self {
        ScriptedInvoker {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Successful replies, one per stage call
    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeInvoker for ScriptedInvoker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, StageError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: request.model.to_string(),
            prompt: request.prompt.to_string(),
        });

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StageError::Generation("script exhausted".to_string())))
    }
}
