use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use forgeloop_core::{BackendError, ModelBackend, ModelRequest, ModelResponse};
use tracing::debug;

/// A backend that replays queued responses in order and records every
/// request it receives. Used for demos and deterministic tests.
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<ModelResponse, BackendError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: ModelResponse) -> Self {
        self.push(Ok(response));
        self
    }

    pub fn with_error(self, error: BackendError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, outcome: Result<ModelResponse, BackendError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        debug!(backend = %self.name, turns = request.turns.len(), "Scripted request");
        next.unwrap_or_else(|| {
            Err(BackendError::Malformed(format!(
                "scripted backend '{}' has no responses left",
                self.name
            )))
        })
    }
}
