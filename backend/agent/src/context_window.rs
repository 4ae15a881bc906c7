//! Request assembly and the token overhead each request adds on top of the
//! conversation history.

use forgeloop_core::{
    estimate_tokens, estimate_value_tokens, ModelRequest, SessionState, ToolSchema, Turn,
};

pub struct ContextWindow {
    system_prompt: String,
    reserve_output_tokens: u64,
}

impl ContextWindow {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            reserve_output_tokens: 0,
        }
    }

    pub fn with_reserve_output(mut self, tokens: u64) -> Self {
        self.reserve_output_tokens = tokens;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Tokens the next request needs beyond the history: the system turn,
    /// the tool schemas and the reply window.
    pub fn request_overhead(&self, tools: &[ToolSchema]) -> u64 {
        let system = if self.system_prompt.is_empty() {
            0
        } else {
            Turn::system(self.system_prompt.as_str()).token_estimate
        };
        let schemas: u64 = tools
            .iter()
            .map(|t| {
                estimate_tokens(&t.name)
                    + estimate_tokens(&t.description)
                    + estimate_value_tokens(&t.parameters)
            })
            .sum();
        system + schemas + self.reserve_output_tokens
    }

    /// The system turn followed by the live conversation view.
    pub fn build_request(&self, session: &SessionState, tools: Vec<ToolSchema>) -> ModelRequest {
        let history = session.conversation().turns();
        let mut turns = Vec::with_capacity(history.len() + 1);
        if !self.system_prompt.is_empty() {
            turns.push(Turn::system(self.system_prompt.as_str()));
        }
        turns.extend_from_slice(history);
        ModelRequest {
            session_id: session.id(),
            turns,
            tools,
        }
    }
}
