//! System prompt assembly: identity, operating rules, approval mode and the
//! tools on offer.

use forgeloop_core::{ApprovalMode, ToolSchema};

use crate::assistant_identity::AssistantIdentity;

const RULES: &str = "RULES:\n\
1. Call tools only with arguments that match their schema.\n\
2. Every tool call gets a result before you continue; read it before acting again.\n\
3. Ask the user with ask_user when a requirement is ambiguous instead of guessing.\n\
4. When the task is finished, reply with a short summary and no tool calls.";

pub struct PromptBuilder {
    identity: AssistantIdentity,
    mode: ApprovalMode,
}

impl PromptBuilder {
    pub fn new(identity: AssistantIdentity) -> Self {
        Self {
            identity,
            mode: ApprovalMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ApprovalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(&self, tools: &[ToolSchema]) -> String {
        let mut sections = vec![self.identity.compile(), RULES.to_string()];
        if let Some(note) = mode_note(self.mode) {
            sections.push(note.to_string());
        }
        sections.push(tool_section(tools));
        sections.join("\n\n")
    }
}

fn mode_note(mode: ApprovalMode) -> Option<&'static str> {
    match mode {
        ApprovalMode::ApprovalRequired => None,
        ApprovalMode::AutoApprove => {
            Some("MODE: auto-approve. Tool calls run without asking the user; be deliberate.")
        }
        ApprovalMode::Plan => Some(
            "MODE: plan. Tools that change the environment will be refused. Investigate with \
             read-only tools and propose a plan.",
        ),
    }
}

fn tool_section(tools: &[ToolSchema]) -> String {
    if tools.is_empty() {
        return "TOOLS: none available.".to_string();
    }
    let mut out = String::from("TOOLS:");
    for tool in tools {
        out.push_str(&format!("\n- {}: {}", tool.name, tool.description));
    }
    out
}
