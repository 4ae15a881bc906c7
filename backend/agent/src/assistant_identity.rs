//! Assistant identity: the persona paragraph that opens the system prompt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantIdentity {
    pub name: String,
    pub persona: String,
    /// Extra style rules, rendered in key order.
    #[serde(default)]
    pub style_overrides: BTreeMap<String, String>,
}

impl Default for AssistantIdentity {
    fn default() -> Self {
        Self {
            name: "ForgeLoop".into(),
            persona: "You are an autonomous coding assistant. You work in small, verifiable \
                      steps and use the available tools to inspect and change the project."
                .into(),
            style_overrides: BTreeMap::new(),
        }
    }
}

impl AssistantIdentity {
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, key: impl Into<String>, rule: impl Into<String>) -> Self {
        self.style_overrides.insert(key.into(), rule.into());
        self
    }

    /// Compile the identity into a system prompt paragraph.
    pub fn compile(&self) -> String {
        let mut out = format!("IDENTITY: {}\n{}", self.name, self.persona);
        if !self.style_overrides.is_empty() {
            out.push_str("\n\nSTYLE GUIDELINES:");
            for (k, v) in &self.style_overrides {
                out.push_str(&format!("\n- {k}: {v}"));
            }
        }
        out
    }
}
