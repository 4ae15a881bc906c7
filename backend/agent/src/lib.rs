//! ForgeLoop agent runner.
//!
//! The orchestration loop for one session, together with request assembly,
//! the interactive approval gate, event fan-out and JSON session storage.

pub mod agent_loop;
pub mod assistant_identity;
pub mod context_window;
pub mod events;
pub mod gate;
pub mod persistence;
pub mod phase;
pub mod setup;
pub mod system_prompt;

#[cfg(test)]
mod testing;

pub use agent_loop::{Orchestrator, OrchestratorBuilder, RunOutcome};
pub use assistant_identity::AssistantIdentity;
pub use context_window::ContextWindow;
pub use events::{EventSink, DEFAULT_EVENT_BUFFER};
pub use gate::InteractiveGate;
pub use persistence::JsonFileStore;
pub use phase::Phase;
pub use setup::builder_from_config;
pub use system_prompt::PromptBuilder;
