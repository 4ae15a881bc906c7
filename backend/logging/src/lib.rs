//! Structured logging for ForgeLoop.
//!
//! Log redaction, console plus rolling JSON output, and the agent event
//! logger that consumes orchestrator events.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{AgentEvent, EventLogEntry, EventLogger};
pub use logger::{init_logger, LOG_FILE_PREFIX};
pub use redact::{redact_sensitive_data, redact_value, REDACTED};
