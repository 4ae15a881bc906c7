pub mod compaction;
pub mod conversation;
pub mod error;
pub mod event;
pub mod session;
pub mod traits;
pub mod types;

pub use compaction::{
    CompactionPolicy, CompactionRecord, ExtractiveSummarizer, Summarizer, DEFAULT_KEEP_RECENT,
};
pub use conversation::{ConversationSnapshot, ConversationStore};
pub use error::{AgentError, BackendError, OrderViolation};
pub use event::{EventKind, SessionEvent};
pub use session::{
    SessionCounters, SessionSnapshot, SessionState, SessionStatus, TerminationReason,
};
pub use traits::{
    Answer, ApprovalMode, ConfirmationOutcome, ConfirmationPrompt, InteractionChannel, ModelBackend,
    ModelRequest, ModelResponse, Question, SessionPersistence, ToolExecutor, ToolSchema, Usage,
};
pub use types::{
    estimate_tokens, estimate_value_tokens, Role, SeqRange, ToolCallRequest, ToolCallResult,
    ToolStatus, Turn,
};

pub use tokio_util::sync::CancellationToken;
