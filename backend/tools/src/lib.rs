pub mod ask_user;
pub mod dispatch;
pub mod registry;
pub mod schema;
pub mod think;

pub use ask_user::{AskUserTool, ASK_USER_TOOL};
pub use dispatch::{question_from, ApprovalGate, AutoApprove, DispatchReport};
pub use registry::{
    RegisteredTool, RegistryError, ToolDefinition, ToolKind, ToolRegistry,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_TOOL_TIMEOUT,
};
pub use schema::SchemaError;
pub use think::{split_reasoning, ThinkTool, THINK_TIMEOUT, THINK_TOOL};
