pub mod registry;
pub mod retry;
pub mod scripted;

pub use registry::BackendRegistry;
pub use retry::{RetryPolicy, RetryingBackend};
pub use scripted::ScriptedBackend;
