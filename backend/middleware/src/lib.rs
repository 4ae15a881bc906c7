pub mod builtin;
pub mod chain;
pub mod types;

pub use builtin::{
    standard_chain, BudgetSettings, ContextCompaction, PriceLimit, TurnLimit, UsageAccounting,
};
pub use chain::{Middleware, MiddlewareChain};
pub use types::{Decision, MiddlewarePhase, ModelPricing, RequestContext};
