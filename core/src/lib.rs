pub mod agent;
pub mod config;
pub mod providers;
pub mod tools;
pub mod traits;
pub mod utils;

pub use agent::{
    Agent, AgentEvent, ContextManager, RunOutcome, Session, StopReason, ToolRegistry,
    create_default_registry,
};
pub use config::*;
pub use providers::*;
pub use tools::*;
pub use traits::*;
