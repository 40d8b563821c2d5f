pub mod context;
pub mod events;
pub mod loop_;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextManager, build_system_prompt};
pub use events::{AgentEvent, RunOutcome, StopReason};
pub use loop_::{Agent, ConfirmationHook};
pub use registry::{ToolRegistry, create_default_registry};
pub use session::{LoopState, Session};
