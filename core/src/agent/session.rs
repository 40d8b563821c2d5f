use crate::agent::context::{ContextManager, build_system_prompt};
use crate::agent::registry::{ToolRegistry, create_default_registry};
use crate::config::Config;
use crate::providers::create_provider;
use crate::traits::Provider;
use anyhow::{Context, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingModel,
    ProcessingToolCalls,
    Done,
}

/// Everything one conversation needs. Owned by exactly one agent.
pub struct Session {
    pub context: ContextManager,
    pub registry: ToolRegistry,
    provider: Box<dyn Provider>,
    state: LoopState,
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        let provider = create_provider(config).context("Failed to create model provider")?;
        let context = ContextManager::new(Some(build_system_prompt(config)))
            .with_context_window(config.model.context_window);

        Ok(Self::from_parts(
            context,
            create_default_registry(config),
            provider,
        ))
    }

    pub fn from_parts(
        context: ContextManager,
        registry: ToolRegistry,
        provider: Box<dyn Provider>,
    ) -> Self {
        Self {
            context,
            registry,
            provider,
            state: LoopState::Idle,
        }
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn turn_count(&self) -> usize {
        self.context.turn_count()
    }

    pub(crate) fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            debug!("Agent state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
