//! Wiring for Barista.
//!
//! Builds the agent, its tools and the outlet pipeline from settings.

use crate::agent::{Agent, ToolRegistry};
use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::llm::{ChatModel, OpenAIChatModel};
use crate::memory::{Retention, Session};
use crate::outlets::{OutletStore, Text2Sql};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds the runtime components from settings.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
}

impl Orchestrator {
    /// Create a new orchestrator, loading prompts from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        Ok(Self { settings, prompts })
    }

    fn openai_model(&self, model: &str) -> Result<Arc<dyn ChatModel>> {
        let timeout = Duration::from_secs(self.settings.llm.request_timeout_secs);
        Ok(Arc::new(OpenAIChatModel::new(model, timeout)?))
    }

    /// Build the agent with OpenAI models.
    pub fn build_agent(&self) -> Result<Agent> {
        let agent_model = self.openai_model(&self.settings.llm.model)?;
        let calculator_model = self.openai_model(&self.settings.llm.calculator_model)?;
        self.build_agent_with(agent_model, calculator_model)
    }

    /// Build the agent with the given models.
    pub fn build_agent_with(
        &self,
        agent_model: Arc<dyn ChatModel>,
        calculator_model: Arc<dyn ChatModel>,
    ) -> Result<Agent> {
        let tools = ToolRegistry::standard(&self.settings, &self.prompts, calculator_model)?;
        info!(
            "Agent ready: model {}, {} tools, max {} iterations",
            agent_model.model_name(),
            tools.len(),
            self.settings.agent.max_iterations
        );

        Ok(Agent::new(agent_model, tools)
            .with_system_prompt(&self.prompts.render_with_custom(
                &self.prompts.agent.system,
                &Default::default(),
            ))
            .with_max_iterations(self.settings.agent.max_iterations)
            .with_temperature(self.settings.llm.temperature))
    }

    /// Memory retention for new sessions.
    pub fn retention(&self) -> Retention {
        Retention::from_max_turns(self.settings.agent.memory_max_turns)
    }

    /// Start a new conversation.
    pub fn new_session(&self) -> Session {
        Session::new(self.retention())
    }

    /// Open the outlet database and build the Text2SQL pipeline.
    pub fn build_text2sql(&self) -> Result<Text2Sql> {
        let store = OutletStore::open(&self.settings.outlets_db_path())?;
        let model = self.openai_model(&self.settings.llm.sql_model)?;
        self.build_text2sql_with(model, store)
    }

    /// Build the Text2SQL pipeline over the given model and store.
    pub fn build_text2sql_with(
        &self,
        model: Arc<dyn ChatModel>,
        store: OutletStore,
    ) -> Result<Text2Sql> {
        Ok(Text2Sql::new(model, store, self.prompts.clone())?
            .with_temperature(self.settings.llm.sql_temperature)
            .with_top_k(self.settings.server.sql_top_k))
    }
}
