//! Configuration module for Barista.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AgentPrompts, CalculatorPrompts, Prompts, SqlPrompts};
pub use settings::{
    AgentSettings, GeneralSettings, LlmSettings, PromptSettings, ServerSettings,
    ServiceSettings, Settings,
};
