//! Configuration settings for Barista.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub services: ServiceSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level when no `-v` flag is given (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.barista".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model driving the agent loop.
    pub model: String,
    /// Sampling temperature for the agent loop.
    pub temperature: f32,
    /// Model used by the calculator tool.
    pub calculator_model: String,
    /// Model used to turn outlet questions into SQL.
    pub sql_model: String,
    /// Sampling temperature for SQL generation.
    pub sql_temperature: f32,
    /// Timeout for a single model request.
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            calculator_model: "gpt-4o-mini".to_string(),
            sql_model: "gpt-3.5-turbo".to_string(),
            sql_temperature: 0.3,
            request_timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum model calls per turn before the loop gives up.
    pub max_iterations: usize,
    /// Keep only the most recent N turns in memory. Unbounded when unset.
    pub memory_max_turns: Option<usize>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            memory_max_turns: None,
        }
    }
}

/// Endpoints of the services the lookup tools call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Product knowledge endpoint (expects a `summary` field).
    pub products_url: String,
    /// Outlet query endpoint (expects `results` and `sql_query` fields).
    pub outlets_url: String,
    /// Timeout for a single tool request.
    pub timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            products_url: "http://127.0.0.1:8000/products".to_string(),
            outlets_url: "http://127.0.0.1:8000/outlets".to_string(),
            timeout_secs: 30,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Path to the SQLite outlet database.
    pub outlets_db: String,
    /// Maximum rows the generated SQL may return.
    pub sql_top_k: usize,
    /// Most chat sessions kept at once; the least recently used is evicted.
    pub max_sessions: usize,
    /// Seconds a chat session may sit idle before it is dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            outlets_db: "~/.barista/outlets.db".to_string(),
            sql_top_k: 5,
            max_sessions: 1000,
            session_idle_secs: 3600,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BaristaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("barista")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded outlet database path.
    pub fn outlets_db_path(&self) -> PathBuf {
        Self::expand_path(&self.server.outlets_db)
    }
}
