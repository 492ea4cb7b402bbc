//! Pre-flight checks before starting a capability.
//!
//! Validates that required configuration is available up front, so a missing
//! credential or database is reported once at startup instead of on every
//! request.

use crate::config::Settings;
use crate::error::{BaristaError, Result};

/// Capabilities with startup requirements.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// The agent needs an API key.
    Chat,
    /// Outlet queries need an API key and the outlet database.
    Outlets,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Chat => {
            check_api_key()?;
        }
        Operation::Outlets => {
            let path = settings.outlets_db_path();
            if !path.exists() {
                return Err(BaristaError::Config(format!(
                    "Outlet database not found at {}. Set server.outlets_db in the config file.",
                    path.display()
                )));
            }
            check_api_key()?;
        }
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(BaristaError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(BaristaError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}
