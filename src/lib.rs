//! Barista - a tool-routing chatbot for a coffee chain
//!
//! A language-model agent that answers customer questions by choosing between
//! a calculator, a product knowledge lookup and an outlet database lookup.
//!
//! # Overview
//!
//! Barista allows you to:
//! - Chat with an agent that remembers the conversation
//! - Route arithmetic to a calculator tool
//! - Query outlet data in plain language through a guarded Text2SQL pipeline
//! - Serve the product, outlet and chat endpoints over HTTP
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `llm` - Chat model abstraction and the OpenAI backend
//! - `memory` - Conversation memory and sessions
//! - `agent` - Tool registry and the planner loop
//! - `outlets` - Outlet database, SQL guard and Text2SQL
//! - `products` - Product summary endpoint backing
//! - `orchestrator` - Component wiring
//!
//! # Example
//!
//! ```rust,no_run
//! use barista::config::Settings;
//! use barista::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!     let agent = orchestrator.build_agent()?;
//!
//!     let mut session = orchestrator.new_session();
//!     let outcome = agent.run_turn(&mut session, "What is 12 * 7?").await;
//!     println!("{}", outcome.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod openai;
pub mod orchestrator;
pub mod outlets;
pub mod products;

pub use error::{BaristaError, Result};
