//! CLI module for Barista.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Barista - a tool-routing chatbot
///
/// Answers questions about ZUS Coffee products and outlets, and does arithmetic,
/// by letting a language model pick the right tool for each question.
#[derive(Parser, Debug)]
#[command(name = "barista")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// LLM model to use for the agent
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// LLM model to use for the agent
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Start the HTTP service with the product, outlet and chat endpoints
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["barista", "-vv", "ask", "What is 12 * 7?"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ask { question, model } => {
                assert_eq!(question, "What is 12 * 7?");
                assert!(model.is_none());
            }
            other => panic!("Expected Ask, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["barista", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
            }
            other => panic!("Expected Serve, got {:?}", other),
        }
    }
}
