//! Interactive chat command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the interactive chat command.
pub async fn run_chat(model: Option<String>, mut settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Chat, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    if let Some(model) = model {
        settings.llm.model = model;
    }

    let orchestrator = Orchestrator::new(settings)?;
    let agent = orchestrator.build_agent()?;
    let mut session = orchestrator.new_session();

    println!("\n{}", style("Barista").bold().cyan());
    println!(
        "{}\n",
        style("Ask about products, outlets or a calculation. Type 'exit' to quit, 'history' to review, 'clear' to reset.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF
            println!();
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.memory.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        if input.eq_ignore_ascii_case("history") {
            if session.memory.is_empty() {
                Output::info("No conversation yet.");
            }
            for message in session.memory.messages() {
                Output::message(message);
            }
            continue;
        }

        let outcome = agent.run_turn(&mut session, input).await;
        for entry in &outcome.scratchpad {
            Output::tool_call(entry);
        }
        println!("\n{} {}\n", style("Barista:").cyan().bold(), outcome.answer);
    }

    Ok(())
}
