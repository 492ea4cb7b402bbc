//! Ask command implementation.

use crate::agent::StopReason;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the ask command: one turn in a fresh session.
pub async fn run_ask(question: &str, model: Option<String>, mut settings: Settings) -> Result<()> {
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

    let spinner = Output::spinner("Thinking...");
    let outcome = agent.run_turn(&mut session, question).await;
    spinner.finish_and_clear();

    println!("\n{}\n", outcome.answer);

    if !outcome.scratchpad.is_empty() {
        Output::header(&format!("Tool calls ({})", outcome.scratchpad.len()));
        for entry in &outcome.scratchpad {
            Output::tool_call(entry);
        }
        println!();
    }

    match outcome.stop_reason {
        StopReason::Answered | StopReason::Clarification => Output::info(&format!(
            "Completed in {} iteration(s)",
            outcome.iterations
        )),
        other => Output::warning(&format!(
            "Turn ended early ({:?}) after {} iteration(s)",
            other, outcome.iterations
        )),
    }

    Ok(())
}
