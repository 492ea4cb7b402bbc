//! CLI output formatting utilities.

use crate::agent::ScratchpadEntry;
use crate::memory::Message;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a tool call with a pass/fail mark.
    pub fn tool_call(entry: &ScratchpadEntry) {
        let mark = if entry.failed() {
            style("✗").red()
        } else {
            style("✓").green()
        };
        println!(
            "  {} {}",
            style(format!("[{}] {}", entry.tool, truncate(&entry.input, 60))).dim(),
            mark
        );
    }

    /// Print a remembered message.
    pub fn message(msg: &Message) {
        println!("  {}", style(history_line(msg)).dim());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

fn history_line(msg: &Message) -> String {
    format!(
        "[{}] #{} {}: {}",
        msg.created_at().format("%H:%M:%S"),
        msg.position(),
        msg.role(),
        truncate(msg.content(), 80)
    )
}

/// Shorten text for one-line display.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_line() {
        let mut memory = crate::memory::Memory::new();
        memory.record_turn("Is SS2 open late?", "It closes at 9:00 PM.");
        let lines: Vec<String> = memory.messages().map(history_line).collect();

        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("#0 user: Is SS2 open late?"));
        assert!(lines[1].ends_with("#1 assistant: It closes at 9:00 PM."));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long tool input", 10), "a long ...");
        assert_eq!(truncate("kopi ☕ ☕ ☕", 6), "kop...");
    }
}
