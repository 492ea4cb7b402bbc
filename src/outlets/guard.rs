//! Safety checks for model-generated SQL.
//!
//! Generated queries are untrusted: the question they came from may carry an
//! injected statement. Only a single read-only SELECT over user tables passes.

use crate::error::{BaristaError, Result};
use regex::Regex;

/// Words that must not appear outside string literals.
const BLOCKED_WORDS: &[&str] = &[
    "sqlite_master",
    "sqlite_schema",
    "sqlite_temp_master",
    "sqlite_temp_schema",
    "sqlite_sequence",
    "union",
    "pragma",
    "attach",
    "detach",
    "insert",
    "update",
    "delete",
    "drop",
    "alter",
    "create",
    "replace",
    "vacuum",
    "reindex",
    "load_extension",
];

/// Validates and normalises generated SQL.
pub struct SqlGuard {
    blocked: Regex,
}

impl SqlGuard {
    pub fn new() -> Result<Self> {
        let pattern = format!(r"(?i)\b({})\b", BLOCKED_WORDS.join("|"));
        let blocked = Regex::new(&pattern)
            .map_err(|e| BaristaError::Config(format!("Invalid SQL guard pattern: {}", e)))?;
        Ok(Self { blocked })
    }

    /// Reduce a model reply to one safe statement, or reject it.
    ///
    /// Strips code fences and `SQLQuery:` labels, keeps only the first
    /// statement, and requires it to be a SELECT (or WITH ... SELECT) that
    /// touches no system tables and contains no comments.
    pub fn sanitize(&self, raw: &str) -> Result<String> {
        let text = strip_decoration(raw);
        let scanned = scan_first_statement(&text)?;
        let statement = scanned.statement.trim();

        if statement.is_empty() {
            return Err(BaristaError::UnsafeSql("empty query".to_string()));
        }

        let first_word = leading_keyword(&scanned.code);
        if first_word != "select" && first_word != "with" {
            return Err(BaristaError::UnsafeSql(format!(
                "only SELECT queries are allowed, got '{}'",
                first_word
            )));
        }

        if let Some(found) = self.blocked.find(&scanned.code) {
            return Err(BaristaError::UnsafeSql(format!(
                "query uses '{}'",
                found.as_str().to_ascii_lowercase()
            )));
        }

        Ok(statement.to_string())
    }
}

/// Remove markdown fences and the labels text-to-SQL prompts tend to echo.
fn strip_decoration(raw: &str) -> String {
    let without_fences = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut text = without_fences.trim();
    if let Some(idx) = text.find("SQLResult:") {
        text = &text[..idx];
    }
    let lowered = text.to_ascii_lowercase();
    for label in ["sqlquery:", "sql query:", "sql:"] {
        if lowered.starts_with(label) {
            text = &text[label.len()..];
            break;
        }
    }
    text.trim().to_string()
}

struct ScannedStatement {
    /// The first statement, verbatim.
    statement: String,
    /// The first statement with string literal contents removed. Quoted
    /// identifiers keep their text.
    code: String,
}

/// Split off the first statement, honouring quotes, and reject comments.
fn scan_first_statement(text: &str) -> Result<ScannedStatement> {
    let mut statement = String::new();
    let mut code = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                statement.push(c);
                // "..." and `...` name tables and columns
                let identifier = q != '\'';
                if c == q {
                    // Doubled quote is an escaped quote inside the literal.
                    if chars.peek() == Some(&q) {
                        statement.push(q);
                        chars.next();
                        if identifier {
                            code.push(q);
                            code.push(q);
                        }
                    } else {
                        quote = None;
                        code.push(c);
                    }
                } else if identifier {
                    code.push(c);
                }
            }
            None => {
                if c == ';' {
                    break;
                }
                if (c == '-' && chars.peek() == Some(&'-')) || (c == '/' && chars.peek() == Some(&'*')) {
                    return Err(BaristaError::UnsafeSql("comments are not allowed".to_string()));
                }
                if c == '\'' || c == '"' || c == '`' {
                    quote = Some(c);
                }
                statement.push(c);
                code.push(c);
            }
        }
    }

    if quote.is_some() {
        return Err(BaristaError::UnsafeSql("unterminated string literal".to_string()));
    }

    Ok(ScannedStatement { statement, code })
}

/// First keyword of the statement, skipping opening parentheses.
fn leading_keyword(code: &str) -> String {
    code.trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
}
