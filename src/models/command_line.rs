//! Command Line Model
//!
//! A command line as reported by the shell integration hook or requested by
//! the client, qualified by how confident the reporter is that the text is
//! what actually ran.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence that a reported command line is the literal executed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Guessed from the prompt and cursor position
    #[default]
    Low,
    /// Reported by the hook but not verified against client input
    Medium,
    /// Exact text, either requested by the client or verified by the hook
    High,
}

/// A command line together with its confidence and trust flags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandLine {
    /// Raw command line text, possibly spanning several lines
    pub value: String,
    /// How certain the reporter is about `value`
    pub confidence: Confidence,
    /// Whether the report came from a trusted source (nonce-verified hook or
    /// the client itself)
    pub is_trusted: bool,
}

impl CommandLine {
    pub fn new(value: impl Into<String>, confidence: Confidence, is_trusted: bool) -> Self {
        Self {
            value: value.into(),
            confidence,
            is_trusted,
        }
    }

    /// A command line the client itself asked to run
    pub fn requested(value: impl Into<String>) -> Self {
        Self::new(value, Confidence::High, true)
    }

    /// Whether the value contains nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence == Confidence::High
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Build a single command line from an executable and its arguments.
///
/// Arguments containing whitespace or quotes are wrapped in double quotes
/// with embedded double quotes and backslashes escaped.
pub fn build_command_line(executable: &str, args: &[String]) -> String {
    let mut line = quote_arg(executable);
    for arg in args {
        line.push(' ');
        line.push_str(&quote_arg(arg));
    }
    line
}

fn quote_arg(arg: &str) -> String {
    let needs_quotes =
        arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quotes {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
