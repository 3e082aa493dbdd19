//! Multi-line Command Matching
//!
//! Some shells report one logical command as several consecutive starts,
//! one per physical line, while others report a single aggregate line for
//! what the hook treated as several confirmed sub-commands. Both must
//! resolve to exactly one execution. This module decides whether a newly
//! reported command line continues an in-flight multi-line execution.

use std::collections::VecDeque;

/// Physical lines of a logical execution that the shell has not yet
/// confirmed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiLineContinuation {
    unresolved_lines: VecDeque<String>,
}

impl MultiLineContinuation {
    /// Build a continuation from a command line. Returns `None` unless the
    /// value has more than one non-empty line.
    pub fn from_command_line(value: &str) -> Option<Self> {
        let lines = split_command_lines(value);
        if lines.len() > 1 {
            Some(Self {
                unresolved_lines: lines.into(),
            })
        } else {
            None
        }
    }

    pub fn unresolved_lines(&self) -> &VecDeque<String> {
        &self.unresolved_lines
    }

    pub fn is_resolved(&self) -> bool {
        self.unresolved_lines.is_empty()
    }

    /// Match `reported` against this continuation and consume the lines it
    /// confirms. The continuation is left untouched on `NoMatch`.
    pub fn advance(&mut self, reported: &str) -> ContinuationMatch {
        let result = match_continuation(self.unresolved_lines.make_contiguous(), reported);
        match &result {
            ContinuationMatch::Complete => self.unresolved_lines.clear(),
            ContinuationMatch::Partial { remaining } => {
                self.unresolved_lines = remaining.iter().cloned().collect();
            }
            ContinuationMatch::NoMatch => {}
        }
        result
    }
}

/// Outcome of matching a reported command line against unresolved lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuationMatch {
    /// Every unresolved line was confirmed
    Complete,
    /// A prefix was confirmed; these lines are still expected
    Partial { remaining: Vec<String> },
    /// The report does not continue the execution
    NoMatch,
}

impl ContinuationMatch {
    pub fn is_match(&self) -> bool {
        !matches!(self, ContinuationMatch::NoMatch)
    }
}

/// Split a command line on line breaks, trim each line and drop empty ones
pub fn split_command_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decide whether `reported` continues a multi-line execution whose
/// unconfirmed lines are `unresolved`.
///
/// Lines are compared front to front. Once every unresolved line is
/// confirmed the match is complete and any extra reported lines are
/// ignored, since the aggregate report subsumed the continuation. A blank
/// report never matches.
pub fn match_continuation(unresolved: &[String], reported: &str) -> ContinuationMatch {
    let candidates = split_command_lines(reported);
    if unresolved.is_empty() || candidates.is_empty() {
        return ContinuationMatch::NoMatch;
    }

    let confirmed = unresolved
        .iter()
        .zip(candidates.iter())
        .take_while(|(expected, candidate)| expected == candidate)
        .count();

    if confirmed == unresolved.len() {
        ContinuationMatch::Complete
    } else if confirmed == candidates.len() {
        ContinuationMatch::Partial {
            remaining: unresolved[confirmed..].to_vec(),
        }
    } else {
        ContinuationMatch::NoMatch
    }
}
