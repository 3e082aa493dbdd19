//! Session identity and shell state snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Opaque identifier correlating all notifications for one terminal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque terminal tag attached to outgoing events.
///
/// Resolved from a [`SessionId`] by the embedding client's terminal
/// registry; this crate never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalTag(String);

impl TerminalTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Environment variables reported by the shell
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub vars: BTreeMap<String, String>,
    pub is_trusted: bool,
}

impl EnvSnapshot {
    /// Build from parallel key/value lists. Extra entries in the longer list
    /// are ignored.
    pub fn from_pairs(keys: &[String], values: &[String], is_trusted: bool) -> Self {
        let vars = keys
            .iter()
            .zip(values.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { vars, is_trusted }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Immutable view of a session's shell integration state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShellIntegrationSnapshot {
    /// Current working directory as last reported by the shell
    pub cwd: Option<PathBuf>,
    /// Environment as last reported by the shell, if ever
    pub env: Option<EnvSnapshot>,
}
