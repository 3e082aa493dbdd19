//! Core data models for termexec
//!
//! Plain data shared by the stream, execution, and tracker layers: session
//! identity, command lines with their confidence, and shell state snapshots.

pub mod command_line;
pub mod session;

// Re-exports for convenience
pub use command_line::{build_command_line, CommandLine, Confidence};
pub use session::{EnvSnapshot, SessionId, ShellIntegrationSnapshot, TerminalTag};
