//! termexec - Shell-integration execution tracking for terminal sessions
//!
//! A terminal host that runs an integration hook inside each shell receives
//! a stream of notifications: a command line is about to run, output was
//! produced, the command finished, the cwd or environment changed. This
//! library turns that stream into first-class execution objects, each with a
//! lazily consumed output stream, and correlates them with commands the
//! client asked the shell to run.
//!
//! ## Module Organization
//!
//! - [`registry`] - One tracker per session, aggregated event subscriptions
//! - [`tracker`] - Per-session correlation of requests and shell reports
//! - [`execution`] - Execution handles and their lifecycle
//! - [`stream`] - Multi-consumer output stream with a flush gate
//! - [`matcher`] - Multi-line command continuation matching
//! - [`events`] - Ordered event bus and subscriptions
//! - [`transport`] - Notification wire format and host seams
//! - [`models`] - Command lines, session identifiers, env snapshots
//! - [`config`] - TOML/JSON configuration
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use termexec::{init, SessionId, ShellIntegrationNotification};
//!
//! # async fn run() -> termexec::Result<()> {
//! let registry = init();
//! let mut ends = registry.on_did_end_execution();
//!
//! let session = SessionId::new("term-1");
//! let args = vec!["test".to_string()];
//! let execution = registry
//!     .request_new_execution(&session, "cargo", Some(args.as_slice()))
//!     .await?;
//! let output = execution.produce_lazy_sequence();
//!
//! // Feed notifications from the shell-integration hook as they arrive
//! registry
//!     .handle_notification(&session, ShellIntegrationNotification::ShellIntegrationChanged)
//!     .await;
//!
//! let text = output.read_to_string().await;
//! let ended = ends.recv().await;
//! # let _ = (text, ended);
//! # Ok(())
//! # }
//! ```
//!
//! ## Ordering
//!
//! Within a session, every start event precedes the matching end event, and
//! the end event of execution N precedes the start event of execution N+1.
//! An end event is only published after every consumer that existed when
//! the shell reported the end has drained its output.

#![allow(unexpected_cfgs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod matcher;
pub mod models;
pub mod registry;
pub mod stream;
pub mod tracker;
pub mod transport;

// Re-exports for core functionality
pub use config::{Config, ConfigLoader, SessionConfig, TrackingConfig};
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, EventSubscription, ShellIntegrationEvent};
pub use execution::{Execution, ExecutionSnapshot, ExecutionStatus};
pub use matcher::{ContinuationMatch, MultiLineContinuation};
pub use models::{CommandLine, Confidence, SessionId, ShellIntegrationSnapshot, TerminalTag};
pub use registry::ShellIntegrationRegistry;
pub use stream::{DataSequence, DataStream};
pub use tracker::{ShellIntegrationTracker, TrackerState};
pub use transport::{ExecutionTransport, ShellIntegrationNotification, TerminalResolver};

/// The current version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Environment variable that turns on debug logging when set to `1`/`true`
pub const DEBUG_ENV_VAR: &str = "TERMEXEC_DEBUG";

/// Install a compact `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` when `debug` is
/// true or [`DEBUG_ENV_VAR`] is enabled, and `info` otherwise. Does nothing
/// if the host already installed a global subscriber.
pub fn init_tracing(debug: bool) {
    let debug_env = std::env::var(DEBUG_ENV_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let log_level = if debug || debug_env { "debug" } else { "info" };

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();
}

/// Create a registry from the configuration found in the default locations,
/// falling back to defaults when none can be loaded
pub fn init() -> ShellIntegrationRegistry {
    info!("Initializing {} v{}", NAME, VERSION);

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration: {}. Using defaults", e);
            Config::default()
        }
    };

    ShellIntegrationRegistry::new(config)
}

/// Create a registry from an explicit configuration file
pub fn init_with_config(config_path: &std::path::Path) -> Result<ShellIntegrationRegistry> {
    info!(
        "Initializing {} v{} with config: {}",
        NAME,
        VERSION,
        config_path.display()
    );

    if !config_path.exists() {
        return Err(Error::ConfigLoadFailed {
            path: config_path.to_path_buf(),
            reason: "Configuration file does not exist".to_string(),
        });
    }

    let config = ConfigLoader::load_from_path(config_path)?;
    Ok(ShellIntegrationRegistry::new(config))
}
