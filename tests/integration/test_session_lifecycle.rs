//! Integration Tests for Session Lifecycle
//!
//! Activation, cwd/env tracking, unknown terminals and teardown.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use termexec::events::ShellIntegrationEvent;
use termexec::models::{Confidence, SessionId};
use termexec::transport::ShellIntegrationNotification;
use termexec::{Error, ShellIntegrationRegistry};
use test_utils::*;

#[tokio::test]
async fn test_activation_fires_once() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut changes = registry.on_did_change_shell_integration();

    registry
        .handle_notification(&session, ShellIntegrationNotification::ShellIntegrationChanged)
        .await;
    registry
        .handle_notification(&session, ShellIntegrationNotification::ShellIntegrationChanged)
        .await;

    let event = next_event(&mut changes).await;
    assert_eq!(event.session_id(), &session);
    assert!(changes.try_recv().is_none());
    assert!(registry.tracker(&session).await.unwrap().is_active().await);
}

#[tokio::test]
async fn test_cwd_and_env_changes_publish_snapshots() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut changes = registry.on_did_change_shell_integration();

    registry
        .handle_notification(
            &session,
            ShellIntegrationNotification::CwdChanged {
                cwd: PathBuf::from("/srv"),
            },
        )
        .await;
    // Same directory again is not a change
    registry
        .handle_notification(
            &session,
            ShellIntegrationNotification::CwdChanged {
                cwd: PathBuf::from("/srv"),
            },
        )
        .await;
    registry
        .handle_notification(
            &session,
            ShellIntegrationNotification::EnvChanged {
                keys: vec!["PATH".into(), "HOME".into()],
                values: vec!["/usr/bin".into(), "/root".into()],
                is_trusted: true,
            },
        )
        .await;
    registry
        .handle_notification(
            &session,
            ShellIntegrationNotification::EnvVarSet {
                key: "EDITOR".into(),
                value: "vi".into(),
                is_trusted: true,
            },
        )
        .await;
    registry
        .handle_notification(
            &session,
            ShellIntegrationNotification::EnvVarDeleted { key: "HOME".into() },
        )
        .await;
    // Deleting an unknown variable changes nothing
    registry
        .handle_notification(
            &session,
            ShellIntegrationNotification::EnvVarDeleted {
                key: "NOPE".into(),
            },
        )
        .await;

    let mut snapshots = Vec::new();
    while let Some(ShellIntegrationEvent::ShellIntegrationChanged {
        shell_integration, ..
    }) = changes.try_recv()
    {
        snapshots.push(shell_integration);
    }
    assert_eq!(snapshots.len(), 4);
    assert_eq!(snapshots[0].cwd, Some(PathBuf::from("/srv")));

    let env = snapshots[3].env.as_ref().unwrap();
    assert_eq!(env.get("PATH"), Some("/usr/bin"));
    assert_eq!(env.get("EDITOR"), Some("vi"));
    assert_eq!(env.get("HOME"), None);
    assert!(env.is_trusted);
}

#[tokio::test]
async fn test_start_cwd_updates_snapshot_before_start_event() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut events = registry.subscribe();

    registry
        .handle_notification(&session, start_in("ls", Confidence::High, "/var/log"))
        .await;

    let changed = next_event(&mut events).await;
    assert!(matches!(
        changed,
        ShellIntegrationEvent::ShellIntegrationChanged { .. }
    ));
    match next_event(&mut events).await {
        ShellIntegrationEvent::ExecutionStarted {
            shell_integration, ..
        } => assert_eq!(shell_integration.cwd, Some(PathBuf::from("/var/log"))),
        other => panic!("unexpected event {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_unknown_terminal_notifications_are_dropped() {
    let resolver = Arc::new(MockResolver::with_sessions(&["term-1"]));
    let registry = ShellIntegrationRegistry::default().with_resolver(resolver);
    let mut events = registry.subscribe();

    let stranger = SessionId::new("term-9");
    registry
        .handle_notification(&stranger, start("ls", Confidence::High))
        .await;
    assert!(events.try_recv().is_none());
    assert!(matches!(
        registry.request_new_execution(&stranger, "ls", None).await,
        Err(Error::SessionNotFound { .. })
    ));

    let known = SessionId::new("term-1");
    registry
        .handle_notification(&known, start("ls", Confidence::High))
        .await;
    match next_event(&mut events).await {
        ShellIntegrationEvent::ExecutionStarted { terminal, .. } => {
            assert_eq!(terminal.unwrap().as_str(), "terminal-term-1");
        }
        other => panic!("unexpected event {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_close_session_cuts_off_readers() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut events = registry.subscribe();

    let queued = registry
        .request_new_execution(&session, "sleep 1", None)
        .await
        .unwrap();
    registry
        .handle_notification(&session, start("tail -f log", Confidence::High))
        .await;
    let running = next_event(&mut events).await.execution().unwrap().clone();
    let mut reader = running.produce_lazy_sequence();
    registry.handle_notification(&session, data("line 1\n")).await;

    assert!(registry.close_session(&session).await);

    assert_eq!(reader.next().await, None);
    assert!(running.is_ended());
    assert!(queued.is_ended());
    assert!(events.try_recv().is_none());

    // Late hook traffic for the closed session goes nowhere
    registry.handle_notification(&session, data("line 2\n")).await;
    registry
        .handle_notification(&session, start("ls", Confidence::High))
        .await;
    assert!(events.try_recv().is_none());
    assert!(registry.sessions().await.is_empty());
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let registry = ShellIntegrationRegistry::default();
    let left = SessionId::new("left");
    let right = SessionId::new("right");
    let mut starts = registry.on_did_start_execution();

    let build = registry.request_new_execution(&left, "build", None).await.unwrap();
    registry
        .handle_notification(&right, start("build", Confidence::High))
        .await;

    // The right session synthesizes its own execution
    let started = next_event(&mut starts).await;
    assert_eq!(started.session_id(), &right);
    assert!(!started.execution().unwrap().same_as(&build));

    registry
        .handle_notification(&left, start("build", Confidence::High))
        .await;
    let started = next_event(&mut starts).await;
    assert_eq!(started.session_id(), &left);
    assert!(started.execution().unwrap().same_as(&build));

    let mut sessions = registry.sessions().await;
    sessions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(sessions, vec![left, right]);
}

#[tokio::test]
async fn test_dispose_registry() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    registry
        .handle_notification(&session, start("top", Confidence::High))
        .await;
    let tracker = registry.tracker(&session).await.unwrap();

    registry.dispose().await;

    assert!(tracker.is_disposed().await);
    assert!(registry.sessions().await.is_empty());
    assert!(matches!(
        registry.request_new_execution(&session, "ls", None).await,
        Err(Error::SessionClosed { .. })
    ));
}
