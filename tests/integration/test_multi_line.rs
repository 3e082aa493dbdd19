//! Integration Tests for Multi-line Command Lines
//!
//! A command line spanning several physical lines must surface as exactly
//! one execution, whether the shell reports each line separately or reports
//! one aggregate line.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use termexec::events::EventKind;
use termexec::models::{Confidence, SessionId};
use termexec::{ShellIntegrationRegistry, TrackerState};
use test_utils::*;

#[tokio::test]
async fn test_per_line_reports_form_one_execution() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut events = registry.subscribe();

    let execution = registry
        .request_new_execution(&session, "echo a\necho b", None)
        .await
        .unwrap();
    let output = execution.produce_lazy_sequence();

    registry.handle_notification(&session, start("echo a", Confidence::High)).await;
    registry.handle_notification(&session, data("a\n")).await;
    registry.handle_notification(&session, end("echo a", Confidence::High, Some(0))).await;
    registry.handle_notification(&session, start("echo b", Confidence::High)).await;
    registry.handle_notification(&session, data("b\n")).await;
    registry.handle_notification(&session, end("echo b", Confidence::High, Some(0))).await;

    assert_eq!(output.read_to_string().await, "a\nb\n");

    let started = next_event(&mut events).await;
    assert_eq!(started.kind(), EventKind::ExecutionStarted);
    assert!(started.execution().unwrap().same_as(&execution));

    let ended = next_event(&mut events).await;
    assert_eq!(ended.kind(), EventKind::ExecutionEnded);
    assert!(ended.execution().unwrap().same_as(&execution));

    // Exactly one start/end pair, and the aggregate line survives
    assert!(events.try_recv().is_none());
    assert_eq!(execution.command_line().value, "echo a\necho b");
    assert_eq!(execution.exit_code(), Some(0));
}

#[tokio::test]
async fn test_aggregate_report_matches_multi_line_request() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut starts = registry.on_did_start_execution();
    let mut ends = registry.on_did_end_execution();

    let execution = registry
        .request_new_execution(&session, "cd src\nls", None)
        .await
        .unwrap();

    registry
        .handle_notification(&session, start("cd src\nls", Confidence::High))
        .await;
    assert!(next_event(&mut starts).await.execution().unwrap().same_as(&execution));

    registry
        .handle_notification(&session, end("cd src\nls", Confidence::High, Some(0)))
        .await;
    assert!(next_event(&mut ends).await.execution().unwrap().same_as(&execution));
    assert!(starts.try_recv().is_none());
}

#[tokio::test]
async fn test_diverging_line_abandons_continuation() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");
    let mut events = registry.subscribe();

    let multi = registry
        .request_new_execution(&session, "make\nmake install", None)
        .await
        .unwrap();

    registry.handle_notification(&session, start("make", Confidence::High)).await;
    assert!(next_event(&mut events).await.execution().unwrap().same_as(&multi));

    // The user interrupted and typed something else
    registry.handle_notification(&session, start("htop", Confidence::High)).await;

    let ended = next_event(&mut events).await;
    assert_eq!(ended.kind(), EventKind::ExecutionEnded);
    assert!(ended.execution().unwrap().same_as(&multi));

    let started = next_event(&mut events).await;
    assert_eq!(started.kind(), EventKind::ExecutionStarted);
    assert_eq!(event_command(&started), "htop");
}

#[tokio::test]
async fn test_end_ignored_while_lines_remain() {
    let registry = ShellIntegrationRegistry::default();
    let session = SessionId::new("term-1");

    registry
        .request_new_execution(&session, "a\nb\nc", None)
        .await
        .unwrap();
    registry.handle_notification(&session, start("a", Confidence::High)).await;
    registry.handle_notification(&session, end("a", Confidence::High, Some(0))).await;

    let tracker = registry.tracker(&session).await.unwrap();
    assert_eq!(tracker.state().await, TrackerState::Running);

    registry.handle_notification(&session, start("b\nc", Confidence::High)).await;
    registry.handle_notification(&session, end("b\nc", Confidence::High, Some(2))).await;
    assert_ne!(tracker.state().await, TrackerState::Running);
}
