//! Contract Tests for Execution Data Streams
//!
//! These tests define the expected behavior of the multi-consumer output
//! stream: independent consumers, a single end marker per consumer, and a
//! flush gate that waits for readers to drain.

use futures::StreamExt;
use std::time::Duration;
use termexec::stream::DataStream;

#[tokio::test]
async fn test_each_consumer_sees_chunks_after_creation() {
    let stream = DataStream::new();
    let early = stream.produce_lazy_sequence();
    stream.emit("one ");
    let late = stream.produce_lazy_sequence();
    stream.emit("two");
    stream.close();

    assert_eq!(early.read_to_string().await, "one two");
    assert_eq!(late.read_to_string().await, "two");
}

#[tokio::test]
async fn test_consumer_created_after_close_is_exhausted() {
    let stream = DataStream::new();
    stream.emit("lost");
    stream.close();

    let mut sequence = stream.produce_lazy_sequence();
    assert_eq!(sequence.next().await, None);
    assert_eq!(stream.stats().consumers_created, 0);
}

#[tokio::test]
async fn test_end_marker_observed_once_and_stays_ended() {
    let stream = DataStream::new();
    let mut sequence = stream.produce_lazy_sequence();
    stream.emit("x");
    stream.close();

    assert_eq!(sequence.next().await.as_deref(), Some("x"));
    assert_eq!(sequence.next().await, None);
    assert_eq!(sequence.next().await, None);
}

#[tokio::test]
async fn test_writes_after_close_are_ignored() {
    let stream = DataStream::new();
    let sequence = stream.produce_lazy_sequence();
    stream.emit("kept");
    stream.close();
    stream.emit("dropped");
    stream.close();

    assert_eq!(sequence.read_to_string().await, "kept");
    assert_eq!(stream.stats().late_writes, 2);
}

#[tokio::test]
async fn test_flush_without_consumers_resolves_immediately() {
    let stream = DataStream::new();
    stream.emit("nobody listens");
    stream.close();

    tokio::time::timeout(Duration::from_millis(50), stream.flush())
        .await
        .expect("flush with zero consumers must not wait");
    assert!(stream.is_flushed());
}

#[tokio::test]
async fn test_flush_waits_for_reader_to_drain() {
    let stream = DataStream::with_flush_timeout(Duration::from_secs(30));
    let mut sequence = stream.produce_lazy_sequence();
    stream.emit("tail");
    stream.close();

    let flusher = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.flush().await })
    };
    tokio::task::yield_now().await;
    assert!(!flusher.is_finished());

    assert_eq!(sequence.next().await.as_deref(), Some("tail"));
    assert_eq!(sequence.next().await, None);
    tokio::time::timeout(Duration::from_secs(1), flusher)
        .await
        .expect("flush should finish once the reader drained")
        .unwrap();
}

#[tokio::test]
async fn test_dropped_reader_does_not_block_flush() {
    let stream = DataStream::new();
    let sequence = stream.produce_lazy_sequence();
    stream.emit("unread");
    stream.close();
    drop(sequence);

    tokio::time::timeout(Duration::from_millis(50), stream.flush())
        .await
        .expect("dropped consumers count as drained");
}

#[tokio::test(start_paused = true)]
async fn test_flush_gives_up_after_timeout() {
    let stream = DataStream::with_flush_timeout(Duration::from_millis(200));
    let _stuck = stream.produce_lazy_sequence();
    stream.close();

    let started = tokio::time::Instant::now();
    stream.flush().await;
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_abort_discards_buffered_chunks() {
    let stream = DataStream::new();
    let mut sequence = stream.produce_lazy_sequence();
    stream.emit("never read");
    stream.abort();

    assert!(stream.is_aborted());
    assert!(stream.is_closed());
    assert_eq!(sequence.next().await, None);
}

#[tokio::test]
async fn test_slow_reader_does_not_block_others() {
    let stream = DataStream::new();
    let fast = stream.produce_lazy_sequence();
    let _slow = stream.produce_lazy_sequence();

    for i in 0..1000 {
        stream.emit(format!("{}\n", i));
    }
    stream.close();

    let text = fast.read_to_string().await;
    assert_eq!(text.lines().count(), 1000);
    assert_eq!(stream.stats().chunks_emitted, 1000);
}
