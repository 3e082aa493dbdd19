//! Execution Data Streams
//!
//! Fan-out of an execution's output to any number of readers. Every call to
//! [`DataStream::produce_lazy_sequence`] creates an independent consumer
//! with its own unbounded buffer, so a slow reader never holds back the
//! producer or the other readers. Each consumer observes the end of the
//! stream exactly once.
//!
//! ```ignore
//! let stream = DataStream::new();
//! let mut reader = stream.produce_lazy_sequence();
//! stream.emit("hello");
//! stream.close();
//! assert_eq!(reader.next().await.as_deref(), Some("hello"));
//! assert_eq!(reader.next().await, None);
//! ```

use futures::stream::{FusedStream, Stream};
use futures::StreamExt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Default upper bound for [`DataStream::flush`]
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Multi-consumer output stream of one execution
#[derive(Clone)]
pub struct DataStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    state: Mutex<StreamState>,
    aborted: Arc<AtomicBool>,
    flush_timeout: Duration,
}

#[derive(Default)]
struct StreamState {
    /// Live consumer buffers; cleared on close so readers see the end
    senders: Vec<mpsc::UnboundedSender<String>>,
    /// One signal per consumer, fired when it drains or is dropped
    drain_signals: Vec<oneshot::Receiver<()>>,
    closed: bool,
    flushed: bool,
    stats: StreamStats,
}

impl StreamState {
    /// Forget the signals of consumers that already drained or were dropped
    fn prune_drained(&mut self) {
        self.drain_signals
            .retain_mut(|signal| matches!(signal.try_recv(), Err(TryRecvError::Empty)));
    }
}

impl DataStream {
    /// Create an open stream with the default flush timeout
    pub fn new() -> Self {
        Self::with_flush_timeout(DEFAULT_FLUSH_TIMEOUT)
    }

    /// Create an open stream whose `flush` gives up after `flush_timeout`
    pub fn with_flush_timeout(flush_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                state: Mutex::new(StreamState::default()),
                aborted: Arc::new(AtomicBool::new(false)),
                flush_timeout,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new consumer.
    ///
    /// The consumer receives every chunk emitted after this call. On a
    /// stream that already ended the returned sequence is exhausted.
    ///
    /// The consumer counts toward [`flush`](Self::flush) from the moment it
    /// is created, polled or not. Until it reads to its end or is dropped,
    /// `flush` waits for it, for at most the flush timeout. A sequence kept
    /// around without ever being polled therefore delays the end of the
    /// execution by the full timeout.
    pub fn produce_lazy_sequence(&self) -> DataSequence {
        let mut state = self.state();
        if state.closed {
            return DataSequence::exhausted();
        }
        state.prune_drained();

        let (sender, receiver) = mpsc::unbounded_channel();
        let (drained_tx, drained_rx) = oneshot::channel();
        state.senders.push(sender);
        state.drain_signals.push(drained_rx);
        state.stats.consumers_created += 1;

        DataSequence {
            receiver: Some(receiver),
            drained: Some(drained_tx),
            aborted: Some(Arc::clone(&self.inner.aborted)),
        }
    }

    /// Append a chunk for every live consumer. No-op once closed.
    pub fn emit(&self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        let mut state = self.state();
        if state.closed {
            state.stats.late_writes += 1;
            trace!("Dropping {} bytes emitted after stream close", chunk.len());
            return;
        }

        state.stats.chunks_emitted += 1;
        state.stats.bytes_emitted += chunk.len() as u64;
        // Consumers whose sequence was dropped are pruned here
        state.senders.retain(|sender| sender.send(chunk.clone()).is_ok());
        state.prune_drained();
    }

    /// Mark the end of the stream. Consumers finish after the chunks already
    /// buffered for them. Idempotent.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            state.stats.late_writes += 1;
            return;
        }
        state.closed = true;
        state.senders.clear();
    }

    /// Close the stream and make every consumer end at its next poll,
    /// discarding whatever it has not read yet.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.close();
    }

    /// Wait until every consumer has drained to its end or been dropped.
    ///
    /// Resolves immediately when nobody is reading. Gives up after the
    /// stream's flush timeout so a reader that never polls cannot hold the
    /// caller forever.
    pub async fn flush(&self) {
        let signals = {
            let mut state = self.state();
            state.flushed = true;
            std::mem::take(&mut state.drain_signals)
        };
        if signals.is_empty() {
            return;
        }

        let pending = signals.len();
        let drained = futures::future::join_all(signals);
        if tokio::time::timeout(self.inner.flush_timeout, drained)
            .await
            .is_err()
        {
            warn!(
                "Flush timed out after {:?} with {} consumer(s) attached",
                self.inner.flush_timeout, pending
            );
        } else {
            debug!("Flushed stream with {} consumer(s)", pending);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn is_flushed(&self) -> bool {
        self.state().flushed
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Number of consumers still able to receive chunks
    pub fn active_consumers(&self) -> usize {
        self.state().senders.len()
    }

    /// Number of consumers a `flush` would still wait for
    pub fn undrained_consumers(&self) -> usize {
        let mut state = self.state();
        state.prune_drained();
        state.drain_signals.len()
    }

    pub fn stats(&self) -> StreamStats {
        self.state().stats.clone()
    }
}

impl Default for DataStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("DataStream")
            .field("consumers", &state.senders.len())
            .field("closed", &state.closed)
            .field("flushed", &state.flushed)
            .finish()
    }
}

/// One consumer's view of a [`DataStream`].
///
/// Finite and non-restartable: once it yields `None` it keeps yielding
/// `None`.
pub struct DataSequence {
    receiver: Option<mpsc::UnboundedReceiver<String>>,
    drained: Option<oneshot::Sender<()>>,
    aborted: Option<Arc<AtomicBool>>,
}

impl DataSequence {
    fn exhausted() -> Self {
        Self {
            receiver: None,
            drained: None,
            aborted: None,
        }
    }

    fn finish(&mut self) {
        self.receiver = None;
        if let Some(drained) = self.drained.take() {
            let _ = drained.send(());
        }
    }

    /// Read the remaining chunks and concatenate them
    pub async fn read_to_string(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk);
        }
        text
    }
}

impl Stream for DataSequence {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let aborted = this
            .aborted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire));
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(None);
        };
        if aborted {
            this.finish();
            return Poll::Ready(None);
        }

        match receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk)),
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for DataSequence {
    fn is_terminated(&self) -> bool {
        self.receiver.is_none()
    }
}

impl Drop for DataSequence {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Stream statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    /// Chunks accepted while open
    pub chunks_emitted: u64,
    /// Total bytes accepted while open
    pub bytes_emitted: u64,
    /// Consumers created while open
    pub consumers_created: u64,
    /// Emit/close calls that arrived after close
    pub late_writes: u64,
}

impl StreamStats {
    /// Average chunk size in bytes
    pub fn average_chunk_size(&self) -> f64 {
        if self.chunks_emitted == 0 {
            0.0
        } else {
            self.bytes_emitted as f64 / self.chunks_emitted as f64
        }
    }
}
