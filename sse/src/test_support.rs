//! In-memory transport used by the crate's tests.

use crate::error::Error;
use crate::handler::{CloseNotify, Transport};
use crate::Streamer;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

pub(crate) const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct MockTransport {
    pub flush_supported: bool,
    close: Option<oneshot::Receiver<()>>,
    pub headers: HeaderMap,
    pub rejected: Option<(StatusCode, String)>,
    written: mpsc::UnboundedSender<Bytes>,
    flushes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    stall: Arc<Stall>,
}

#[derive(Default)]
struct Stall {
    stalled: AtomicBool,
    resume: Notify,
}

/// The remote side of a `MockTransport`.
pub(crate) struct MockClient {
    close: Option<oneshot::Sender<()>>,
    written: mpsc::UnboundedReceiver<Bytes>,
    flushes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    stall: Arc<Stall>,
}

impl MockTransport {
    pub(crate) fn new() -> (MockTransport, MockClient) {
        let (close_tx, close_rx) = oneshot::channel();
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let flushes = Arc::new(AtomicUsize::new(0));
        let fail_writes = Arc::new(AtomicBool::new(false));
        let stall = Arc::new(Stall::default());

        (
            MockTransport {
                flush_supported: true,
                close: Some(close_rx),
                headers: HeaderMap::new(),
                rejected: None,
                written: written_tx,
                flushes: flushes.clone(),
                fail_writes: fail_writes.clone(),
                stall: stall.clone(),
            },
            MockClient {
                close: Some(close_tx),
                written: written_rx,
                flushes,
                fail_writes,
                stall,
            },
        )
    }

    pub(crate) fn without_close_notify(mut self) -> Self {
        self.close = None;
        self
    }

    pub(crate) fn without_flush(mut self) -> Self {
        self.flush_supported = false;
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn supports_flush(&self) -> bool {
        self.flush_supported
    }

    fn close_notify(&mut self) -> Option<CloseNotify> {
        let close = self.close.take()?;
        Some(Box::pin(async move {
            // a dropped MockClient counts as a disconnect too
            let _ = close.await;
        }))
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    async fn reject(&mut self, status: StatusCode, message: &str) {
        self.rejected = Some((status, message.to_string()));
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if self.stall.stalled.load(Ordering::SeqCst) {
            self.stall.resume.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"));
        }
        self.written
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client dropped"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl MockClient {
    /// Next chunk written to the transport, or `None` on timeout.
    pub(crate) async fn next_chunk(&mut self) -> Option<Bytes> {
        tokio::time::timeout(RECV_TIMEOUT, self.written.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns a chunk only if one is already waiting.
    pub(crate) fn try_chunk(&mut self) -> Option<Bytes> {
        self.written.try_recv().ok()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Makes the next write block until `resume_writes` is called.
    pub(crate) fn stall_writes(&self) {
        self.stall.stalled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn resume_writes(&self) {
        self.stall.stalled.store(false, Ordering::SeqCst);
        self.stall.resume.notify_one();
    }

    pub(crate) fn disconnect(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

/// Polls until the streamer reports `expected` connected clients.
pub(crate) async fn wait_for_clients(streamer: &Streamer, expected: usize) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let count = streamer.client_count().await.unwrap();
        if count == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {expected} clients, still have {count}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub(crate) type Connection = JoinHandle<(MockTransport, Result<(), Error>)>;

/// Runs a connection handler for a fresh mock transport on its own task.
pub(crate) fn connect(streamer: &Streamer) -> (Connection, MockClient) {
    let (mut transport, client) = MockTransport::new();
    let streamer = streamer.clone();
    let connection = tokio::spawn(async move {
        let outcome = streamer.handle(&mut transport).await;
        (transport, outcome)
    });
    (connection, client)
}
