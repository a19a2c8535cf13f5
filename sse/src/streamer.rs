use crate::connection::QueuePolicy;
use crate::coordinator::{Coordinator, DEFAULT_REQUEST_BUFFER};
use crate::error::Error;
use crate::frame::{self, EventType, Frame};
use crate::handler::{self, Transport};
use log::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Tuning knobs for a [`Streamer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerOptions {
    /// Capacity policy for each client's delivery queue.
    pub queue_policy: QueuePolicy,
    /// Interval for `:` comment frames on idle connections. `None` disables them.
    pub keep_alive: Option<Duration>,
    /// How many requests may wait for the coordinator before producers suspend.
    pub request_buffer: usize,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            queue_policy: QueuePolicy::default(),
            keep_alive: None,
            request_buffer: DEFAULT_REQUEST_BUFFER,
        }
    }
}

/// Receives events and broadcasts them to all connected clients.
///
/// If the id or event type passed to a `send_*` method is empty, the frame
/// carries no `id:` / `event:` line. Cloning is cheap; clones feed the same
/// set of clients.
#[derive(Debug, Clone)]
pub struct Streamer {
    coordinator: Coordinator,
    options: Arc<StreamerOptions>,
}

impl Streamer {
    /// Creates a streamer with default options.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new() -> Self {
        Self::with_options(StreamerOptions::default())
    }

    pub fn with_options(options: StreamerOptions) -> Self {
        debug!("Starting SSE streamer with {options:?}");
        Self {
            coordinator: Coordinator::spawn(options.request_buffer),
            options: Arc::new(options),
        }
    }

    /// Sends an event with the given bytes as its data.
    pub async fn send_bytes(&self, id: &str, event_type: &str, data: &[u8]) {
        self.send_frame(frame::encode(id, event_type, data)).await;
    }

    pub async fn send_string(&self, id: &str, event_type: &str, data: &str) {
        self.send_frame(frame::encode_str(id, event_type, data)).await;
    }

    pub async fn send_int(&self, id: &str, event_type: &str, data: i64) {
        self.send_frame(frame::encode_int(id, event_type, data)).await;
    }

    pub async fn send_uint(&self, id: &str, event_type: &str, data: u64) {
        self.send_frame(frame::encode_uint(id, event_type, data)).await;
    }

    /// Sends an event with `value` encoded as JSON. If `value` cannot be
    /// serialized nothing is broadcast and an `Encoding` error is returned.
    pub async fn send_json<T>(&self, id: &str, event_type: &str, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let frame = frame::encode_json(id, event_type, value).map_err(|e| {
            error!("Failed to serialize SSE event: {e}");
            e
        })?;
        self.coordinator.broadcast(frame).await
    }

    /// Sends a structured event, using its own type name as the event type.
    pub async fn send_event<E>(&self, id: &str, event: &E) -> Result<(), Error>
    where
        E: EventType + Serialize,
    {
        self.send_json(id, event.event_type(), event).await
    }

    /// Broadcasts an already encoded frame.
    pub async fn send_frame(&self, frame: Frame) {
        if let Err(e) = self.coordinator.broadcast(frame).await {
            error!("Dropping SSE event: {e}");
        }
    }

    /// Streams events to one client over `transport` and returns once the
    /// connection has closed.
    ///
    /// Fails immediately with `UnsupportedTransport` if the transport cannot
    /// flush or report closure; the client is sent a 501 and never
    /// registered. A failed write ends the connection with `TransportWrite`
    /// without affecting other clients.
    pub async fn handle<T>(&self, transport: &mut T) -> Result<(), Error>
    where
        T: Transport + ?Sized,
    {
        handler::serve(&self.coordinator, &self.options, transport).await
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> Result<usize, Error> {
        self.coordinator.client_count().await
    }
}

impl Default for Streamer {
    fn default() -> Self {
        Self::new()
    }
}
