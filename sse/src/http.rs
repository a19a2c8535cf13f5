//! Axum integration.
//!
//! `ChannelTransport` bridges a connection handler to an axum streaming
//! response: the handler runs on its own task and writes chunks into a
//! channel that the response body drains. When the client disconnects, hyper
//! drops the body, which closes the channel and fires the close signal.

use crate::error::{Error, ErrorKind};
use crate::handler::{CloseNotify, Transport};
use crate::Streamer;
use async_stream::stream;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use log::*;
use std::convert::Infallible;
use std::io;
use tokio::sync::{mpsc, oneshot};

/// Chunks that may sit between the connection handler and the socket. Once
/// full, writes wait for the client to catch up; frames then pile up in the
/// client queue instead.
const BODY_BUFFER: usize = 16;

/// Status, headers and (for rejections) a plain body, sent once.
struct Head {
    status: StatusCode,
    headers: HeaderMap,
    message: Option<String>,
}

/// A `Transport` writing into an axum response body.
pub struct ChannelTransport {
    head: Option<oneshot::Sender<Head>>,
    headers: HeaderMap,
    chunks: mpsc::Sender<Bytes>,
}

/// The response half of a `ChannelTransport`.
pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    chunks: mpsc::Receiver<Bytes>,
}

/// Creates a connected transport / response pair.
pub fn channel_transport() -> (ChannelTransport, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (chunks_tx, chunks_rx) = mpsc::channel(BODY_BUFFER);

    (
        ChannelTransport {
            head: Some(head_tx),
            headers: HeaderMap::new(),
            chunks: chunks_tx,
        },
        PendingResponse {
            head: head_rx,
            chunks: chunks_rx,
        },
    )
}

impl ChannelTransport {
    /// Sends the response head if that hasn't happened yet.
    fn commit(&mut self, status: StatusCode, message: Option<String>) -> io::Result<()> {
        let Some(head) = self.head.take() else {
            return Ok(());
        };
        head.send(Head {
            status,
            headers: std::mem::take(&mut self.headers),
            message,
        })
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response was dropped"))
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn close_notify(&mut self) -> Option<CloseNotify> {
        let chunks = self.chunks.clone();
        Some(Box::pin(async move { chunks.closed().await }))
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    async fn reject(&mut self, status: StatusCode, message: &str) {
        if self.commit(status, Some(message.to_string())).is_err() {
            debug!("Client left before rejection could be sent");
        }
    }

    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.commit(StatusCode::OK, None)?;
        self.chunks
            .send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        // Each chunk is handed to hyper as its own body frame, so the only
        // thing left to push out is the head.
        self.commit(StatusCode::OK, None)
    }
}

impl PendingResponse {
    /// Waits for the connection handler to commit the head and builds the
    /// response from it.
    pub async fn into_response(self) -> Response {
        let head = match self.head.await {
            Ok(head) => head,
            Err(_) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Event stream unavailable",
                )
                    .into_response()
            }
        };

        if let Some(message) = head.message {
            return (head.status, message).into_response();
        }

        let mut chunks = self.chunks;
        let body = stream! {
            while let Some(chunk) = chunks.recv().await {
                yield Ok::<_, Infallible>(chunk);
            }
        };

        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        response
    }
}

/// Axum handler that streams events to the requesting client.
pub async fn events_handler(State(streamer): State<Streamer>) -> Response {
    debug!("Establishing SSE connection");

    let (mut transport, pending) = channel_transport();
    tokio::spawn(async move {
        match streamer.handle(&mut transport).await {
            Ok(()) => debug!("SSE stream finished"),
            Err(e) => warn!("SSE stream ended with error: {e}"),
        }
    });

    pending.into_response().await
}

/// A router serving the event stream at `path`.
pub fn router(streamer: Streamer, path: &str) -> Router {
    Router::new()
        .route(path, get(events_handler))
        .with_state(streamer)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.error_kind {
            ErrorKind::UnsupportedTransport(_) => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Encoding => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::CoordinatorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::TransportWrite => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut response = (status, self.to_string()).into_response();
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        );
        response
    }
}
