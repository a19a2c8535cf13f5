//! In-memory Server-Sent Events (SSE) broadcaster.
//!
//! Producers hand events to a [`Streamer`]; every client connected at the
//! moment an event is processed gets a copy over its own long-lived
//! `text/event-stream` response.
//!
//! # Architecture
//!
//! - **Single coordinator**: one task owns the registry of connected clients.
//!   Register, deregister and broadcast requests share one FIFO channel, so a
//!   fan-out never observes a half-updated registry and no locks are needed.
//! - **Per-client queues**: the coordinator only enqueues; each connection
//!   handler drains its own queue onto its transport. A slow client never
//!   delays another one. See [`QueuePolicy`] for what happens when a client
//!   stops reading.
//! - **Ephemeral events**: nothing is persisted or replayed. A client that
//!   connects after an event was processed never sees it.
//!
//! # Message Flow
//!
//! 1. A client opens the stream; its handler registers a client queue
//! 2. A producer calls `send_string`, `send_json`, ...
//! 3. The event is encoded once into a [`Frame`] and submitted to the coordinator
//! 4. The coordinator enqueues the frame on every registered queue
//! 5. Each handler writes the frame to its transport and flushes
//! 6. When the transport reports the client gone, the handler deregisters
//!
//! # Example
//!
//! ```rust,ignore
//! use sse::{http, Streamer};
//!
//! let streamer = Streamer::new();
//! let app = http::router(streamer.clone(), "/events");
//!
//! // anywhere else
//! streamer.send_string("", "greeting", "hi").await;
//! ```
//!
//! # Modules
//!
//! - `frame`: `text/event-stream` encoding
//! - `connection`: connection ids and per-client queues
//! - `coordinator`: the registry-owning task
//! - `handler`: the `Transport` abstraction and per-connection loop
//! - `streamer`: the public facade
//! - `http`: axum transport, handler and router

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod frame;
pub mod handler;
pub mod http;
pub mod streamer;

#[cfg(test)]
mod test_support;

pub use connection::{ConnectionId, QueuePolicy};
pub use error::{Error, ErrorKind};
pub use frame::{EventType, Frame};
pub use handler::Transport;
pub use streamer::{Streamer, StreamerOptions};
