//! Per-connection delivery loop.
//!
//! A connection moves through `Connecting -> Streaming -> Closed`. While
//! streaming, every frame taken from the client queue is written and flushed
//! straight away. The loop ends when the transport reports the remote end
//! closed, when a write fails, or when the coordinator drops the queue.

use crate::connection::ClientQueue;
use crate::coordinator::{Coordinator, Registration};
use crate::error::{Capability, Error};
use crate::frame::{self, Frame};
use crate::streamer::StreamerOptions;
use async_trait::async_trait;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use log::*;
use std::future::Future;
use std::io;
use std::pin::Pin;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Resolves once the remote end of a transport has gone away.
pub type CloseNotify = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The response side of a streaming connection, provided by the HTTP layer.
#[async_trait]
pub trait Transport: Send {
    /// Whether `flush` actually pushes buffered bytes to the client.
    fn supports_flush(&self) -> bool {
        true
    }

    /// Returns a signal for the remote end closing, or `None` if the
    /// transport cannot detect it.
    fn close_notify(&mut self) -> Option<CloseNotify>;

    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Refuses the connection with a plain error response.
    async fn reject(&mut self, status: StatusCode, message: &str);

    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;
}

/// Runs one connection until it closes.
pub(crate) async fn serve<T>(
    coordinator: &Coordinator,
    options: &StreamerOptions,
    transport: &mut T,
) -> Result<(), Error>
where
    T: Transport + ?Sized,
{
    // Connecting
    let closed = match check_capabilities(transport) {
        Ok(closed) => closed,
        Err(e) => {
            warn!("Refusing SSE connection: {e}");
            transport
                .reject(StatusCode::NOT_IMPLEMENTED, &e.to_string())
                .await;
            return Err(e);
        }
    };

    transport.set_header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    transport.set_header(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    transport.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );

    let (sender, queue) = ClientQueue::new(options.queue_policy);
    let registration = Registration::acquire(coordinator, queue.id().clone(), sender).await?;
    let connection_id = queue.id().clone();

    // Streaming. Flushing here sends the response head before the first event.
    let outcome = match transport.flush().await {
        Ok(()) => stream(transport, queue, closed, options).await,
        Err(e) => Err(Error::transport_write(e)),
    };

    // Closed
    match &outcome {
        Ok(()) => debug!("SSE connection {} closed", connection_id.as_str()),
        Err(e) => warn!(
            "SSE connection {} dropped after error: {e}",
            connection_id.as_str()
        ),
    }
    registration.release().await;

    outcome
}

fn check_capabilities<T>(transport: &mut T) -> Result<CloseNotify, Error>
where
    T: Transport + ?Sized,
{
    if !transport.supports_flush() {
        return Err(Error::unsupported(Capability::Flush));
    }
    transport
        .close_notify()
        .ok_or_else(|| Error::unsupported(Capability::CloseNotify))
}

async fn stream<T>(
    transport: &mut T,
    mut queue: ClientQueue,
    mut closed: CloseNotify,
    options: &StreamerOptions,
) -> Result<(), Error>
where
    T: Transport + ?Sized,
{
    // a zero period disables keep-alive
    let mut keep_alive = options.keep_alive.filter(|p| !p.is_zero()).map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let connection_id = queue.id().clone();

    loop {
        tokio::select! {
            biased;

            _ = &mut closed => return Ok(()),

            next = queue.recv() => match next {
                Some(frame) => deliver(&mut *transport, frame).await?,
                None => {
                    info!(
                        "SSE connection {} was disconnected by the coordinator",
                        connection_id.as_str()
                    );
                    return Ok(());
                }
            },

            _ = tick(&mut keep_alive) => deliver(&mut *transport, frame::comment("")).await?,
        }
    }
}

async fn deliver<T>(transport: &mut T, frame: Frame) -> Result<(), Error>
where
    T: Transport + ?Sized,
{
    transport
        .write(frame.into_bytes())
        .await
        .map_err(Error::transport_write)?;
    transport.flush().await.map_err(Error::transport_write)
}

async fn tick(keep_alive: &mut Option<Interval>) {
    match keep_alive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
