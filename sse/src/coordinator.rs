//! The coordinator: a single task that owns the client registry.
//!
//! Registration, deregistration and broadcast requests all travel over one
//! channel and are applied one at a time, in arrival order. Nothing else ever
//! touches the registry, so a fan-out always sees a consistent set of clients
//! and no locking is needed.

use crate::connection::{ConnectionId, Enqueue, QueueSender};
use crate::error::Error;
use crate::frame::Frame;
use log::*;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Default number of requests that may wait for the coordinator before
/// producers start to suspend.
pub const DEFAULT_REQUEST_BUFFER: usize = 64;

#[derive(Debug)]
enum Request {
    Register {
        id: ConnectionId,
        sender: QueueSender,
    },
    Deregister {
        id: ConnectionId,
    },
    Broadcast {
        frame: Frame,
    },
    ClientCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Counts from a single fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fanout {
    pub delivered: usize,
    pub evicted: usize,
}

/// Active client queues keyed by connection.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ConnectionId, QueueSender>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ConnectionId, sender: QueueSender) {
        self.clients.insert(id, sender);
    }

    /// Removes a client. Returns `false` if it was not registered.
    pub fn deregister(&mut self, id: &ConnectionId) -> bool {
        self.clients.remove(id).is_some()
    }

    /// Enqueues `frame` on every registered client. Clients whose queue is
    /// full or whose handler has gone away are removed.
    pub fn broadcast(&mut self, frame: &Frame) -> Fanout {
        let mut fanout = Fanout::default();

        self.clients
            .retain(|id, sender| match sender.enqueue(frame.clone()) {
                Enqueue::Queued => {
                    fanout.delivered += 1;
                    true
                }
                Enqueue::Full => {
                    warn!(
                        "Client queue for connection {} is full, disconnecting it",
                        id.as_str()
                    );
                    fanout.evicted += 1;
                    false
                }
                Enqueue::Closed => {
                    debug!(
                        "Connection {} stopped reading, removing it from the registry",
                        id.as_str()
                    );
                    fanout.evicted += 1;
                    false
                }
            });

        fanout
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.clients.contains_key(id)
    }
}

/// Handle to the coordinator task. Clones share the same task.
#[derive(Debug, Clone)]
pub struct Coordinator {
    requests: mpsc::Sender<Request>,
}

impl Coordinator {
    /// Spawns the coordinator task on the current tokio runtime. The task runs
    /// until every `Coordinator` handle has been dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(request_buffer: usize) -> Self {
        let (requests, inbox) = mpsc::channel(request_buffer.max(1));
        tokio::spawn(run(inbox));
        Self { requests }
    }

    async fn submit(&self, request: Request) -> Result<(), Error> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::coordinator_unavailable())
    }

    pub async fn register(&self, id: ConnectionId, sender: QueueSender) -> Result<(), Error> {
        self.submit(Request::Register { id, sender }).await
    }

    pub async fn deregister(&self, id: ConnectionId) -> Result<(), Error> {
        self.submit(Request::Deregister { id }).await
    }

    /// Queues `frame` for fan-out. Returns once the coordinator has accepted
    /// the request, not once clients have received it.
    pub async fn broadcast(&self, frame: Frame) -> Result<(), Error> {
        self.submit(Request::Broadcast { frame }).await
    }

    /// Number of registered clients, as seen after every request submitted
    /// before this one has been applied.
    pub async fn client_count(&self) -> Result<usize, Error> {
        let (reply, count) = oneshot::channel();
        self.submit(Request::ClientCount { reply }).await?;
        count.await.map_err(|_| Error::coordinator_unavailable())
    }

    /// Best-effort deregistration from synchronous code. If the request
    /// channel is full the client is left for the next broadcast to evict,
    /// which happens as soon as its queue is found closed.
    pub(crate) fn try_deregister(&self, id: ConnectionId) {
        if let Err(e) = self.requests.try_send(Request::Deregister { id }) {
            debug!("Deferred deregistration to next broadcast: {e}");
        }
    }
}

async fn run(mut inbox: mpsc::Receiver<Request>) {
    let mut registry = Registry::new();
    debug!("SSE coordinator started");

    while let Some(request) = inbox.recv().await {
        match request {
            Request::Register { id, sender } => {
                registry.register(id.clone(), sender);
                info!(
                    "Registered SSE connection {} ({} active)",
                    id.as_str(),
                    registry.len()
                );
            }
            Request::Deregister { id } => {
                if registry.deregister(&id) {
                    info!(
                        "Unregistered SSE connection {} ({} active)",
                        id.as_str(),
                        registry.len()
                    );
                }
            }
            Request::Broadcast { frame } => {
                let fanout = registry.broadcast(&frame);
                debug!(
                    "Broadcast {} byte frame to {} client(s), evicted {}",
                    frame.len(),
                    fanout.delivered,
                    fanout.evicted
                );
            }
            Request::ClientCount { reply } => {
                // The asker may have given up waiting
                let _ = reply.send(registry.len());
            }
        }
    }

    debug!("SSE coordinator stopped");
}

/// Keeps a connection registered for as long as it is alive.
///
/// `release` deregisters through the coordinator in order with every other
/// request. If the owning future is dropped before that, `Drop` falls back to
/// a non-blocking deregistration.
pub(crate) struct Registration {
    coordinator: Coordinator,
    id: Option<ConnectionId>,
}

impl Registration {
    pub(crate) async fn acquire(
        coordinator: &Coordinator,
        id: ConnectionId,
        sender: QueueSender,
    ) -> Result<Self, Error> {
        coordinator.register(id.clone(), sender).await?;
        Ok(Self {
            coordinator: coordinator.clone(),
            id: Some(id),
        })
    }

    pub(crate) async fn release(mut self) {
        // `id` stays set until the request is accepted so that `Drop` still
        // deregisters if this future is dropped mid-send
        if let Some(id) = self.id.clone() {
            match self.coordinator.deregister(id).await {
                Ok(()) => self.id = None,
                Err(e) => warn!("Failed to unregister SSE connection: {e}"),
            }
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.coordinator.try_deregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ClientQueue, QueuePolicy};
    use crate::frame::encode_str;

    fn client(registry: &mut Registry, policy: QueuePolicy) -> ClientQueue {
        let (sender, queue) = ClientQueue::new(policy);
        registry.register(queue.id().clone(), sender);
        queue
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_registered_client() {
        let mut registry = Registry::new();
        let mut first = client(&mut registry, QueuePolicy::Unbounded);
        let mut second = client(&mut registry, QueuePolicy::Unbounded);

        let frame = encode_str("", "greeting", "hi");
        assert_eq!(
            registry.broadcast(&frame),
            Fanout {
                delivered: 2,
                evicted: 0
            }
        );
        assert_eq!(first.recv().await, Some(frame.clone()));
        assert_eq!(second.recv().await, Some(frame));
    }

    #[test]
    fn test_deregister_twice_is_a_noop() {
        let mut registry = Registry::new();
        let queue = client(&mut registry, QueuePolicy::Unbounded);

        assert!(registry.deregister(queue.id()));
        assert!(!registry.deregister(queue.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_deregistered_client_receives_nothing() {
        let mut registry = Registry::new();
        let mut queue = client(&mut registry, QueuePolicy::Unbounded);
        registry.deregister(queue.id());

        assert_eq!(registry.broadcast(&encode_str("", "", "late")).delivered, 0);
        // sender dropped with the registry entry
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_full_bounded_queue_is_evicted_without_affecting_others() {
        let mut registry = Registry::new();
        let mut slow = client(&mut registry, QueuePolicy::Bounded { capacity: 1 });
        let mut fast = client(&mut registry, QueuePolicy::Unbounded);

        let first = encode_str("", "", "1");
        let second = encode_str("", "", "2");
        assert_eq!(registry.broadcast(&first).delivered, 2);
        assert_eq!(
            registry.broadcast(&second),
            Fanout {
                delivered: 1,
                evicted: 1
            }
        );

        assert!(!registry.contains(slow.id()));
        assert!(registry.contains(fast.id()));
        assert_eq!(slow.recv().await, Some(first.clone()));
        assert_eq!(slow.recv().await, None);
        assert_eq!(fast.recv().await, Some(first));
        assert_eq!(fast.recv().await, Some(second));
    }

    #[test]
    fn test_closed_queue_is_evicted_on_broadcast() {
        let mut registry = Registry::new();
        let queue = client(&mut registry, QueuePolicy::Unbounded);
        let id = queue.id().clone();
        drop(queue);

        assert_eq!(registry.broadcast(&encode_str("", "", "x")).evicted, 1);
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn test_requests_are_applied_in_arrival_order() {
        let coordinator = Coordinator::spawn(DEFAULT_REQUEST_BUFFER);
        let (sender, mut queue) = ClientQueue::new(QueuePolicy::Unbounded);
        let id = queue.id().clone();

        coordinator.broadcast(encode_str("", "", "before")).await.unwrap();
        coordinator.register(id.clone(), sender).await.unwrap();
        coordinator.broadcast(encode_str("", "", "during")).await.unwrap();
        coordinator.deregister(id.clone()).await.unwrap();
        coordinator.broadcast(encode_str("", "", "after")).await.unwrap();
        coordinator.deregister(id).await.unwrap();

        assert_eq!(coordinator.client_count().await.unwrap(), 0);
        assert_eq!(queue.recv().await, Some(encode_str("", "", "during")));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_registration_deregisters() {
        let coordinator = Coordinator::spawn(DEFAULT_REQUEST_BUFFER);
        let (sender, queue) = ClientQueue::new(QueuePolicy::Unbounded);

        let registration = Registration::acquire(&coordinator, queue.id().clone(), sender)
            .await
            .unwrap();
        assert_eq!(coordinator.client_count().await.unwrap(), 1);

        drop(registration);
        assert_eq!(coordinator.client_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_released_registration_deregisters() {
        let coordinator = Coordinator::spawn(DEFAULT_REQUEST_BUFFER);
        let (sender, queue) = ClientQueue::new(QueuePolicy::Unbounded);

        let registration = Registration::acquire(&coordinator, queue.id().clone(), sender)
            .await
            .unwrap();
        registration.release().await;
        assert_eq!(coordinator.client_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_dropped_while_waiting_still_deregisters() {
        // one slot, still taken by the register request
        let coordinator = Coordinator::spawn(1);
        let (sender, queue) = ClientQueue::new(QueuePolicy::Unbounded);
        let registration = Registration::acquire(&coordinator, queue.id().clone(), sender)
            .await
            .unwrap();

        let mut release = Box::pin(registration.release());
        assert!(futures::poll!(&mut release).is_pending());

        // let the coordinator take the register request, then give up on release
        tokio::task::yield_now().await;
        drop(release);

        assert_eq!(coordinator.client_count().await.unwrap(), 0);
        drop(queue);
    }
}
