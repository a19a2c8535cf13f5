use crate::frame::Frame;
use tokio::sync::mpsc::{
    self,
    error::TrySendError,
    Receiver, Sender, UnboundedReceiver, UnboundedSender,
};

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Capacity policy for per-client delivery queues.
///
/// The coordinator fans out to every client queue inside one serialized step,
/// so it never waits on a queue:
///
/// - `Unbounded`: enqueueing always succeeds. A client that stops reading makes
///   its queue grow without limit until its transport reports the disconnect.
/// - `Bounded`: a client whose queue is full when a frame arrives is
///   disconnected. Its handler sees the queue close and terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    #[default]
    Unbounded,
    Bounded { capacity: usize },
}

/// Result of offering a frame to one client queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Bounded queue at capacity; the client has to be dropped.
    Full,
    /// The owning connection handler is gone.
    Closed,
}

/// Write half of a client queue. Only the coordinator holds one.
#[derive(Debug)]
pub enum QueueSender {
    Unbounded(UnboundedSender<Frame>),
    Bounded(Sender<Frame>),
}

impl QueueSender {
    /// Offers `frame` without waiting.
    pub fn enqueue(&self, frame: Frame) -> Enqueue {
        match self {
            QueueSender::Unbounded(sender) => match sender.send(frame) {
                Ok(()) => Enqueue::Queued,
                Err(_) => Enqueue::Closed,
            },
            QueueSender::Bounded(sender) => match sender.try_send(frame) {
                Ok(()) => Enqueue::Queued,
                Err(TrySendError::Full(_)) => Enqueue::Full,
                Err(TrySendError::Closed(_)) => Enqueue::Closed,
            },
        }
    }
}

#[derive(Debug)]
enum QueueReceiver {
    Unbounded(UnboundedReceiver<Frame>),
    Bounded(Receiver<Frame>),
}

/// Read half of a client queue, owned by exactly one connection handler.
#[derive(Debug)]
pub struct ClientQueue {
    id: ConnectionId,
    receiver: QueueReceiver,
}

impl ClientQueue {
    /// Creates a queue under `policy`, returning the sender to hand to the
    /// coordinator and the queue for the connection handler to drain.
    pub fn new(policy: QueuePolicy) -> (QueueSender, ClientQueue) {
        let (sender, receiver) = match policy {
            QueuePolicy::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
            }
            QueuePolicy::Bounded { capacity } => {
                // tokio rejects zero-capacity channels
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
            }
        };

        (
            sender,
            ClientQueue {
                id: ConnectionId::new(),
                receiver,
            },
        )
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Waits for the next frame. Returns `None` once the coordinator has
    /// dropped the sender and every queued frame has been taken.
    pub async fn recv(&mut self) -> Option<Frame> {
        match &mut self.receiver {
            QueueReceiver::Unbounded(rx) => rx.recv().await,
            QueueReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}
