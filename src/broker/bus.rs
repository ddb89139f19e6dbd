use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::protocol::Envelope;

/// The three isolated execution contexts. There is no shared state
/// between them beyond this bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Scanner,
    Broker,
    Panel,
}

impl ContextId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextId::Scanner => "scanner",
            ContextId::Broker => "broker",
            ContextId::Panel => "panel",
        }
    }
}

/// Fire-and-forget tagged-message routing between contexts. Requests
/// carry a generated correlation id and park a one-shot sender in the
/// pending map; no reply within the timeout is indistinguishable from an
/// explicit failure, exactly as the protocol demands of every sender.
pub struct Bus {
    routes: Mutex<HashMap<ContextId, mpsc::UnboundedSender<Envelope>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Envelope>>>,
    next_correlation: AtomicU64,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_correlation: AtomicU64::new(1),
        }
    }

    pub fn register(&self, context: ContextId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(context, tx);
        rx
    }

    /// Sends without expecting a reply. A missing or torn-down receiver
    /// silently drops the message.
    pub fn send(&self, to: ContextId, envelope: Envelope) {
        let sender = self.routes.lock().get(&to).cloned();
        match sender {
            Some(tx) => {
                if tx.send(envelope).is_err() {
                    tracing::debug!(target: "bus", to = to.as_str(), "receiver gone; message dropped");
                }
            }
            None => {
                tracing::debug!(target: "bus", to = to.as_str(), "no route; message dropped");
            }
        }
    }

    /// Request/reply with a correlation id. Returns `None` on timeout,
    /// missing route, or a dropped reply sender.
    pub async fn request(
        &self,
        to: ContextId,
        mut envelope: Envelope,
        timeout: Duration,
    ) -> Option<Envelope> {
        let correlation_id = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        envelope.correlation_id = Some(correlation_id);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id, tx);
        self.send(to, envelope);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Some(reply),
            _ => {
                self.pending.lock().remove(&correlation_id);
                None
            }
        }
    }

    /// Completes a pending request. Replies to ids nobody is waiting on
    /// are dropped, mirroring the fire-and-forget channel semantics.
    pub fn reply(&self, correlation_id: u64, envelope: Envelope) {
        if let Some(tx) = self.pending.lock().remove(&correlation_id) {
            let _ = tx.send(envelope);
        }
    }
}
