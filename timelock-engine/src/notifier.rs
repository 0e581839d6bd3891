use std::sync::Arc;

use timelock_protocol::execution::{LifecycleEvent, LifecycleEventKind};
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

/// Receives state-transition events. Delivery is fire-and-forget.
pub trait LifecycleNotifier: Send + Sync + 'static {
    fn emit(&self, event: &LifecycleEvent);
}

/// Writes one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl LifecycleNotifier for TracingNotifier {
    fn emit(&self, event: &LifecycleEvent) {
        match event.kind {
            LifecycleEventKind::Failed | LifecycleEventKind::GaveUp => warn!(
                event = event.name(),
                request_id = %event.request_id,
                proposal_id = %event.proposal_id,
                attempts = event.attempts,
                error = event.error.as_deref().unwrap_or(""),
                "execution lifecycle"
            ),
            _ => info!(
                event = event.name(),
                request_id = %event.request_id,
                proposal_id = %event.proposal_id,
                attempts = event.attempts,
                status = %event.status,
                actor = event.actor.as_deref().unwrap_or(""),
                tx_hash = event.tx_hash.as_deref().unwrap_or(""),
                "execution lifecycle"
            ),
        }
    }
}

/// Publishes events on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl LifecycleNotifier for BroadcastNotifier {
    fn emit(&self, event: &LifecycleEvent) {
        if self.sender.send(event.clone()).is_err() {
            trace!(event = event.name(), "no lifecycle subscribers");
        }
    }
}

/// Delivers every event to each registered notifier in order.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn LifecycleNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn LifecycleNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl LifecycleNotifier for FanoutNotifier {
    fn emit(&self, event: &LifecycleEvent) {
        for notifier in &self.notifiers {
            notifier.emit(event);
        }
    }
}
