//! Observer side of an operation's event stream

use crate::OperationRegistry;
use pkgd_events::ProgressEvent;
use pkgd_types::OperationId;
use std::sync::Weak;
use tokio::sync::mpsc;

/// Identifies one attached observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Live feed of events appended after attach
///
/// The stream ends after the terminal event. Dropping the subscription
/// detaches the observer.
#[derive(Debug)]
pub struct Subscription {
    operation: OperationId,
    id: Option<SubscriptionId>,
    receiver: Option<mpsc::UnboundedReceiver<ProgressEvent>>,
    registry: Weak<OperationRegistry>,
}

impl Subscription {
    pub(crate) fn open(
        operation: OperationId,
        id: SubscriptionId,
        receiver: mpsc::UnboundedReceiver<ProgressEvent>,
        registry: Weak<OperationRegistry>,
    ) -> Self {
        Self {
            operation,
            id: Some(id),
            receiver: Some(receiver),
            registry,
        }
    }

    /// Subscription to an operation that already finished
    pub(crate) fn closed(operation: OperationId) -> Self {
        Self {
            operation,
            id: None,
            receiver: None,
            registry: Weak::new(),
        }
    }

    #[must_use]
    pub fn operation(&self) -> OperationId {
        self.operation
    }

    #[must_use]
    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    /// Whether this subscription can still yield events
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    /// Next event, or `None` once the stream ended
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        let receiver = self.receiver.as_mut()?;
        let event = receiver.recv().await;
        if event.is_none() {
            self.receiver = None;
        }
        event
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.as_mut()?.try_recv().ok()
    }

    /// Stop observing
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.receiver = None;
        if let Some(id) = self.id.take() {
            if let Some(registry) = self.registry.upgrade() {
                registry.detach(self.operation, id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
