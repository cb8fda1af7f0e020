//! Fire-and-forget delivery of events and notification requests.
//!
//! Mutations hand their events to the [`Dispatcher`] after commit. A bounded
//! queue feeds one background task; when the queue is full or a sink fails
//! the item is logged and dropped. Delivery is at most once.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::{Event, NotificationRequest};

use super::metrics::record_dropped;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), anyhow::Error>;
}

#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), anyhow::Error>;
}

/// Writes events and notification requests to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: &Event) -> Result<(), anyhow::Error> {
        tracing::info!(
            event = %event.name,
            entity = %event.entity,
            actor = %event.actor,
            data = %event.data,
            "Event published"
        );
        Ok(())
    }
}

#[async_trait]
impl NotifySink for TracingSink {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), anyhow::Error> {
        tracing::info!(
            notification = request.notification_type.as_str(),
            entity = %request.entity,
            receivers = ?request.receivers,
            actor = %request.actor,
            "Notification requested"
        );
        Ok(())
    }
}

/// Captures everything it receives.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
    notifications: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn notifications(&self) -> Vec<NotificationRequest> {
        self.notifications.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: &Event) -> Result<(), anyhow::Error> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl NotifySink for MemorySink {
    async fn notify(&self, request: &NotificationRequest) -> Result<(), anyhow::Error> {
        self.notifications.lock().await.push(request.clone());
        Ok(())
    }
}

#[derive(Debug)]
enum Dispatch {
    Event(Event),
    Notification(NotificationRequest),
}

impl Dispatch {
    fn label(&self) -> &'static str {
        match self {
            Dispatch::Event(_) => "event",
            Dispatch::Notification(_) => "notification",
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: mpsc::Sender<Dispatch>,
    shutdown_token: CancellationToken,
}

impl Dispatcher {
    /// Spawns the delivery task. Must be called inside a tokio runtime.
    pub fn start(
        events: Arc<dyn EventSink>,
        notifications: Arc<dyn NotifySink>,
        queue_size: usize,
    ) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::channel(queue_size.max(1));
        let shutdown_token = CancellationToken::new();
        let shutdown = shutdown_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        // Deliver what was already accepted, then stop.
                        while let Ok(item) = rx.try_recv() {
                            deliver(&*events, &*notifications, item).await;
                        }
                        tracing::info!("Dispatcher shutting down");
                        break;
                    }
                    item = rx.recv() => match item {
                        Some(item) => deliver(&*events, &*notifications, item).await,
                        None => {
                            tracing::info!("Dispatch queue closed, dispatcher exiting");
                            break;
                        }
                    }
                }
            }
        });

        (
            Self {
                queue,
                shutdown_token,
            },
            handle,
        )
    }

    pub fn publish(&self, event: Event) {
        self.enqueue(Dispatch::Event(event));
    }

    pub fn notify(&self, request: NotificationRequest) {
        self.enqueue(Dispatch::Notification(request));
    }

    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    fn enqueue(&self, item: Dispatch) {
        let label = item.label();
        match self.queue.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                record_dropped(label);
                tracing::warn!(kind = label, item = ?item, "Dispatch queue full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                record_dropped(label);
                tracing::warn!(kind = label, "Dispatcher stopped, dropping");
            }
        }
    }
}

async fn deliver(events: &dyn EventSink, notifications: &dyn NotifySink, item: Dispatch) {
    match item {
        Dispatch::Event(event) => {
            if let Err(e) = events.publish(&event).await {
                tracing::error!(error = %e, event = %event.name, "Failed to publish event");
            }
        }
        Dispatch::Notification(request) => {
            if let Err(e) = notifications.notify(&request).await {
                tracing::error!(
                    error = %e,
                    notification = request.notification_type.as_str(),
                    "Failed to send notification"
                );
            }
        }
    }
}
