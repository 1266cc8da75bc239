use async_trait::async_trait;
use ccd_types::{events::DashboardEvent, Result};
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DashboardEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, DashboardEvent>;
}

/// In-process fan-out of dashboard events backed by a broadcast channel.
///
/// Slow subscribers miss intermediate events; each view event is a full
/// snapshot so only the latest one matters.
#[derive(Clone)]
pub struct DashboardBus {
    tx: broadcast::Sender<DashboardEvent>,
}

impl DashboardBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl EventSink for DashboardBus {
    async fn publish(&self, event: DashboardEvent) -> Result<()> {
        if self.tx.send(event).is_err() {
            trace!("no subscribers for dashboard event");
        }
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, DashboardEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccd_types::events::{EventKind, LifecyclePhase};

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = DashboardBus::new(8);
        let mut events = bus.subscribe();
        bus.publish(DashboardEvent::lifecycle(LifecyclePhase::Started, None))
            .await
            .unwrap();
        let event = events.next().await.expect("event");
        assert_eq!(event.kind, EventKind::Lifecycle);
    }
}
