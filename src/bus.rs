//! Domain-event publication.
//!
//! Best-effort: events are published after the state change they describe has
//! committed, and a publish failure is logged but never fails the request.

use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
    recorded: Option<Arc<Mutex<Vec<DomainEvent>>>>,
}

impl EventBus {
    /// Drops every event.
    pub fn disabled() -> Self { Self::default() }

    /// Keeps events in memory; see [`EventBus::recorded`].
    pub fn in_memory() -> Self {
        Self { nats: None, recorded: Some(Arc::default()) }
    }

    pub fn nats(client: async_nats::Client) -> Self {
        Self { nats: Some(client), recorded: None }
    }

    /// Connects when a URL is given. An unreachable server disables publication.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => Self::nats(client),
            Err(e) => {
                warn!(error = %e, url, "NATS unavailable, domain events disabled");
                Self::disabled()
            }
        }
    }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        if let Some(recorded) = &self.recorded {
            if let Ok(mut log) = recorded.lock() {
                log.extend(events.iter().cloned());
            }
        }
        let Some(client) = &self.nats else { return };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, %subject, "failed to encode event");
                    continue;
                }
            };
            match client.publish(subject.clone(), payload.into()).await {
                Ok(()) => debug!(%subject, "event published"),
                Err(e) => warn!(error = %e, %subject, "failed to publish event"),
            }
        }
    }

    /// Events captured by an in-memory bus, oldest first.
    pub fn recorded(&self) -> Vec<DomainEvent> {
        self.recorded.as_ref().and_then(|r| r.lock().ok().map(|log| log.clone())).unwrap_or_default()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("nats", &self.nats.is_some()).field("recording", &self.recorded.is_some()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PaymentEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_in_memory_bus_records_in_order() {
        let bus = EventBus::in_memory();
        let failed = |code: &str| DomainEvent::Payment(PaymentEvent::Failed { transaction_code: code.into(), order_id: Uuid::nil() });
        bus.publish_all(vec![failed("TXN1"), failed("TXN2")]).await;
        let recorded = bus.recorded();
        assert_eq!(recorded, vec![failed("TXN1"), failed("TXN2")]);
        assert!(EventBus::disabled().recorded().is_empty());
    }
}
