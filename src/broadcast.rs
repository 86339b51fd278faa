//! ==============================================================================
//! broadcast.rs - fan-out of live events to dashboard sessions
//! ==============================================================================
//!
//! purpose:
//!     fire-and-forget publish to every session subscribed at that moment.
//!     each subscriber gets a bounded buffer; one that falls behind loses its
//!     oldest events instead of stalling the publisher.
//!
//! ==============================================================================

use tokio::sync::broadcast;

use crate::domain::Event;

/// what a subscriber gets back from `next()`
#[derive(Debug, PartialEq)]
pub enum Delivery {
    Event(Event),
    /// this many events were dropped because the subscriber was too slow
    Lagged(u64),
    Closed,
}

#[derive(Clone, Debug)]
pub struct Hub {
    tx: broadcast::Sender<Event>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// push to everyone listening right now; returns how many sessions got it
    pub fn publish(&self, event: Event) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                tracing::debug!(event = name, "no dashboard sessions connected");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription { rx: self.tx.subscribe() }
    }

    pub fn session_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// one session's view of the hub
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    pub async fn next(&mut self) -> Delivery {
        match self.rx.recv().await {
            Ok(event) => Delivery::Event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Delivery::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => Delivery::Closed,
        }
    }

    /// non-blocking variant, `None` when nothing is queued
    #[cfg(test)]
    pub fn try_next(&mut self) -> Option<Delivery> {
        match self.rx.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Delivery::Lagged(n)),
            Err(broadcast::error::TryRecvError::Closed) => Some(Delivery::Closed),
            Err(broadcast::error::TryRecvError::Empty) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApplianceStatus;
    use chrono::Utc;

    fn status(on: bool) -> Event {
        Event::ApplianceStatusUpdate(ApplianceStatus {
            appliance_status: on,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn publish_without_sessions_is_dropped() {
        let hub = Hub::new(4);
        assert_eq!(hub.publish(status(true)), 0);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let hub = Hub::new(4);
        let mut early = hub.subscribe();
        hub.publish(status(true));
        let mut late = hub.subscribe();

        assert!(matches!(early.try_next(), Some(Delivery::Event(_))));
        assert_eq!(late.try_next(), None);
        assert_eq!(hub.session_count(), 2);
    }

    #[test]
    fn slow_subscriber_loses_oldest_not_publisher() {
        let hub = Hub::new(2);
        let mut slow = hub.subscribe();
        for i in 0..5 {
            hub.publish(status(i % 2 == 0));
        }

        assert_eq!(slow.try_next(), Some(Delivery::Lagged(3)));
        // the two newest survive
        assert!(matches!(slow.try_next(), Some(Delivery::Event(_))));
        assert!(matches!(slow.try_next(), Some(Delivery::Event(_))));
        assert_eq!(slow.try_next(), None);
    }
}
