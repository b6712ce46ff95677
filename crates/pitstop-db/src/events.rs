//! # Change Feed
//!
//! Screens that show live stock or job status subscribe here instead of
//! polling. Events are published only after a transaction commits, so a
//! subscriber never sees a change that was rolled back.
//!
//! ```text
//! ┌──────────────────┐  commit ok   ┌──────────────┐  broadcast  ┌──────────────┐
//! │ InventoryLedger  │─────────────►│  ChangeFeed  │────────────►│ Subscription │
//! │ OrderRepository  │  publish()   │ (tokio       │  recv()     │ Subscription │
//! │ ServiceRepository│              │  broadcast)  │             │ ...          │
//! └──────────────────┘              └──────────────┘             └──────────────┘
//! ```
//!
//! Dropping a [`Subscription`] unsubscribes it. A subscriber that falls more
//! than the channel capacity behind skips the oldest events.

use pitstop_core::{Money, OrderStatus, PaymentStatus, ServiceStatus, StockUpdate};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default number of events buffered per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// A committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    StockChanged {
        product_id: String,
        sku: String,
        stock: i64,
        total_stock: i64,
    },
    OrderPlaced {
        order_id: String,
        order_number: String,
        user_id: String,
        total: Money,
    },
    OrderUpdated {
        order_id: String,
        status: OrderStatus,
        payment_status: PaymentStatus,
    },
    ServiceStatusChanged {
        service_id: String,
        from: ServiceStatus,
        to: ServiceStatus,
    },
    InvoiceCreated {
        invoice_id: String,
        invoice_number: String,
        service_id: Option<String>,
        grand_total: Money,
    },
}

impl From<&StockUpdate> for StoreEvent {
    fn from(update: &StockUpdate) -> Self {
        StoreEvent::StockChanged {
            product_id: update.product_id.clone(),
            sku: update.sku.clone(),
            stock: update.stock,
            total_stock: update.total_stock,
        }
    }
}

/// Broadcast hub for [`StoreEvent`]s.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<StoreEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { tx }
    }

    /// Sends `event` to every current subscriber.
    pub fn publish(&self, event: StoreEvent) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    /// Publishes one `StockChanged` per update.
    pub fn publish_stock(&self, updates: &[StockUpdate]) {
        for update in updates {
            self.publish(StoreEvent::from(update));
        }
    }

    pub fn subscribe(&self) -> Subscription {
        debug!(subscribers = self.tx.receiver_count() + 1, "New change feed subscriber");
        Subscription {
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription to the change feed.
#[derive(Debug)]
pub struct Subscription {
    rx: Option<broadcast::Receiver<StoreEvent>>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// Returns `None` once unsubscribed or when the feed is gone.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change feed subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change feed subscriber lagged, skipping events");
                }
                Err(_) => return None,
            }
        }
    }

    /// Stops receiving events. Later `recv` calls return `None`.
    pub fn unsubscribe(&mut self) {
        self.rx = None;
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock_event(stock: i64) -> StoreEvent {
        StoreEvent::StockChanged {
            product_id: "p1".to_string(),
            sku: "BP-FR".to_string(),
            stock,
            total_stock: stock,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let feed = ChangeFeed::new(8);
        let mut a = feed.subscribe();
        let mut b = feed.subscribe();

        feed.publish(stock_event(3));

        assert_eq!(a.recv().await, Some(stock_event(3)));
        assert_eq!(b.recv().await, Some(stock_event(3)));
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop() {
        let feed = ChangeFeed::new(8);
        let mut sub = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(sub.recv().await, None);

        {
            let _dropped = feed.subscribe();
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let feed = ChangeFeed::default();
        feed.publish(stock_event(1));
    }

    #[test]
    fn test_lagged_subscriber_skips_oldest() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe();
        for stock in 0..4 {
            feed.publish(stock_event(stock));
        }

        assert_eq!(sub.try_recv(), Some(stock_event(2)));
        assert_eq!(sub.try_recv(), Some(stock_event(3)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(stock_event(4)).unwrap();
        assert_eq!(json["type"], "stock_changed");
        assert_eq!(json["stock"], 4);
    }
}
