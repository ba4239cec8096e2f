use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the fulfillment core. Delivery is fire-and-forget;
/// no operation depends on an event being observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    TransporterAssigned {
        order_id: Uuid,
        transporter_id: Uuid,
    },
    PaymentRedirectIssued {
        order_id: Uuid,
    },
    PaymentUnresolved {
        order_id: Uuid,
    },
    StockDecremented {
        product_id: Uuid,
        quantity: i32,
        order_id: Uuid,
    },
    CartRepaired {
        cart_id: Uuid,
        removed_items: usize,
    },
    PromoDetached {
        cart_id: Uuid,
    },
    ReturnCreated(Uuid),
    ReturnStatusChanged {
        return_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ReturnCancelled(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, waiting for channel capacity.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event without blocking the caller; a full or closed channel is
    /// logged and otherwise ignored.
    pub fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Background loop draining the event channel. Currently events are only
/// logged; downstream consumers attach here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Domain event");
    }
    info!("Event channel closed; processor exiting");
}
