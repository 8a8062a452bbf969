//! Event fan-out: auction started, price ticks, auction results.
//!
//! [`Broadcaster`] is the seam between the engine and whatever transport
//! carries events to subscribers. [`ChannelBroadcaster`] feeds the WebSocket
//! layer through a `tokio::sync::broadcast` channel; [`InMemoryBroadcaster`]
//! stores events for tests.

use crate::error::EngineError;
use crate::types::{ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;

/// Outcome payload published when an auction run ends (sold or timed out).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuctionResultEvent {
    pub product_id: ProductId,
    pub sold: bool,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// Transport-agnostic event payloads.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuctionEvent {
    AuctionStarted {
        product_id: ProductId,
        start_time: DateTime<Utc>,
        start_price: Decimal,
    },
    PriceUpdate {
        price: Decimal,
    },
    AuctionResult(AuctionResultEvent),
}

/// Fan-out seam. Implementations must not block the engine.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, event: AuctionEvent) -> Result<(), EngineError>;

    fn publish_auction_started(
        &self,
        product_id: ProductId,
        start_time: DateTime<Utc>,
        start_price: Decimal,
    ) -> Result<(), EngineError> {
        self.publish(AuctionEvent::AuctionStarted {
            product_id,
            start_time,
            start_price,
        })
    }

    fn publish_price_update(&self, price: Decimal) -> Result<(), EngineError> {
        self.publish(AuctionEvent::PriceUpdate { price })
    }

    fn publish_auction_result(&self, result: AuctionResultEvent) -> Result<(), EngineError> {
        self.publish(AuctionEvent::AuctionResult(result))
    }
}

/// Broadcasts over a `tokio::sync::broadcast` channel. Clone shares the sender.
/// A send with no subscribers is not a failure.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<AuctionEvent>,
}

impl ChannelBroadcaster {
    /// Channel capacity bounds how far a slow subscriber may lag before it
    /// starts missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn from_sender(tx: broadcast::Sender<AuctionEvent>) -> Self {
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<AuctionEvent> {
        self.tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.tx.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, event: AuctionEvent) -> Result<(), EngineError> {
        // Err here only means no active subscriber; the event is droppable.
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Stores published events for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryBroadcaster {
    events: std::sync::Arc<std::sync::Mutex<Vec<AuctionEvent>>>,
}

impl InMemoryBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuctionEvent> {
        self.events.lock().expect("lock").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("lock").clear();
    }
}

impl Broadcaster for InMemoryBroadcaster {
    fn publish(&self, event: AuctionEvent) -> Result<(), EngineError> {
        self.events.lock().expect("lock").push(event);
        Ok(())
    }
}
