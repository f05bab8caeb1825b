//! Typed events fanned out to subscribers.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::model::{ChainData, PriceData, TxRecord};

/// Buffered capacity of each subscriber sink. A full sink drops the event
/// for that subscriber; publish never blocks.
pub const SUBSCRIBER_CAPACITY: usize = 100;

/// A watcher notification. Serializes as `{"type": ..., "data": ...}` for
/// the WebSocket stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    PriceUpdated(PriceData),
    ChainDataUpdated(ChainData),
    GasPriceUpdated { chain_name: String, wei: u128 },
    TransactionsUpdated {
        address: String,
        transactions: Vec<TxRecord>,
    },
    /// Reserved for lifecycle notifications.
    StatusUpdated,
}

/// A registered subscriber's receiving half. Obtained from
/// `Watcher::subscribe`; hand it back to `Watcher::unsubscribe` to detach.
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Await the next event. `None` once detached.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for synchronous consumers like the TUI thread.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_tagged() {
        let event = Event::PriceUpdated(PriceData {
            coin_id: "ethereum".to_string(),
            usd: 2500.50,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "price_updated");
        assert_eq!(json["data"]["coin_id"], "ethereum");
        assert_eq!(json["data"]["usd"], 2500.50);
    }

    #[test]
    fn gas_event_carries_wei_integer() {
        let event = Event::GasPriceUpdated {
            chain_name: "Ethereum".to_string(),
            wei: 20_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "gas_price_updated");
        assert_eq!(json["data"]["wei"], 20_000_000_000u64);
    }
}
