//! Best-effort fan-out of state transitions for external observers (admin dashboards,
//! wallet long-poll helpers). This is not part of the durable state machine: a subscriber
//! that isn't listening simply misses the event and reconciles through the regular
//! `/v1/mint/quote`, `/v1/melt/quote` and `/v1/checkstate` endpoints instead.

use moksha_core::primitives::{MeltQuoteState, MintQuoteState, ProofState};
use secp256k1::PublicKey;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ring-buffer size for the broadcast channel; a slow subscriber that falls this far behind
/// starts missing events rather than applying backpressure to the mint.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum MintEvent {
    MintQuoteUpdated {
        quote_id: Uuid,
        state: MintQuoteState,
    },
    MeltQuoteUpdated {
        quote_id: Uuid,
        state: MeltQuoteState,
    },
    ProofStateChanged {
        y: PublicKey,
        state: ProofState,
    },
}

impl MintEvent {
    /// The identifier a subscriber filters on: a quote id or a proof's `Y`, serialized so
    /// callers can compare it without matching on the event's variant first.
    pub fn identifier(&self) -> String {
        match self {
            Self::MintQuoteUpdated { quote_id, .. } => quote_id.to_string(),
            Self::MeltQuoteUpdated { quote_id, .. } => quote_id.to_string(),
            Self::ProofStateChanged { y, .. } => y.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MintEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MintEvent> {
        self.sender.subscribe()
    }

    /// Never errors when nobody is subscribed - that's the common case, not a failure.
    pub fn publish(&self, event: MintEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() -> anyhow::Result<()> {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let quote_id = Uuid::new_v4();
        bus.publish(MintEvent::MintQuoteUpdated {
            quote_id,
            state: MintQuoteState::Paid,
        });

        let received = rx.recv().await?;
        assert_eq!(received.identifier(), quote_id.to_string());
        Ok(())
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(MintEvent::MeltQuoteUpdated {
            quote_id: Uuid::new_v4(),
            state: MeltQuoteState::Pending,
        });
    }
}
