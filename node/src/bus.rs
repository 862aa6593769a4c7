//! The shared message bus participants broadcast transactions and blocks
//! over. Grounded on the publish/subscribe pattern built atop
//! `tokio::sync::broadcast`: a thin, cloneable handle around one sender,
//! since every event here is meant for every participant rather than a
//! per-topic subset.

use stakechain_core::Transaction;
use tokio::sync::broadcast;

/// Identifies a participant across the bus. Assigned by whoever builds the
/// simulation (the root binary), not derived from any cryptographic key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantId(pub u64);

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "participant-{}", self.0)
    }
}

/// The two wire-level, cross-participant events. `START_MINING` and
/// `INIT_MINTING` from the source are per-miner self-signals with no
/// cross-task payload; they're realized directly as control flow inside
/// `Miner::run` rather than as bus events (see DESIGN.md).
#[derive(Debug, Clone)]
pub enum BusEvent {
    PostTransaction(Transaction),
    ProofFound {
        /// Canonical bytes from `Block::serialize(true)`.
        block: Vec<u8>,
        miner: ParticipantId,
        /// The miner's eligibility key, captured via
        /// `Wallet::save_eligibility_proof` at announce time. The source
        /// lets a receiver inspect the sender's in-memory wallet directly
        /// since everything runs in one process; across independent
        /// tasks here that key has to ride along on the message instead.
        eligibility_pubkey: Vec<u8>,
    },
}

#[derive(Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<BusEvent>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        MessageBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Delivers to every current subscriber. A send with no subscribers
    /// left is not an error here — the bus is append-publish-only and
    /// doesn't care whether anyone's listening.
    pub fn broadcast(&self, event: BusEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakechain_core::{Output, Transaction};

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let bus = MessageBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let tx = Transaction::coinbase(Output { amount: 1, address: [0u8; 20] });
        bus.broadcast(BusEvent::PostTransaction(tx.clone()));

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                BusEvent::PostTransaction(received) => assert_eq!(received.id(), tx.id()),
                _ => panic!("expected PostTransaction"),
            }
        }
    }
}
