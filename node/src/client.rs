//! A client: holds a wallet, posts transactions, and absorbs payments once
//! blocks confirm them.

use thiserror::Error;
use tokio::sync::broadcast;

use stakechain_core::{Output, Transaction};
use stakechain_wallet::{Wallet, WalletError};

use crate::bus::{BusEvent, MessageBus, ParticipantId};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// A participant that only spends and receives; `Miner` embeds one of
/// these for its own wallet and broadcast handle.
pub struct Client {
    id: ParticipantId,
    wallet: Wallet,
    bus: MessageBus,
}

impl Client {
    pub fn new(id: ParticipantId, wallet: Wallet, bus: MessageBus) -> Self {
        Client { id, wallet, bus }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Spends `total(outputs)` from the wallet, appends a change output to
    /// a fresh address if there's change, and broadcasts the result.
    pub fn post_transaction(&mut self, mut outputs: Vec<Output>) -> Result<Transaction, NodeError> {
        let total: u64 = outputs.iter().map(|o| o.amount).sum();
        let (inputs, change) = self.wallet.spend_utxos(total)?;
        if change > 0 {
            let change_address = self.wallet.make_address();
            outputs.push(Output { amount: change, address: change_address });
        }

        let tx = Transaction::new(inputs, outputs);
        self.bus.broadcast(BusEvent::PostTransaction(tx.clone()));
        Ok(tx)
    }

    /// Credits any output of `tx` addressed to this wallet. Called once a
    /// block containing `tx` is confirmed, and when this client mints its
    /// own coinbase.
    pub fn receive_output(&mut self, tx: &Transaction) {
        for (index, output) in tx.outputs().iter().enumerate() {
            if self.wallet.has_key(&output.address) {
                self.wallet
                    .add_utxo(output.clone(), tx.id(), index as u32)
                    .expect("has_key just confirmed this address is known");
            }
        }
    }

    /// Runs as a plain (non-mining) participant: the only bus activity a
    /// client reacts to on its own is absorbing payments once a block is
    /// announced.
    pub async fn run(mut self) {
        let mut events = self.bus.subscribe();
        loop {
            match events.recv().await {
                Ok(BusEvent::ProofFound { block, .. }) => {
                    if let Ok(block) = stakechain_core::Block::deserialize(&block) {
                        self.receive_output(block.coinbase_tx());
                        for tx in block.transactions() {
                            self.receive_output(tx);
                        }
                    }
                }
                Ok(BusEvent::PostTransaction(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(client = %self.id, skipped, "client fell behind the message bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
