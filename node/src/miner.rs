//! The consensus loop: a miner extends the chain it believes is longest,
//! gated by stake-like mint eligibility, and reconciles with whatever the
//! rest of the network announces.
//!
//! States: `Preparing -> Searching -> Announcing -> Preparing`, with
//! `AwaitingEligibility` an orthogonal substate of `Preparing` entered
//! whenever the current block's target isn't met yet. Modeled here as an
//! explicit phase loop rather than callback recursion, since that's the
//! natural shape for an async task: each phase either returns the next
//! phase directly or awaits a suspension point (a mining-quantum yield, or
//! the eligibility decay delay) before doing so.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;

use stakechain_consensus as consensus;
use stakechain_consensus::ConsensusParams;
use stakechain_core::{Block, Hash, Output, Transaction};
use stakechain_wallet::Wallet;

use crate::bus::{BusEvent, MessageBus, ParticipantId};
use crate::client::Client;

/// Amount of the self-payment a miner posts each round to stay visible as
/// a stakeholder. Arbitrary and not consensus-critical.
const COINAGE_AMOUNT: u64 = 1;

enum Phase {
    Preparing,
    AwaitingEligibility,
    Searching,
}

pub struct Miner {
    client: Client,
    current_block: Block,
    /// Keyed by a block's own hash, so any later block naming it as
    /// `prev_block_hash` can resolve it as a parent for re-validation.
    previous_blocks: HashMap<Hash, Block>,
    reward_address: stakechain_core::Address,
    reuse_reward_address: bool,
    base_target: u32,
    should_mine: bool,
    should_start_new_block: bool,
    params: ConsensusParams,
    bus_rx: broadcast::Receiver<BusEvent>,
}

impl Miner {
    pub fn new(id: ParticipantId, wallet: Wallet, bus: MessageBus, starting_block: Block, params: ConsensusParams) -> Self {
        let bus_rx = bus.subscribe();
        let base_target = params.mint_eligibility_base_target;
        Miner {
            client: Client::new(id, wallet, bus),
            current_block: starting_block,
            previous_blocks: HashMap::new(),
            reward_address: [0u8; 20],
            reuse_reward_address: false,
            base_target,
            should_mine: false,
            should_start_new_block: true,
            params,
            bus_rx,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.client.id()
    }

    pub fn wallet(&self) -> &Wallet {
        self.client.wallet()
    }

    pub fn current_block(&self) -> &Block {
        &self.current_block
    }

    /// Drives the miner indefinitely: Preparing, (Awaiting)Eligibility,
    /// and Searching phases in sequence until the bus closes.
    pub async fn run(mut self) {
        let mut phase = Phase::Preparing;
        loop {
            phase = match phase {
                Phase::Preparing => self.prepare(),
                Phase::AwaitingEligibility => self.await_eligibility().await,
                Phase::Searching => self.search().await,
            };
        }
    }

    fn prepare(&mut self) -> Phase {
        self.client.wallet_mut().save_eligibility_proof();

        if self.should_start_new_block {
            self.base_target = self.params.mint_eligibility_base_target;
            if !self.reuse_reward_address {
                self.reward_address = self.client.wallet_mut().make_address();
            }
            self.reuse_reward_address = false;

            let parent = self.current_block.clone();
            let new_block = Block::new(
                self.reward_address,
                Some(&parent),
                stakechain_util::now_millis(),
                self.params.base_reward,
            );
            self.previous_blocks.insert(parent.hash_val(), parent);
            self.current_block = new_block;
            self.should_start_new_block = false;

            self.post_coinage_transaction();
        }

        if self.is_eligible_now() {
            self.should_mine = true;
            Phase::Searching
        } else {
            Phase::AwaitingEligibility
        }
    }

    fn is_eligible_now(&self) -> bool {
        let Some(key) = self.client.wallet().eligibility_address() else {
            return false;
        };
        let elapsed = stakechain_util::now_millis().saturating_sub(self.current_block.timestamp());
        let target = consensus::current_target(self.base_target, elapsed, self.params.time_until_eligibility_decrease_ms);
        consensus::is_eligible_to_mint(key, &self.current_block.prev_block_hash(), target).unwrap_or(false)
    }

    async fn await_eligibility(&mut self) -> Phase {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.params.time_until_eligibility_decrease_ms)) => {}
            event = self.bus_rx.recv() => self.handle_bus_event(event),
        }
        Phase::Preparing
    }

    async fn search(&mut self) -> Phase {
        for _ in 0..self.params.num_rounds_mining {
            if !self.should_mine {
                return Phase::Preparing;
            }
            if consensus::meets_proof_predicate(&self.current_block, self.params.proof_difficulty_bits) {
                return self.announce();
            }
            self.current_block.set_proof(self.current_block.proof() + 1);
        }

        // Quantum exhausted without success: yield so peers and our own
        // bus handlers get a turn, draining anything already queued.
        tokio::task::yield_now().await;
        while let Ok(event) = self.bus_rx.try_recv() {
            self.handle_bus_event(Ok(event));
            if self.should_start_new_block {
                return Phase::Preparing;
            }
        }
        Phase::Searching
    }

    fn announce(&mut self) -> Phase {
        let sealed = self.current_block.clone();
        self.credit_confirmed_block(&sealed);

        let eligibility_pubkey = self
            .client
            .wallet()
            .eligibility_address()
            .expect("save_eligibility_proof ran earlier this round")
            .to_vec();
        self.client.bus().broadcast(BusEvent::ProofFound {
            block: sealed.serialize(true),
            miner: self.id(),
            eligibility_pubkey,
        });

        self.should_mine = false;
        self.should_start_new_block = true;
        self.reuse_reward_address = false;
        Phase::Preparing
    }

    fn handle_bus_event(&mut self, event: Result<BusEvent, broadcast::error::RecvError>) {
        match event {
            Ok(BusEvent::PostTransaction(tx)) => {
                let _ = self.current_block.add_transaction(tx);
            }
            Ok(BusEvent::ProofFound { block, miner, eligibility_pubkey }) => {
                self.receive_block(&block, miner, &eligibility_pubkey);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(miner = %self.id(), skipped, "miner fell behind the message bus");
            }
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }

    /// Mirrors the source's `receiveBlock`: validate the proof and the
    /// sender's eligibility, re-validate every transaction against a
    /// reconstructed parent view, then cut over if the new chain is at
    /// least as long and we didn't author it ourselves.
    fn receive_block(&mut self, block_bytes: &[u8], sender: ParticipantId, eligibility_pubkey: &[u8]) {
        let Ok(block) = Block::deserialize(block_bytes) else {
            return;
        };

        let now = stakechain_util::now_millis();
        match consensus::is_valid_block(&block, Some(eligibility_pubkey), now, &self.params) {
            Ok(true) => {}
            _ => return,
        }

        let parent = if block.prev_block_hash() == self.current_block.hash_val() {
            Some(self.current_block.clone())
        } else {
            self.previous_blocks.get(&block.prev_block_hash()).cloned()
        };
        let Some(parent) = parent else {
            return;
        };

        if !consensus::revalidate_transactions(&block, &parent) {
            return;
        }

        self.previous_blocks.entry(block.hash_val()).or_insert_with(|| block.clone());

        if block.chain_length() >= self.current_block.chain_length() && sender != self.id() {
            self.credit_confirmed_block(&block);
            self.current_block = block;
            self.should_mine = false;
            self.should_start_new_block = true;
            self.reuse_reward_address = true;
        }
    }

    fn credit_confirmed_block(&mut self, block: &Block) {
        self.client.receive_output(block.coinbase_tx());
        for tx in block.transactions() {
            self.client.receive_output(tx);
        }
    }

    fn post_coinage_transaction(&mut self) {
        if self.client.wallet().balance() < COINAGE_AMOUNT {
            tracing::debug!(miner = %self.id(), "skipping coinage transaction: insufficient funds");
            return;
        }

        let address = self.client.wallet_mut().make_address();
        let (inputs, change) = self
            .client
            .wallet_mut()
            .spend_utxos(COINAGE_AMOUNT)
            .expect("balance check above guarantees this succeeds");

        let mut outputs = vec![Output { amount: COINAGE_AMOUNT, address }];
        if change > 0 {
            let change_address = self.client.wallet_mut().make_address();
            outputs.push(Output { amount: change, address: change_address });
        }

        let tx = Transaction::new(inputs, outputs);
        if self.current_block.add_transaction(tx.clone()).is_ok() {
            self.client.bus().broadcast(BusEvent::PostTransaction(tx));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trivial_params() -> ConsensusParams {
        ConsensusParams {
            num_rounds_mining: 50,
            time_until_eligibility_decrease_ms: 10,
            mint_eligibility_base_target: 0,
            proof_difficulty_bits: 0,
            base_reward: 10,
        }
    }

    #[tokio::test]
    async fn miner_announces_a_block_when_always_eligible() {
        let bus = MessageBus::new(64);
        let mut observer = bus.subscribe();

        let (genesis, _) = Block::make_genesis_block(&[], stakechain_util::now_millis());
        let miner = Miner::new(ParticipantId(1), Wallet::new(), bus, genesis, trivial_params());

        let handle = tokio::spawn(miner.run());

        let event = tokio::time::timeout(Duration::from_secs(2), observer.recv())
            .await
            .expect("miner should announce within the timeout")
            .unwrap();

        match event {
            BusEvent::ProofFound { block, miner, .. } => {
                assert_eq!(miner, ParticipantId(1));
                let block = Block::deserialize(&block).unwrap();
                assert_eq!(block.chain_length(), 1);
            }
            other => panic!("expected ProofFound, got {other:?}"),
        }

        handle.abort();
    }
}
