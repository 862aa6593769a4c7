//! Block implementation for StakeChain.
//!
//! A `Block` owns a UTXO view snapshot derived from its parent and grows by
//! admitting transactions until a miner seals it with a proof (see the
//! `stakechain-consensus` crate for the eligibility check and proof
//! predicate, which operate on a `Block` from the outside rather than as
//! methods here — this crate stays a pure ledger data model).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{Output, Transaction};
use crate::utxo::UtxoView;
use crate::{Address, Hash};

/// `prevBlockHash` sentinel used by the genesis block.
pub const GENESIS_PREV_HASH: Hash = [0u8; 32];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("transaction is not acceptable into this block")]
    TransactionNotAccepted,
    #[error("malformed block bytes: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    prev_block_hash: Hash,
    chain_length: u64,
    /// Milliseconds since the Unix epoch at creation.
    timestamp: u64,
    reward_address: Address,
    coinbase_tx: Transaction,
    /// Does not include `coinbase_tx`; the coinbase reward is always the
    /// transaction's first "output" conceptually, tracked separately.
    transactions: Vec<Transaction>,
    utxos: UtxoView,
    proof: u64,
}

impl Block {
    /// Opens a new block. With no parent this is the genesis block
    /// (`chain_length = 0`, sentinel `prev_block_hash`, empty view before
    /// the coinbase is added). With a parent, the view is cloned from it
    /// and `chain_length`/`prev_block_hash` follow from it.
    pub fn new(reward_address: Address, parent: Option<&Block>, timestamp: u64, base_reward: u64) -> Self {
        let (prev_block_hash, chain_length, mut utxos) = match parent {
            Some(p) => (p.hash_val(), p.chain_length + 1, p.utxos.clone()),
            None => (GENESIS_PREV_HASH, 0, UtxoView::new()),
        };

        let coinbase_tx = Transaction::coinbase(Output {
            amount: base_reward,
            address: reward_address,
        });
        utxos.insert(coinbase_tx.id(), coinbase_tx.outputs().to_vec());

        Block {
            prev_block_hash,
            chain_length,
            timestamp,
            reward_address,
            coinbase_tx,
            transactions: Vec::new(),
            utxos,
            proof: 0,
        }
    }

    /// Seeds a fresh chain: one coinbase-style transaction per participant
    /// crediting the requested amount. Returns the genesis block alongside
    /// the individual credits (address, txid, output index, output) so a
    /// higher layer can apply them to each participant's wallet — this
    /// crate doesn't know what a wallet is.
    pub fn make_genesis_block(
        initial_balances: &[(Address, u64)],
        timestamp: u64,
    ) -> (Block, Vec<(Address, Hash, u32, Output)>) {
        // No miner mints the genesis block; its own coinbase carries no reward.
        let system_coinbase = Transaction::coinbase(Output {
            amount: 0,
            address: [0u8; 20],
        });

        let mut utxos = UtxoView::new();
        utxos.insert(system_coinbase.id(), system_coinbase.outputs().to_vec());

        let mut transactions = Vec::with_capacity(initial_balances.len());
        let mut credits = Vec::with_capacity(initial_balances.len());
        for &(address, amount) in initial_balances {
            let tx = Transaction::coinbase(Output { amount, address });
            utxos.insert(tx.id(), tx.outputs().to_vec());
            credits.push((address, tx.id(), 0u32, tx.outputs()[0].clone()));
            transactions.push(tx);
        }

        let block = Block {
            prev_block_hash: GENESIS_PREV_HASH,
            chain_length: 0,
            timestamp,
            reward_address: [0u8; 20],
            coinbase_tx: system_coinbase,
            transactions,
            utxos,
            proof: 0,
        };

        (block, credits)
    }

    pub fn prev_block_hash(&self) -> Hash {
        self.prev_block_hash
    }

    pub fn chain_length(&self) -> u64 {
        self.chain_length
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn reward_address(&self) -> Address {
        self.reward_address
    }

    pub fn coinbase_tx(&self) -> &Transaction {
        &self.coinbase_tx
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn utxos(&self) -> &UtxoView {
        &self.utxos
    }

    pub fn proof(&self) -> u64 {
        self.proof
    }

    pub fn set_proof(&mut self, proof: u64) {
        self.proof = proof;
    }

    /// A transaction is acceptable if it validates against the current
    /// view and its id isn't already present in it (rejects duplicates
    /// within the same block, including a coinbase's own id).
    pub fn will_accept_transaction(&self, tx: &Transaction) -> bool {
        !self.utxos.contains_tx(&tx.id()) && tx.is_valid(&self.utxos)
    }

    /// Admits `tx`: clears the outputs it spends, registers its own
    /// outputs, and routes its fee into the block's coinbase.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), BlockError> {
        if !self.will_accept_transaction(&tx) {
            return Err(BlockError::TransactionNotAccepted);
        }

        // Computed before the spent slots are cleared, since fee() needs
        // to resolve the referenced outputs.
        let fee = tx
            .fee(&self.utxos)
            .expect("will_accept_transaction already confirmed this resolves");

        for input in tx.inputs() {
            self.utxos.clear(&input.txid, input.output_index);
        }
        self.utxos.insert(tx.id(), tx.outputs().to_vec());

        self.coinbase_tx
            .add_fee(fee)
            .expect("coinbase_tx is always a coinbase transaction");
        self.utxos
            .insert(self.coinbase_tx.id(), self.coinbase_tx.outputs().to_vec());

        self.transactions.push(tx);
        Ok(())
    }

    /// Deterministic preimage over the block's identifying fields.
    /// `include_proof = false` is used while searching for a proof (the
    /// proof itself must not influence the hash it's trying to satisfy
    /// until it's fixed); `include_proof = true` produces the sealed,
    /// published content hash.
    pub fn preimage(&self, include_proof: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.prev_block_hash);
        buf.extend_from_slice(&self.chain_length.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.reward_address);
        buf.extend_from_slice(&self.coinbase_tx.id());
        buf.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.id());
        }
        if include_proof {
            buf.extend_from_slice(&self.proof.to_be_bytes());
        }
        buf
    }

    /// Deterministic content hash of the sealed block.
    pub fn hash_val(&self) -> Hash {
        stakechain_crypto::hash(&self.preimage(true))
    }

    /// Canonical round-trip encoding. With `include_proof = false` the
    /// proof field is omitted from the wire bytes entirely (used by a
    /// miner broadcasting in-progress state, which never happens here
    /// today, but kept symmetric with `preimage`).
    pub fn serialize(&self, include_proof: bool) -> Vec<u8> {
        #[derive(Serialize)]
        struct Wire<'a> {
            prev_block_hash: &'a Hash,
            chain_length: u64,
            timestamp: u64,
            reward_address: &'a Address,
            coinbase_tx: &'a Transaction,
            transactions: &'a [Transaction],
            utxos: &'a UtxoView,
            proof: Option<u64>,
        }

        let wire = Wire {
            prev_block_hash: &self.prev_block_hash,
            chain_length: self.chain_length,
            timestamp: self.timestamp,
            reward_address: &self.reward_address,
            coinbase_tx: &self.coinbase_tx,
            transactions: &self.transactions,
            utxos: &self.utxos,
            proof: include_proof.then_some(self.proof),
        };
        serde_json::to_vec(&wire).expect("block serialization is infallible")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block, BlockError> {
        #[derive(Deserialize)]
        struct Wire {
            prev_block_hash: Hash,
            chain_length: u64,
            timestamp: u64,
            reward_address: Address,
            coinbase_tx: Transaction,
            transactions: Vec<Transaction>,
            utxos: UtxoView,
            proof: Option<u64>,
        }

        let wire: Wire = serde_json::from_slice(bytes).map_err(|e| BlockError::Malformed(e.to_string()))?;
        Ok(Block {
            prev_block_hash: wire.prev_block_hash,
            chain_length: wire.chain_length,
            timestamp: wire.timestamp,
            reward_address: wire.reward_address,
            coinbase_tx: wire.coinbase_tx,
            transactions: wire.transactions,
            utxos: wire.utxos,
            proof: wire.proof.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{output_preimage, Input};
    use stakechain_crypto::{generate_keypair, sign};

    fn signed_input(txid: Hash, output_index: u32, output: &Output, kp: &stakechain_crypto::KeyPair) -> Input {
        let sig = sign(&kp.secret, &output_preimage(output)).unwrap();
        Input {
            txid,
            output_index,
            pubkey: kp.public.serialize().to_vec(),
            signature: sig,
        }
    }

    #[test]
    fn genesis_credits_each_participant() {
        let alice = [1u8; 20];
        let bob = [2u8; 20];
        let charlie = [3u8; 20];
        let (genesis, credits) =
            Block::make_genesis_block(&[(alice, 150), (bob, 90), (charlie, 20)], 1_000);

        assert_eq!(genesis.chain_length(), 0);
        assert_eq!(genesis.prev_block_hash(), GENESIS_PREV_HASH);
        assert_eq!(credits.len(), 3);
        assert_eq!(credits[0].0, alice);
        assert_eq!(credits[0].3.amount, 150);
        assert!(genesis.utxos().get(&credits[1].1, 0).unwrap().amount == 90);
    }

    #[test]
    fn end_to_end_block_update() {
        let alice_kp = generate_keypair();
        let alice = stakechain_crypto::calc_address(&alice_kp.public);
        let bob = [7u8; 20];
        let charlie = [8u8; 20];

        let (genesis, credits) = Block::make_genesis_block(&[(alice, 150), (bob, 90), (charlie, 20)], 1_000);
        let alice_credit = &credits[0];

        let mut child = Block::new([9u8; 20], Some(&genesis), 2_000, 10);
        let input = signed_input(alice_credit.1, alice_credit.2, &alice_credit.3, &alice_kp);
        let spend = Transaction::new(
            vec![input],
            vec![
                Output { amount: 20, address: bob },
                Output { amount: 130, address: alice },
            ],
        );

        assert!(child.will_accept_transaction(&spend));
        child.add_transaction(spend.clone()).unwrap();

        assert_eq!(child.utxos().get(&spend.id(), 0).unwrap().amount, 20);
        assert_eq!(child.utxos().get(&spend.id(), 1).unwrap().amount, 130);
        assert!(child.utxos().get(&alice_credit.1, alice_credit.2).is_none());
        // Full 150 in, 150 out, no fee routed to the coinbase.
        assert_eq!(child.coinbase_tx().outputs()[0].amount, 10);
    }

    #[test]
    fn duplicate_transaction_is_rejected() {
        let alice_kp = generate_keypair();
        let alice = stakechain_crypto::calc_address(&alice_kp.public);
        let (genesis, credits) = Block::make_genesis_block(&[(alice, 100)], 1_000);
        let credit = &credits[0];

        let mut child = Block::new([9u8; 20], Some(&genesis), 2_000, 10);
        let input = signed_input(credit.1, credit.2, &credit.3, &alice_kp);
        let spend = Transaction::new(vec![input], vec![Output { amount: 100, address: alice }]);

        child.add_transaction(spend.clone()).unwrap();
        assert!(!child.will_accept_transaction(&spend));
        assert_eq!(child.add_transaction(spend), Err(BlockError::TransactionNotAccepted));
    }

    #[test]
    fn serialize_deserialize_roundtrips() {
        let (genesis, _) = Block::make_genesis_block(&[([1u8; 20], 50)], 1_000);
        let mut child = Block::new([9u8; 20], Some(&genesis), 2_000, 10);
        child.set_proof(42);

        let bytes = child.serialize(true);
        let restored = Block::deserialize(&bytes).unwrap();

        assert_eq!(restored.prev_block_hash(), child.prev_block_hash());
        assert_eq!(restored.chain_length(), child.chain_length());
        assert_eq!(restored.proof(), 42);
        assert_eq!(restored.hash_val(), child.hash_val());
    }

    #[test]
    fn hash_val_changes_with_proof() {
        let (genesis, _) = Block::make_genesis_block(&[], 1_000);
        let mut b1 = Block::new([9u8; 20], Some(&genesis), 2_000, 10);
        let b2 = b1.clone();
        b1.set_proof(1);
        assert_ne!(b1.hash_val(), b2.hash_val());
    }
}
