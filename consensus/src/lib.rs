//! Consensus rules for StakeChain.
//!
//! Three concerns live here, all as free functions over `stakechain_core`
//! types rather than methods on `Block`, so the core ledger model stays
//! free of consensus parameters: stake-like mint eligibility (a bit-prefix
//! match between a miner's eligibility key and the parent block hash, with
//! a time-decaying bar for liveness), the cheap proof predicate that binds
//! a block to its contents, and the transaction re-validation a fork
//! cutover must perform before adopting a chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stakechain_core::{Block, Hash};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("eligibility bit compare needs at least 2 bytes on each side, got {0} and {1}")]
    StringLengthMismatch(usize, usize),
}

/// Tunable consensus parameters, deserializable from the node's config
/// layer so they can be overridden per run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Work quantum, in proof-search increments, between scheduler yields.
    pub num_rounds_mining: u32,
    /// Wall-clock interval, in milliseconds, that lowers the eligibility bar.
    pub time_until_eligibility_decrease_ms: u64,
    /// Eligibility target at a block's creation (before any decay).
    pub mint_eligibility_base_target: u32,
    /// Leading zero bits a sealed block's hash must have.
    pub proof_difficulty_bits: u32,
    /// Coinbase reward minted by a freshly opened block, before fees.
    pub base_reward: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            num_rounds_mining: 2_000,
            time_until_eligibility_decrease_ms: 3_000,
            mint_eligibility_base_target: 2,
            proof_difficulty_bits: 8,
            base_reward: 10,
        }
    }
}

/// Takes the first 16 bits of `bytes`, as a `u16`. Mirrors the source
/// behavior of truncating a code-unit string to its first 16 bits, for
/// byte-oriented keys and hashes instead of strings.
fn bin16(bytes: &[u8]) -> Result<u16, ConsensusError> {
    if bytes.len() < 2 {
        return Err(ConsensusError::StringLengthMismatch(bytes.len() * 8, 16));
    }
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Counts the number of leading bits `a` and `b` share, out of 16.
pub fn matching_prefix_bits(a: &[u8], b: &[u8]) -> Result<u32, ConsensusError> {
    let a16 = bin16(a)?;
    let b16 = bin16(b)?;
    Ok((a16 ^ b16).leading_zeros())
}

/// The eligibility target at `elapsed_ms` after a block's creation: the
/// base target minus one point per `decrease_interval_ms` elapsed, floored
/// at zero so the bar always eventually admits every miner.
pub fn current_target(base_target: u32, elapsed_ms: u64, decrease_interval_ms: u64) -> u32 {
    if decrease_interval_ms == 0 {
        return 0;
    }
    let decreases = (elapsed_ms / decrease_interval_ms) as u32;
    base_target.saturating_sub(decreases)
}

/// Whether a miner holding `eligibility_pubkey` may extend a block whose
/// `prevBlockHash` is `parent_hash`, under the current `target`.
pub fn is_eligible_to_mint(
    eligibility_pubkey: &[u8],
    parent_hash: &Hash,
    target: u32,
) -> Result<bool, ConsensusError> {
    Ok(matching_prefix_bits(parent_hash, eligibility_pubkey)? >= target)
}

fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut count = 0;
    for byte in hash {
        if *byte == 0 {
            count += 8;
            continue;
        }
        count += byte.leading_zeros();
        break;
    }
    count
}

/// The proof predicate: does the sealed block's content hash have at
/// least `difficulty_bits` leading zero bits. Interchangeable with any
/// other deterministic, cheap-to-verify predicate — mining cost is
/// governed by eligibility, not by this search.
pub fn meets_proof_predicate(block: &Block, difficulty_bits: u32) -> bool {
    leading_zero_bits(&block.hash_val()) >= difficulty_bits
}

/// Mirrors a miner's `isValidBlock`: the proof predicate always applies;
/// the eligibility check applies only when a miner identity is supplied.
/// A `None` miner is legal only for a block the local node produced
/// itself — a block arriving from a peer must always carry one.
pub fn is_valid_block(
    block: &Block,
    miner_eligibility_pubkey: Option<&[u8]>,
    now_ms: u64,
    params: &ConsensusParams,
) -> Result<bool, ConsensusError> {
    if !meets_proof_predicate(block, params.proof_difficulty_bits) {
        return Ok(false);
    }
    let Some(pubkey) = miner_eligibility_pubkey else {
        return Ok(true);
    };

    let elapsed = now_ms.saturating_sub(block.timestamp());
    let target = current_target(
        params.mint_eligibility_base_target,
        elapsed,
        params.time_until_eligibility_decrease_ms,
    );
    is_eligible_to_mint(pubkey, &block.prev_block_hash(), target)
}

/// Re-validates every transaction in `block` against a UTXO view
/// reconstructed from `parent`, replaying admission the way
/// `Block::add_transaction` would. `Miner.isValidBlock` in the original
/// design only checks the proof and eligibility and trusts the sender's
/// transactions as-is; this closes that gap before a chain is adopted.
pub fn revalidate_transactions(block: &Block, parent: &Block) -> bool {
    let mut view = parent.utxos().clone();
    view.insert(block.coinbase_tx().id(), block.coinbase_tx().outputs().to_vec());

    for tx in block.transactions() {
        if view.contains_tx(&tx.id()) || !tx.is_valid(&view) {
            return false;
        }
        for input in tx.inputs() {
            view.clear(&input.txid, input.output_index);
        }
        view.insert(tx.id(), tx.outputs().to_vec());
    }
    true
}
