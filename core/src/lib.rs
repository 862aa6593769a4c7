//! Core ledger types for StakeChain.
//!
//! This crate defines the UTXO transaction model and the block-level
//! ledger that sits on top of it. It depends only on `stakechain-crypto`;
//! consensus parameters (eligibility, proof predicates) and wallet
//! bookkeeping live in their own crates so this one stays a pure data
//! model.

pub mod block;
pub mod transaction;
pub mod utxo;

pub use stakechain_crypto::{Address, Hash};

pub use block::{Block, BlockError};
pub use transaction::{output_preimage, Input, Output, Transaction, TransactionError};
pub use utxo::UtxoView;
