//! Participant-facing types for a StakeChain simulation: the shared
//! message bus, a plain wallet-holding client, and the per-miner
//! consensus loop.

pub mod bus;
pub mod client;
pub mod miner;

pub use bus::{BusEvent, MessageBus, ParticipantId};
pub use client::{Client, NodeError};
pub use miner::Miner;
