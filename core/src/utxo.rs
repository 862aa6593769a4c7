//! UTXO view management for StakeChain.
//!
//! A `UtxoView` is the per-block snapshot described in spec.md §3: a mapping
//! from transaction id to the array of its outputs, where a spent output's
//! slot is cleared rather than removed so that output indices stay stable.

use std::collections::HashMap;

use crate::{Hash, Output};

/// A UTXO snapshot owned by exactly one block.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UtxoView {
    entries: HashMap<Hash, Vec<Option<Output>>>,
}

impl UtxoView {
    pub fn new() -> Self {
        UtxoView {
            entries: HashMap::new(),
        }
    }

    /// Registers a transaction's outputs as spendable.
    pub fn insert(&mut self, txid: Hash, outputs: Vec<Output>) {
        self.entries.insert(txid, outputs.into_iter().map(Some).collect());
    }

    /// Looks up a specific output, if it exists and hasn't been spent.
    pub fn get(&self, txid: &Hash, output_index: u32) -> Option<&Output> {
        self.entries
            .get(txid)
            .and_then(|outputs| outputs.get(output_index as usize))
            .and_then(|slot| slot.as_ref())
    }

    /// Clears a slot, marking the referenced output as spent.
    ///
    /// No-op (not an error) if the slot is already cleared or unknown, since
    /// callers are expected to have validated the reference via `get` first.
    pub fn clear(&mut self, txid: &Hash, output_index: u32) {
        if let Some(outputs) = self.entries.get_mut(txid) {
            if let Some(slot) = outputs.get_mut(output_index as usize) {
                *slot = None;
            }
        }
    }

    /// Whether a transaction id is already known to this view (spent or not).
    pub fn contains_tx(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> crate::Address {
        [byte; 20]
    }

    #[test]
    fn insert_then_get_then_clear() {
        let mut view = UtxoView::new();
        let txid = [1u8; 32];
        view.insert(txid, vec![Output { amount: 10, address: addr(1) }, Output { amount: 20, address: addr(2) }]);

        assert_eq!(view.get(&txid, 0).unwrap().amount, 10);
        assert_eq!(view.get(&txid, 1).unwrap().amount, 20);
        assert!(view.get(&txid, 2).is_none());

        view.clear(&txid, 0);
        assert!(view.get(&txid, 0).is_none());
        assert_eq!(view.get(&txid, 1).unwrap().amount, 20);
    }

    #[test]
    fn unknown_tx_is_simply_absent() {
        let view = UtxoView::new();
        assert!(view.get(&[9u8; 32], 0).is_none());
        assert!(!view.contains_tx(&[9u8; 32]));
    }
}
