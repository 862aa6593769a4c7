//! Transaction implementation for StakeChain.
//!
//! See spec.md §3–4.1. A transaction's `id` is a content hash fixed at
//! construction time over its inputs and outputs; the one documented
//! exception is fee collection on a coinbase transaction, which mutates
//! `outputs[0].amount` after `id` has already been frozen (spec.md §9,
//! "mutable frozen id" — preserved intentionally, not a bug).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utxo::UtxoView;
use crate::{Address, Hash};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("input references a different transaction than the one it was checked against")]
    WrongTxId,
    #[error("input's public key does not hash to the referenced output's address")]
    AddressMismatch,
    #[error("input's signature does not verify against the referenced output")]
    BadSignature,
    #[error("input references an output index that does not exist on this transaction")]
    OutputNotFound,
    #[error("addFee may only be called on a coinbase transaction")]
    NotCoinbase,
}

/// An unspent output: an amount payable to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub amount: u64,
    pub address: Address,
}

/// A reference to, and authorization to spend, a specific prior output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub txid: Hash,
    pub output_index: u32,
    /// Serialized (compressed or uncompressed) secp256k1 public key.
    pub pubkey: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Canonical, deterministic byte encoding of an `Output`, used as the
/// message both signed by a spending `Input` and re-verified by
/// `Transaction::spend_output`/`is_valid`. Wallets must sign exactly this
/// encoding (spec.md §4.2, `spendUTXOs`).
pub fn output_preimage(output: &Output) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 20);
    buf.extend_from_slice(&output.amount.to_be_bytes());
    buf.extend_from_slice(&output.address);
    buf
}

fn canonical_preimage(inputs: &[Input], outputs: &[Output]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(inputs.len() as u32).to_be_bytes());
    for input in inputs {
        buf.extend_from_slice(&input.txid);
        buf.extend_from_slice(&input.output_index.to_be_bytes());
        buf.extend_from_slice(&(input.pubkey.len() as u32).to_be_bytes());
        buf.extend_from_slice(&input.pubkey);
        buf.extend_from_slice(&(input.signature.len() as u32).to_be_bytes());
        buf.extend_from_slice(&input.signature);
    }
    buf.extend_from_slice(&(outputs.len() as u32).to_be_bytes());
    for output in outputs {
        buf.extend_from_slice(&output_preimage(output));
    }
    buf
}

/// A transaction. `id` is fixed at construction; see the module-level note
/// about the one intentional exception for coinbase fee collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: Hash,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
}

impl Transaction {
    /// Builds a regular (non-coinbase) transaction and freezes its id.
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        let id = stakechain_crypto::hash(&canonical_preimage(&inputs, &outputs));
        Transaction { id, inputs, outputs }
    }

    /// Builds a coinbase transaction (no inputs) with a single reward output.
    pub fn coinbase(reward: Output) -> Self {
        Transaction::new(Vec::new(), vec![reward])
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    /// Validates that `input` is authorized to spend one of *this*
    /// transaction's own outputs, returning the spent amount. Purely
    /// functional — does not consult any UTXO view.
    pub fn spend_output(&self, input: &Input) -> Result<u64, TransactionError> {
        if input.txid != self.id {
            return Err(TransactionError::WrongTxId);
        }
        let output = self
            .outputs
            .get(input.output_index as usize)
            .ok_or(TransactionError::OutputNotFound)?;

        let pubkey = stakechain_crypto::parse_public_key(&input.pubkey)
            .map_err(|_| TransactionError::AddressMismatch)?;
        let address = stakechain_crypto::calc_address(&pubkey);
        if address != output.address {
            return Err(TransactionError::AddressMismatch);
        }

        let message = output_preimage(output);
        if !stakechain_crypto::verify(&pubkey, &message, &input.signature) {
            return Err(TransactionError::BadSignature);
        }

        Ok(output.amount)
    }

    /// Validates this (non-coinbase) transaction against a UTXO view.
    /// Must never panic; any structural problem (missing tx, missing
    /// output slot, already-spent slot, bad address, bad signature) is a
    /// silent `false` per spec.md §4.1/§7. Not meaningful on a coinbase
    /// transaction.
    pub fn is_valid(&self, view: &UtxoView) -> bool {
        let mut in_sum: u64 = 0;
        for input in &self.inputs {
            let referenced = match view.get(&input.txid, input.output_index) {
                Some(output) => output,
                None => return false,
            };

            let pubkey = match stakechain_crypto::parse_public_key(&input.pubkey) {
                Ok(pk) => pk,
                Err(_) => return false,
            };
            if stakechain_crypto::calc_address(&pubkey) != referenced.address {
                return false;
            }

            let message = output_preimage(referenced);
            if !stakechain_crypto::verify(&pubkey, &message, &input.signature) {
                return false;
            }

            in_sum = match in_sum.checked_add(referenced.amount) {
                Some(sum) => sum,
                None => return false,
            };
        }

        in_sum >= self.total_output()
    }

    /// The fee implied by this transaction under `view` (inputs minus
    /// outputs), or `None` if any referenced output can't be resolved.
    /// Not meaningful on a coinbase transaction.
    pub fn fee(&self, view: &UtxoView) -> Option<u64> {
        let mut in_sum: u64 = 0;
        for input in &self.inputs {
            let referenced = view.get(&input.txid, input.output_index)?;
            in_sum = in_sum.checked_add(referenced.amount)?;
        }
        in_sum.checked_sub(self.total_output())
    }

    /// Adds `amount` to `outputs[0].amount`. Legal only on coinbase
    /// transactions; does not (and must not) change `id`.
    pub fn add_fee(&mut self, amount: u64) -> Result<(), TransactionError> {
        if !self.is_coinbase() {
            return Err(TransactionError::NotCoinbase);
        }
        let reward = self
            .outputs
            .get_mut(0)
            .expect("coinbase transactions always have one output");
        reward.amount += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn valid_spend_returns_amount() {
        let kp = generate_keypair();
        let address = stakechain_crypto::calc_address(&kp.public);
        let tx1 = Transaction::coinbase(Output { amount: 42, address });
        let input = signed_input(tx1.id(), 0, &tx1.outputs()[0], &kp);

        assert_eq!(tx1.spend_output(&input).unwrap(), 42);
    }

    #[test]
    fn wrong_txid_is_rejected() {
        let kp = generate_keypair();
        let address = stakechain_crypto::calc_address(&kp.public);
        let tx1 = Transaction::coinbase(Output { amount: 42, address });
        let mut input = signed_input(tx1.id(), 0, &tx1.outputs()[0], &kp);
        input.txid = [0x42u8; 32];

        assert_eq!(tx1.spend_output(&input), Err(TransactionError::WrongTxId));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();
        let address = stakechain_crypto::calc_address(&kp1.public);
        let tx1 = Transaction::coinbase(Output { amount: 42, address });

        // Signed with the wrong key, but still claims kp1's pubkey so the
        // address check passes and only the signature check can catch it.
        let sig = sign(&kp2.secret, &output_preimage(&tx1.outputs()[0])).unwrap();
        let input = Input {
            txid: tx1.id(),
            output_index: 0,
            pubkey: kp1.public.serialize().to_vec(),
            signature: sig,
        };

        assert_eq!(tx1.spend_output(&input), Err(TransactionError::BadSignature));
    }

    #[test]
    fn is_valid_accepts_inputs_at_least_outputs() {
        let kp = generate_keypair();
        let address_a = stakechain_crypto::calc_address(&kp.public);

        let mut view = UtxoView::new();
        let cb = Transaction::new(Vec::new(), vec![
            Output { amount: 1, address: address_a },
            Output { amount: 42, address: address_a },
        ]);
        view.insert(cb.id(), cb.outputs().to_vec());

        let input1 = signed_input(cb.id(), 0, &cb.outputs()[0], &kp);
        let input2 = signed_input(cb.id(), 1, &cb.outputs()[1], &kp);

        let address_b = [9u8; 20];
        let spend = Transaction::new(
            vec![input1, input2],
            vec![
                Output { amount: 20, address: address_b },
                Output { amount: 10, address: address_a },
            ],
        );

        assert!(spend.is_valid(&view));
    }

    #[test]
    fn is_valid_rejects_outputs_exceeding_inputs() {
        let kp = generate_keypair();
        let address_a = stakechain_crypto::calc_address(&kp.public);
        let mut view = UtxoView::new();
        let cb = Transaction::new(Vec::new(), vec![
            Output { amount: 1, address: address_a },
            Output { amount: 42, address: address_a },
        ]);
        view.insert(cb.id(), cb.outputs().to_vec());

        let input1 = signed_input(cb.id(), 0, &cb.outputs()[0], &kp);
        let input2 = signed_input(cb.id(), 1, &cb.outputs()[1], &kp);

        let address_b = [9u8; 20];
        let spend = Transaction::new(
            vec![input1, input2],
            vec![
                Output { amount: 20, address: address_b },
                Output { amount: 30, address: address_a },
            ],
        );

        assert!(!spend.is_valid(&view));
    }

    #[test]
    fn id_is_stable_across_fee_collection() {
        let address = [3u8; 20];
        let mut cb = Transaction::coinbase(Output { amount: 10, address });
        let id_before = cb.id();
        cb.add_fee(5).unwrap();
        assert_eq!(cb.id(), id_before);
        assert_eq!(cb.outputs()[0].amount, 15);
    }

    #[test]
    fn add_fee_rejected_on_non_coinbase() {
        let kp = generate_keypair();
        let address = stakechain_crypto::calc_address(&kp.public);
        let cb = Transaction::coinbase(Output { amount: 10, address });
        let input = signed_input(cb.id(), 0, &cb.outputs()[0], &kp);
        let mut spend = Transaction::new(vec![input], vec![Output { amount: 10, address }]);
        assert_eq!(spend.add_fee(1), Err(TransactionError::NotCoinbase));
    }
}
