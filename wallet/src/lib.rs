//! Wallet bookkeeping for StakeChain participants.
//!
//! A `Wallet` owns a set of keypairs and the coins (its own outputs) they
//! can spend, plus a captured "eligibility key" used by the consensus
//! crate's stake check. See the module-level note on `save_eligibility_proof`
//! for why the key map is insertion-ordered rather than a plain `HashMap`.

use std::collections::VecDeque;

use indexmap::IndexMap;
use thiserror::Error;

use stakechain_core::{output_preimage, Address, Hash, Input, Output};
use stakechain_crypto::{calc_address, generate_keypair, sign, KeyPair};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet has no keypair for this address")]
    UnknownAddress,
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },
}

/// A spendable coin: one of this wallet's own outputs plus the location
/// needed to reference it as a future input.
#[derive(Debug, Clone)]
pub struct Coin {
    pub output: Output,
    pub txid: Hash,
    pub output_index: u32,
}

/// Keys and coins belonging to one participant.
///
/// `coins` is a queue: new coins are pushed to the front, spending drains
/// from the back (oldest first, most likely to be finalized).
pub struct Wallet {
    keypairs: IndexMap<Address, KeyPair>,
    coins: VecDeque<Coin>,
    eligibility_pubkey: Option<Vec<u8>>,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    pub fn new() -> Self {
        Wallet {
            keypairs: IndexMap::new(),
            coins: VecDeque::new(),
            eligibility_pubkey: None,
        }
    }

    pub fn balance(&self) -> u64 {
        self.coins.iter().map(|c| c.output.amount).sum()
    }

    pub fn has_key(&self, address: &Address) -> bool {
        self.keypairs.contains_key(address)
    }

    /// Generates a fresh keypair, registers it, and returns its address.
    pub fn make_address(&mut self) -> Address {
        let keypair = generate_keypair();
        let address = calc_address(&keypair.public);
        self.keypairs.insert(address, keypair);
        address
    }

    /// Registers a coin this wallet can spend. Fails if no keypair here
    /// owns `output.address`.
    pub fn add_utxo(&mut self, output: Output, txid: Hash, output_index: u32) -> Result<(), WalletError> {
        if !self.keypairs.contains_key(&output.address) {
            return Err(WalletError::UnknownAddress);
        }
        self.coins.push_front(Coin { output, txid, output_index });
        Ok(())
    }

    /// Consumes coins from the oldest end until `requested_amount` is
    /// covered, signing an input for each. Returns the signed inputs and
    /// the change (accumulated minus requested, always ≥ 0).
    pub fn spend_utxos(&mut self, requested_amount: u64) -> Result<(Vec<Input>, u64), WalletError> {
        let balance = self.balance();
        if requested_amount > balance {
            return Err(WalletError::InsufficientFunds {
                requested: requested_amount,
                available: balance,
            });
        }

        let mut inputs = Vec::new();
        let mut accumulated = 0u64;
        while accumulated < requested_amount {
            let coin = self
                .coins
                .pop_back()
                .expect("balance check above guarantees enough coins remain");
            let keypair = self
                .keypairs
                .get(&coin.output.address)
                .expect("coins are only ever added for addresses this wallet owns");
            let signature = sign(&keypair.secret, &output_preimage(&coin.output))
                .expect("signing with an owned key cannot fail");

            inputs.push(Input {
                txid: coin.txid,
                output_index: coin.output_index,
                pubkey: keypair.public.serialize().to_vec(),
                signature,
            });
            accumulated += coin.output.amount;
        }

        Ok((inputs, accumulated - requested_amount))
    }

    /// Captures the wallet-wide eligibility key used by the stake check.
    /// The last address in insertion order wins on every call, reproducing
    /// (deliberately — see DESIGN.md) the source's overwrite-in-a-loop
    /// behavior instead of hashing every owned address together.
    pub fn save_eligibility_proof(&mut self) {
        if self.keypairs.is_empty() {
            return;
        }
        let (_, keypair) = self
            .keypairs
            .get_index(self.keypairs.len() - 1)
            .expect("checked non-empty above");
        self.eligibility_pubkey = Some(keypair.public.serialize().to_vec());
    }

    pub fn eligibility_address(&self) -> Option<&[u8]> {
        self.eligibility_pubkey.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_utxo_rejects_unknown_address() {
        let mut wallet = Wallet::new();
        let output = Output { amount: 10, address: [1u8; 20] };
        assert_eq!(wallet.add_utxo(output, [0u8; 32], 0), Err(WalletError::UnknownAddress));
    }

    #[test]
    fn spend_consumes_oldest_coins_first() {
        let mut wallet = Wallet::new();
        let address = wallet.make_address();
        wallet.add_utxo(Output { amount: 42, address }, [1u8; 32], 0).unwrap();
        wallet.add_utxo(Output { amount: 25, address }, [2u8; 32], 1).unwrap();

        assert_eq!(wallet.balance(), 67);

        let (inputs, change) = wallet.spend_utxos(20).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].txid, [1u8; 32]);
        assert_eq!(change, 22);
        assert_eq!(wallet.balance(), 25);
    }

    #[test]
    fn spend_rejects_insufficient_funds() {
        let mut wallet = Wallet::new();
        let address = wallet.make_address();
        wallet.add_utxo(Output { amount: 5, address }, [1u8; 32], 0).unwrap();

        assert_eq!(
            wallet.spend_utxos(20),
            Err(WalletError::InsufficientFunds { requested: 20, available: 5 })
        );
    }

    #[test]
    fn eligibility_proof_captures_last_address() {
        let mut wallet = Wallet::new();
        wallet.make_address();
        let second = wallet.make_address();

        wallet.save_eligibility_proof();
        let expected = wallet.keypairs.get(&second).unwrap().public.serialize().to_vec();
        assert_eq!(wallet.eligibility_address(), Some(expected.as_slice()));
    }
}
