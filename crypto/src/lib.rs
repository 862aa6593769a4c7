//! Cryptographic primitives for StakeChain.
//!
//! This crate is the "CryptoOracle" black box the rest of the node treats as
//! an external collaborator: keypair generation, address derivation, signing
//! and verification, and a generic hash function. Every other crate in the
//! workspace reaches through here rather than touching `secp256k1`/`sha2`
//! directly.

use rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A 32-byte content hash, used for transaction ids and block hashes.
pub type Hash = [u8; 32];

/// An address: `hash(publicKey)` truncated to 20 bytes, as in spec.md §3.
pub type Address = [u8; 20];

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key bytes")]
    InvalidKey,
    #[error("signing failed")]
    SigningError,
    #[error("signature is not well-formed")]
    InvalidSignature,
}

/// A generated or imported keypair.
///
/// `SecretKey`/`PublicKey` from `secp256k1` are `Copy`, so this type is too —
/// wallets hold these by value in their address map.
#[derive(Clone, Copy)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Generates a fresh secp256k1 keypair.
pub fn generate_keypair() -> KeyPair {
    let secp = Secp256k1::new();
    let (secret, public) = secp.generate_keypair(&mut OsRng);
    KeyPair { public, secret }
}

/// Generic hash used for transaction ids, block hashes, and the eligibility
/// bit-prefix comparison.
pub fn hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derives an address from a public key: `hash(pubkey)` truncated to 20 bytes.
pub fn calc_address(public: &PublicKey) -> Address {
    let digest = hash(&public.serialize_uncompressed());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[..20]);
    address
}

/// Signs arbitrary bytes. Callers are responsible for passing a canonical
/// encoding of whatever they mean to sign (see `stakechain_core`'s
/// serialization helpers) so sign/verify agree on the preimage.
pub fn sign(secret: &SecretKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let secp = Secp256k1::new();
    let digest = hash(data);
    let message = Message::from_slice(&digest).map_err(|_| CryptoError::SigningError)?;
    Ok(secp.sign_ecdsa(&message, secret).serialize_compact().to_vec())
}

/// Verifies a signature produced by [`sign`].
pub fn verify(public: &PublicKey, data: &[u8], signature: &[u8]) -> bool {
    let secp = Secp256k1::new();
    let digest = hash(data);
    let message = match Message::from_slice(&digest) {
        Ok(m) => m,
        Err(_) => return false,
    };
    let sig = match Signature::from_compact(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    secp.verify_ecdsa(&message, &sig, public).is_ok()
}

/// Parses a public key from its serialized (33-byte compressed or 65-byte
/// uncompressed) form.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    PublicKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_20_bytes_and_deterministic() {
        let kp = generate_keypair();
        let a1 = calc_address(&kp.public);
        let a2 = calc_address(&kp.public);
        assert_eq!(a1, a2);
        assert_eq!(a1.len(), 20);
    }

    #[test]
    fn sign_then_verify_roundtrips() {
        let kp = generate_keypair();
        let msg = b"pay alice 42 coins";
        let sig = sign(&kp.secret, msg).unwrap();
        assert!(verify(&kp.public, msg, &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp1 = generate_keypair();
        let kp2 = generate_keypair();
        let msg = b"pay alice 42 coins";
        let sig = sign(&kp1.secret, msg).unwrap();
        assert!(!verify(&kp2.public, msg, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = generate_keypair();
        let sig = sign(&kp.secret, b"pay alice 42 coins").unwrap();
        assert!(!verify(&kp.public, b"pay alice 43 coins", &sig));
    }
}
