//! Shared encoding and timestamp helpers used across the StakeChain crates.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UtilError {
    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),
    
    #[error("Base58 decoding error: {0}")]
    Base58Error(#[from] bs58::decode::Error),
    
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Converts a hex string to bytes
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, UtilError> {
    Ok(hex::decode(hex)?)
}

/// Converts bytes to a hex string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Converts a base58 string to bytes
pub fn base58_to_bytes(b58: &str) -> Result<Vec<u8>, UtilError> {
    Ok(bs58::decode(b58).into_vec()?)
}

/// Converts bytes to a base58 string
pub fn bytes_to_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Formats a millisecond timestamp as an ISO 8601 string, for logging.
pub fn format_timestamp(timestamp_ms: u64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp((timestamp_ms / 1000) as i64, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| "invalid timestamp".to_string())
}

/// Milliseconds since the Unix epoch, used for block timestamps and the
/// eligibility target decay clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrips() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(hex_to_bytes(&bytes_to_hex(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn base58_roundtrips() {
        let bytes = vec![1, 2, 3, 4, 5];
        assert_eq!(base58_to_bytes(&bytes_to_base58(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn now_millis_is_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
    }
}