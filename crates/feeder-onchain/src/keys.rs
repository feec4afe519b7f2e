//! Operator key loading.
//!
//! The key is loaded once at startup. The hex string and the decoded
//! secret bytes are both held in `Zeroizing` wrappers so they are scrubbed
//! from memory once the signer is constructed; only the derived address is
//! ever logged.

use crate::error::{OnchainError, OnchainResult};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::info;
use zeroize::Zeroizing;

/// Build the operator signer from a hex private key, tolerating a 0x
/// prefix and whitespace. Consumes the key material; it is zeroized on
/// return.
pub fn load_signer(private_key_hex: Zeroizing<String>) -> OnchainResult<PrivateKeySigner> {
    let secret_bytes = parse_hex_key(&private_key_hex)?;
    let signer = PrivateKeySigner::from_slice(&secret_bytes)
        .map_err(|e| OnchainError::InvalidKey(e.to_string()))?;
    info!(address = %signer.address(), "Loaded operator key");
    Ok(signer)
}

fn parse_hex_key(hex_str: &str) -> OnchainResult<Zeroizing<Vec<u8>>> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    Ok(Zeroizing::new(hex::decode(trimmed)?))
}

/// Parse a contract or wallet address.
pub fn parse_address(raw: &str) -> OnchainResult<Address> {
    raw.trim()
        .parse()
        .map_err(|_| OnchainError::InvalidAddress(raw.to_string()))
}
