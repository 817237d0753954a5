//! Private-key wallet shared by order signing and on-chain onboarding.
//!
//! The wallet only ever signs 32-byte prehashed digests. Typed-data orders
//! (see `signer`) and legacy transactions (see `onchain`) compute their own
//! digests and hand them here.

use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::str::FromStr;
use thiserror::Error;

/// Offset applied to the raw 0/1 recovery id to get the Ethereum `v` byte.
pub const RECOVERY_ID_OFFSET: u8 = 27;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("invalid private key: expected 64 hex characters")]
    InvalidPrivateKey,
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Holds the controlling key and its derived address.
#[derive(Clone)]
pub struct Wallet {
    key: PrivateKeySigner,
}

impl Wallet {
    /// Parse a hex private key, with or without a `0x`/`0X` prefix.
    pub fn from_hex(hex_key: &str) -> Result<Self, WalletError> {
        let clean = hex_key
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if clean.len() != 64 {
            return Err(WalletError::InvalidPrivateKey);
        }
        let bytes = B256::from_str(clean).map_err(|_| WalletError::InvalidPrivateKey)?;
        let key = PrivateKeySigner::from_bytes(&bytes).map_err(|_| WalletError::InvalidPrivateKey)?;
        Ok(Self { key })
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// Sign a prehashed digest, returning alloy's signature (parity as bool).
    pub fn sign_hash(&self, digest: &B256) -> Result<Signature, WalletError> {
        self.key
            .sign_hash_sync(digest)
            .map_err(|e| WalletError::Signing(e.to_string()))
    }

    /// Sign a prehashed digest into the 65-byte `r ‖ s ‖ v` layout, with `v`
    /// shifted from the raw 0/1 recovery id to 27/28.
    pub fn sign_digest(&self, digest: &B256) -> Result<[u8; 65], WalletError> {
        let sig = self.sign_hash(digest)?;
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&sig.r().to_be_bytes::<32>());
        out[32..64].copy_from_slice(&sig.s().to_be_bytes::<32>());
        let recovery_id = u8::from(sig.v());
        out[64] = recovery_id + RECOVERY_ID_OFFSET;
        Ok(out)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::{address, keccak256};

    // Well-known development key. Never fund it.
    pub(crate) const TEST_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    pub(crate) const TEST_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    pub(crate) fn test_wallet() -> Wallet {
        Wallet::from_hex(TEST_KEY).unwrap()
    }

    #[test]
    fn test_from_hex_variants() {
        assert_eq!(Wallet::from_hex(TEST_KEY).unwrap().address(), TEST_ADDRESS);
        let prefixed = format!("0x{}", TEST_KEY);
        assert_eq!(Wallet::from_hex(&prefixed).unwrap().address(), TEST_ADDRESS);

        assert!(Wallet::from_hex("abc123").is_err());
        assert!(Wallet::from_hex(&"z".repeat(64)).is_err());
        assert!(Wallet::from_hex(&"0".repeat(64)).is_err());
    }

    #[test]
    fn test_sign_digest_shifts_recovery_id() {
        let wallet = test_wallet();
        for i in 0u8..16 {
            let digest = keccak256([i]);
            let sig = wallet.sign_digest(&digest).unwrap();
            assert!(sig[64] == 27 || sig[64] == 28, "v = {}", sig[64]);
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", test_wallet());
        assert!(!rendered.contains(TEST_KEY));
    }
}
