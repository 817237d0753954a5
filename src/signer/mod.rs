//! EIP-712 typed-data signing for CTF exchange orders.
//!
//! The digest must match what the exchange contract computes on-chain:
//!
//! ```text
//! digest = keccak256(0x19 0x01 ‖ domainSeparator ‖ structHash)
//! ```
//!
//! Every field is either hashed (strings) or left-padded to a 32-byte word
//! (integers, addresses) before concatenation. Domain separators are computed
//! once per `OrderSigner` and cached.
//!
//! [`ClobAuth`] is the second typed message: the wallet-ownership attestation
//! that the exchange exchanges for L2 API credentials.

use crate::wallet::{Wallet, WalletError, RECOVERY_ID_OFFSET};
use alloy::hex;
use alloy::primitives::{address, keccak256, Address, Signature, B256, U256};
use std::sync::Arc;
use thiserror::Error;

pub const PROTOCOL_NAME: &str = "Polymarket CTF Exchange";
pub const PROTOCOL_VERSION: &str = "1";
pub const POLYGON_CHAIN_ID: u64 = 137;

/// Standard binary-outcome exchange on Polygon.
pub const CTF_EXCHANGE: Address = address!("4bFB41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");
/// Exchange for mutually-exclusive multi-outcome markets.
pub const NEG_RISK_CTF_EXCHANGE: Address = address!("C5d563A36AE78145C45a50134d48A1215220f80a");

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const DOMAIN_TYPE_UNVERSIONED: &str =
    "EIP712Domain(string name,uint256 chainId,address verifyingContract)";
pub const ORDER_TYPE: &str = "Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)";

pub const CLOB_AUTH_DOMAIN_NAME: &str = "ClobAuthDomain";
pub const CLOB_AUTH_VERSION: &str = "1";
pub const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";
const CLOB_AUTH_DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId)";
pub const CLOB_AUTH_TYPE: &str =
    "ClobAuth(address address,string timestamp,uint256 nonce,string message)";

pub const SIDE_BUY: u8 = 0;
pub const SIDE_SELL: u8 = 1;
const MAX_SIGNATURE_TYPE: u8 = 2;

#[derive(Error, Debug)]
pub enum SignError {
    #[error("invalid order: side must be 0 or 1, got {0}")]
    InvalidSide(u8),
    #[error("invalid order: signature type must be 0, 1 or 2, got {0}")]
    InvalidSignatureType(u8),
    #[error("order signer {order} does not match signing key {key}")]
    SignerMismatch { order: Address, key: Address },
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("recovery failed: {0}")]
    Recovery(String),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// The EIP-712 domain a verifying exchange contract hashes against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDomain {
    pub name: String,
    /// `None` drops the version member from the domain type entirely.
    pub version: Option<String>,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl ExchangeDomain {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: PROTOCOL_NAME.to_string(),
            version: Some(PROTOCOL_VERSION.to_string()),
            chain_id,
            verifying_contract,
        }
    }

    pub fn standard(chain_id: u64) -> Self {
        Self::new(chain_id, CTF_EXCHANGE)
    }

    pub fn neg_risk(chain_id: u64) -> Self {
        Self::new(chain_id, NEG_RISK_CTF_EXCHANGE)
    }

    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// keccak256(typeHash ‖ keccak(name) [‖ keccak(version)] ‖ chainId ‖ contract)
    pub fn separator(&self) -> B256 {
        let mut buf = Vec::with_capacity(5 * 32);
        match &self.version {
            Some(version) => {
                buf.extend_from_slice(keccak256(DOMAIN_TYPE).as_slice());
                buf.extend_from_slice(keccak256(self.name.as_bytes()).as_slice());
                buf.extend_from_slice(keccak256(version.as_bytes()).as_slice());
            }
            None => {
                buf.extend_from_slice(keccak256(DOMAIN_TYPE_UNVERSIONED).as_slice());
                buf.extend_from_slice(keccak256(self.name.as_bytes()).as_slice());
            }
        }
        buf.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        buf.extend_from_slice(self.verifying_contract.into_word().as_slice());
        keccak256(&buf)
    }
}

/// An order exactly as the exchange contract hashes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub salt: U256,
    /// Funds source: the signer itself or a custodial proxy wallet.
    pub maker: Address,
    pub signer: Address,
    /// Zero address means any counterparty.
    pub taker: Address,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    pub expiration: U256,
    pub nonce: U256,
    pub fee_rate_bps: U256,
    pub side: u8,
    pub signature_type: u8,
}

impl Order {
    pub fn validate(&self) -> Result<(), SignError> {
        if self.side > SIDE_SELL {
            return Err(SignError::InvalidSide(self.side));
        }
        if self.signature_type > MAX_SIGNATURE_TYPE {
            return Err(SignError::InvalidSignatureType(self.signature_type));
        }
        Ok(())
    }

    pub fn struct_hash(&self) -> B256 {
        let words: [B256; 13] = [
            keccak256(ORDER_TYPE),
            self.salt.into(),
            self.maker.into_word(),
            self.signer.into_word(),
            self.taker.into_word(),
            self.token_id.into(),
            self.maker_amount.into(),
            self.taker_amount.into(),
            self.expiration.into(),
            self.nonce.into(),
            self.fee_rate_bps.into(),
            U256::from(self.side).into(),
            U256::from(self.signature_type).into(),
        ];
        let mut buf = Vec::with_capacity(words.len() * 32);
        for word in &words {
            buf.extend_from_slice(word.as_slice());
        }
        keccak256(&buf)
    }
}

pub fn eip712_digest(domain_separator: &B256, struct_hash: &B256) -> B256 {
    let mut buf = [0u8; 66];
    buf[0] = 0x19;
    buf[1] = 0x01;
    buf[2..34].copy_from_slice(domain_separator.as_slice());
    buf[34..66].copy_from_slice(struct_hash.as_slice());
    keccak256(buf)
}

/// Proof of control over `address`, signed with that address's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClobAuth {
    pub address: Address,
    /// Unix seconds as a decimal string; hashed as a string, not an integer.
    pub timestamp: String,
    pub nonce: U256,
}

impl ClobAuth {
    pub fn new(address: Address, timestamp: i64, nonce: u64) -> Self {
        Self {
            address,
            timestamp: timestamp.to_string(),
            nonce: U256::from(nonce),
        }
    }

    /// The auth domain carries no verifying contract.
    pub fn domain_separator(chain_id: u64) -> B256 {
        let mut buf = Vec::with_capacity(4 * 32);
        buf.extend_from_slice(keccak256(CLOB_AUTH_DOMAIN_TYPE).as_slice());
        buf.extend_from_slice(keccak256(CLOB_AUTH_DOMAIN_NAME).as_slice());
        buf.extend_from_slice(keccak256(CLOB_AUTH_VERSION).as_slice());
        buf.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
        keccak256(&buf)
    }

    pub fn struct_hash(&self) -> B256 {
        let words: [B256; 5] = [
            keccak256(CLOB_AUTH_TYPE),
            self.address.into_word(),
            keccak256(self.timestamp.as_bytes()),
            self.nonce.into(),
            keccak256(CLOB_AUTH_MESSAGE),
        ];
        let mut buf = Vec::with_capacity(words.len() * 32);
        for word in &words {
            buf.extend_from_slice(word.as_slice());
        }
        keccak256(&buf)
    }

    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        eip712_digest(&Self::domain_separator(chain_id), &self.struct_hash())
    }

    pub fn sign(&self, wallet: &Wallet, chain_id: u64) -> Result<OrderSignature, SignError> {
        let key = wallet.address();
        if self.address != key {
            return Err(SignError::SignerMismatch {
                order: self.address,
                key,
            });
        }
        let bytes = wallet.sign_digest(&self.signing_hash(chain_id))?;
        Ok(OrderSignature(bytes))
    }
}

/// 65-byte `r ‖ s ‖ v` signature, `v` ∈ {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OrderSignature([u8; 65]);

impl OrderSignature {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn r(&self) -> U256 {
        U256::from_be_slice(&self.0[..32])
    }

    pub fn s(&self) -> U256 {
        U256::from_be_slice(&self.0[32..64])
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, SignError> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| SignError::MalformedSignature(e.to_string()))?;
        let bytes: [u8; 65] = raw.as_slice().try_into().map_err(|_| {
            SignError::MalformedSignature(format!("expected 65 bytes, got {}", raw.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 65]> for OrderSignature {
    fn from(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for OrderSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for OrderSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderSignature({})", self.to_hex())
    }
}

/// Recover the signing address from a digest and a 27/28 (or raw 0/1) signature.
pub fn recover_signer(digest: &B256, signature: &OrderSignature) -> Result<Address, SignError> {
    let parity = match signature.v() {
        0 | 27 => false,
        1 | 28 => true,
        v => {
            return Err(SignError::MalformedSignature(format!(
                "recovery byte must be 27 or 28, got {}",
                v
            )))
        }
    };
    Signature::new(signature.r(), signature.s(), parity)
        .recover_address_from_prehash(digest)
        .map_err(|e| SignError::Recovery(e.to_string()))
}

/// Signs orders for one (chain, verifying contract) pair.
#[derive(Debug, Clone)]
pub struct OrderSigner {
    wallet: Arc<Wallet>,
    domain: ExchangeDomain,
    domain_separator: B256,
}

impl OrderSigner {
    pub fn new(wallet: Arc<Wallet>, domain: ExchangeDomain) -> Self {
        let domain_separator = domain.separator();
        Self {
            wallet,
            domain,
            domain_separator,
        }
    }

    pub fn domain(&self) -> &ExchangeDomain {
        &self.domain
    }

    pub fn domain_separator(&self) -> B256 {
        self.domain_separator
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// The typed-data digest of `order` under this signer's domain.
    pub fn order_hash(&self, order: &Order) -> Result<B256, SignError> {
        order.validate()?;
        Ok(eip712_digest(&self.domain_separator, &order.struct_hash()))
    }

    /// Validate, hash and sign. Pure: no network traffic, no partial output.
    pub fn sign(&self, order: &Order) -> Result<OrderSignature, SignError> {
        let digest = self.order_hash(order)?;
        let key = self.wallet.address();
        if order.signer != key {
            return Err(SignError::SignerMismatch {
                order: order.signer,
                key,
            });
        }
        let bytes = self.wallet.sign_digest(&digest)?;
        debug_assert!(bytes[64] >= RECOVERY_ID_OFFSET);
        Ok(OrderSignature(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::tests::{test_wallet, TEST_ADDRESS};
    use alloy::sol_types::{eip712_domain, SolStruct};

    mod typed {
        alloy::sol! {
            struct ClobAuth {
                address address;
                string timestamp;
                uint256 nonce;
                string message;
            }
        }

        alloy::sol! {
            struct Order {
                uint256 salt;
                address maker;
                address signer;
                address taker;
                uint256 tokenId;
                uint256 makerAmount;
                uint256 takerAmount;
                uint256 expiration;
                uint256 nonce;
                uint256 feeRateBps;
                uint8 side;
                uint8 signatureType;
            }
        }
    }

    fn sample_order() -> Order {
        Order {
            salt: U256::from(67890u64),
            maker: TEST_ADDRESS,
            signer: TEST_ADDRESS,
            taker: Address::ZERO,
            token_id: U256::from(200u64),
            maker_amount: U256::from(2_000_000u64),
            taker_amount: U256::from(1_000_000u64),
            expiration: U256::from(1_735_689_600u64),
            nonce: U256::from(2u64),
            fee_rate_bps: U256::from(100u64),
            side: SIDE_SELL,
            signature_type: 0,
        }
    }

    fn as_typed(order: &Order) -> typed::Order {
        typed::Order {
            salt: order.salt,
            maker: order.maker,
            signer: order.signer,
            taker: order.taker,
            tokenId: order.token_id,
            makerAmount: order.maker_amount,
            takerAmount: order.taker_amount,
            expiration: order.expiration,
            nonce: order.nonce,
            feeRateBps: order.fee_rate_bps,
            side: order.side,
            signatureType: order.signature_type,
        }
    }

    fn signer() -> OrderSigner {
        OrderSigner::new(Arc::new(test_wallet()), ExchangeDomain::standard(POLYGON_CHAIN_ID))
    }

    #[test]
    fn test_digest_matches_alloy_typed_data() {
        let order = sample_order();

        let versioned = eip712_domain! {
            name: PROTOCOL_NAME,
            version: PROTOCOL_VERSION,
            chain_id: POLYGON_CHAIN_ID,
            verifying_contract: CTF_EXCHANGE,
        };
        assert_eq!(
            signer().order_hash(&order).unwrap(),
            as_typed(&order).eip712_signing_hash(&versioned)
        );

        let unversioned = eip712_domain! {
            name: PROTOCOL_NAME,
            chain_id: POLYGON_CHAIN_ID,
            verifying_contract: CTF_EXCHANGE,
        };
        let bare = OrderSigner::new(
            Arc::new(test_wallet()),
            ExchangeDomain::standard(POLYGON_CHAIN_ID).without_version(),
        );
        assert_eq!(
            bare.order_hash(&order).unwrap(),
            as_typed(&order).eip712_signing_hash(&unversioned)
        );
    }

    #[test]
    fn test_signature_recovers_signer() {
        let signer = signer();
        let order = sample_order();
        let sig = signer.sign(&order).unwrap();
        assert!(sig.v() == 27 || sig.v() == 28);

        let digest = signer.order_hash(&order).unwrap();
        assert_eq!(recover_signer(&digest, &sig).unwrap(), order.signer);
    }

    #[test]
    fn test_signature_hex_roundtrip_shape() {
        let sig = signer().sign(&sample_order()).unwrap();
        let hex = sig.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 132);
        assert_eq!(OrderSignature::from_hex(&hex).unwrap(), sig);
        assert!(OrderSignature::from_hex("0x1234").is_err());
    }

    #[test]
    fn test_every_field_changes_digest() {
        let signer = signer();
        let base = sample_order();
        let base_hash = signer.order_hash(&base).unwrap();
        let other = Address::repeat_byte(0x11);

        let mutations: Vec<Box<dyn Fn(&mut Order)>> = vec![
            Box::new(|o| o.salt += U256::from(1)),
            Box::new(move |o| o.maker = other),
            Box::new(move |o| o.signer = other),
            Box::new(move |o| o.taker = other),
            Box::new(|o| o.token_id += U256::from(1)),
            Box::new(|o| o.maker_amount += U256::from(1)),
            Box::new(|o| o.taker_amount += U256::from(1)),
            Box::new(|o| o.expiration += U256::from(1)),
            Box::new(|o| o.nonce += U256::from(1)),
            Box::new(|o| o.fee_rate_bps += U256::from(1)),
            Box::new(|o| o.side = SIDE_BUY),
            Box::new(|o| o.signature_type = 2),
        ];
        for (i, mutate) in mutations.iter().enumerate() {
            let mut order = base.clone();
            mutate(&mut order);
            assert_ne!(signer.order_hash(&order).unwrap(), base_hash, "field {}", i);
        }
    }

    #[test]
    fn test_domains_differ_by_chain_and_contract() {
        let mainnet = ExchangeDomain::standard(POLYGON_CHAIN_ID).separator();
        assert_eq!(mainnet, ExchangeDomain::standard(POLYGON_CHAIN_ID).separator());
        assert_ne!(mainnet, ExchangeDomain::standard(80_002).separator());
        assert_ne!(mainnet, ExchangeDomain::neg_risk(POLYGON_CHAIN_ID).separator());
        assert_ne!(mainnet, B256::ZERO);
    }

    #[test]
    fn test_validation() {
        let signer = signer();

        let mut order = sample_order();
        order.side = 2;
        assert!(matches!(signer.sign(&order), Err(SignError::InvalidSide(2))));

        let mut order = sample_order();
        order.signature_type = 3;
        assert!(matches!(
            signer.sign(&order),
            Err(SignError::InvalidSignatureType(3))
        ));

        let mut order = sample_order();
        order.signer = Address::repeat_byte(0x22);
        assert!(matches!(
            signer.sign(&order),
            Err(SignError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn test_recover_rejects_bad_v() {
        let mut bytes = *signer().sign(&sample_order()).unwrap().as_bytes();
        bytes[64] = 30;
        let digest = B256::repeat_byte(1);
        assert!(recover_signer(&digest, &OrderSignature::from(bytes)).is_err());
    }

    #[test]
    fn test_clob_auth_matches_alloy_typed_data() {
        let auth = ClobAuth::new(TEST_ADDRESS, 1_700_000_000, 0);
        let typed = typed::ClobAuth {
            address: TEST_ADDRESS,
            timestamp: "1700000000".to_string(),
            nonce: U256::ZERO,
            message: CLOB_AUTH_MESSAGE.to_string(),
        };
        let domain = eip712_domain! {
            name: CLOB_AUTH_DOMAIN_NAME,
            version: CLOB_AUTH_VERSION,
            chain_id: POLYGON_CHAIN_ID,
        };
        assert_eq!(auth.signing_hash(POLYGON_CHAIN_ID), typed.eip712_signing_hash(&domain));
        assert_ne!(auth.signing_hash(POLYGON_CHAIN_ID), auth.signing_hash(80_002));
        assert_ne!(
            auth.signing_hash(POLYGON_CHAIN_ID),
            ClobAuth::new(TEST_ADDRESS, 1_700_000_000, 1).signing_hash(POLYGON_CHAIN_ID)
        );
    }

    #[test]
    fn test_clob_auth_signature_recovers_wallet() {
        let wallet = test_wallet();
        let auth = ClobAuth::new(TEST_ADDRESS, 1_700_000_000, 0);
        let sig = auth.sign(&wallet, POLYGON_CHAIN_ID).unwrap();
        assert!(sig.v() == 27 || sig.v() == 28);
        let digest = auth.signing_hash(POLYGON_CHAIN_ID);
        assert_eq!(recover_signer(&digest, &sig).unwrap(), TEST_ADDRESS);

        let other = ClobAuth::new(Address::repeat_byte(0x22), 1_700_000_000, 0);
        assert!(matches!(
            other.sign(&wallet, POLYGON_CHAIN_ID),
            Err(SignError::SignerMismatch { .. })
        ));
    }
}
