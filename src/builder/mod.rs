//! Assembles exchange-valid signed orders from trade intent.
//!
//! Amounts are derived with integer arithmetic only:
//!
//! 1. price → ticks: `round_half_up(price * 1000)`
//! 2. size → units: `floor(size * 100)`, never rounded up
//! 3. collateral = `units * 10^4 * ticks / 1000`
//!
//! Both amounts come from the same tick integer, so
//! `collateral / tokens == ticks / 1000` exactly.
//!
//! Buys: maker pays collateral, takes tokens. Sells: maker gives tokens,
//! takes collateral. All amounts are in 6-decimal base units.

use crate::signer::{
    ExchangeDomain, Order, OrderSigner, SignError, SIDE_BUY, SIDE_SELL,
};
use crate::wallet::Wallet;
use alloy::hex;
use alloy::primitives::{Address, U256};
use rand::rngs::OsRng;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Price tick is 1 / TICK_DENOMINATOR (0.001).
pub const TICK_DENOMINATOR: u64 = 1_000;
/// Sizes are floored to 1 / SIZE_DENOMINATOR of a share.
pub const SIZE_DENOMINATOR: u64 = 100;
/// Collateral and outcome tokens both carry 6 decimals.
pub const TOKEN_SCALE: u64 = 1_000_000;
const UNITS_PER_SIZE_STEP: u64 = TOKEN_SCALE / SIZE_DENOMINATOR;

pub const DEFAULT_FEE_RATE_BPS: u32 = 0;
pub const DEFAULT_GTD_EXPIRY_SECS: i64 = 3_600;
/// Salt is drawn from [0, 2^32).
const SALT_BOUND: u64 = 1 << 32;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("price must be between 0 and 1 exclusive, got {0}")]
    InvalidPrice(Decimal),
    #[error("price {0} rounds to {1}/1000, outside the tradable range")]
    PriceOutOfRange(Decimal, u64),
    #[error("size must be positive, got {0}")]
    InvalidSize(Decimal),
    #[error("size {0} is below the 0.01 share minimum")]
    SizeBelowMinimum(Decimal),
    #[error("size {0} is too large")]
    SizeTooLarge(Decimal),
    #[error("invalid token ID: {0}")]
    InvalidTokenId(String),
    #[error("expiration {expiration} is not in the future (now {now})")]
    InvalidExpiration { expiration: i64, now: i64 },
    #[error("malformed order field: {0}")]
    MalformedOrder(String),
    #[error("failed to sign order: {0}")]
    Sign(#[from] SignError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Side::Buy => SIDE_BUY,
            Side::Sell => SIDE_SELL,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution type tag carried next to the signed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill or kill.
    #[serde(rename = "FOK")]
    Fok,
    /// Good till cancelled.
    #[serde(rename = "GTC")]
    Gtc,
    /// Good till date.
    #[serde(rename = "GTD")]
    Gtd,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Fok => "FOK",
            OrderType::Gtc => "GTC",
            OrderType::Gtd => "GTD",
        }
    }
}

/// How the settlement contract verifies the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    /// Plain key; maker == signer.
    Eoa = 0,
    /// Email/social login proxy wallet.
    PolyProxy = 1,
    /// Browser-wallet Gnosis Safe proxy.
    PolyGnosisSafe = 2,
}

impl SignatureType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Where the funds live relative to the signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Custody {
    Direct,
    Delegated {
        proxy_wallet: Address,
        signature_type: SignatureType,
    },
}

impl Custody {
    /// Delegated custody from a raw selector. Selectors 0..=2 are kept as
    /// given; anything above 2 is clamped to the Gnosis Safe scheme.
    pub fn delegated(proxy_wallet: Address, selector: u8) -> Self {
        let signature_type = match selector {
            0 => SignatureType::Eoa,
            1 => SignatureType::PolyProxy,
            _ => SignatureType::PolyGnosisSafe,
        };
        Custody::Delegated {
            proxy_wallet,
            signature_type,
        }
    }
}

/// Trade intent handed to the builder.
#[derive(Debug, Clone)]
pub struct OrderArgs {
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub order_type: OrderType,
    /// Only honoured for GTD; defaults to one hour ahead.
    pub expiration: Option<i64>,
    pub fee_rate_bps: Option<u32>,
    pub neg_risk: bool,
}

impl OrderArgs {
    pub fn new(
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        order_type: OrderType,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            side,
            price,
            size,
            order_type,
            expiration: None,
            fee_rate_bps: None,
            neg_risk: false,
        }
    }

    pub fn neg_risk(mut self, neg_risk: bool) -> Self {
        self.neg_risk = neg_risk;
        self
    }

    pub fn expiring_at(mut self, unix_secs: i64) -> Self {
        self.expiration = Some(unix_secs);
        self
    }

    pub fn fee_rate_bps(mut self, bps: u32) -> Self {
        self.fee_rate_bps = Some(bps);
        self
    }
}

/// Integer amounts derived from one rounded price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub price_ticks: u64,
    pub size_units: u64,
    pub maker_amount: U256,
    pub taker_amount: U256,
}

/// Round a price to the nearest tick, half away from zero.
pub fn price_to_ticks(price: Decimal) -> Result<u64, BuildError> {
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Err(BuildError::InvalidPrice(price));
    }
    let ticks = (price * Decimal::from(TICK_DENOMINATOR))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or(BuildError::InvalidPrice(price))?;
    if ticks == 0 || ticks >= TICK_DENOMINATOR {
        return Err(BuildError::PriceOutOfRange(price, ticks));
    }
    Ok(ticks)
}

/// Floor a size to hundredths of a share.
pub fn size_to_units(size: Decimal) -> Result<u64, BuildError> {
    if size <= Decimal::ZERO {
        return Err(BuildError::InvalidSize(size));
    }
    let units = size
        .checked_mul(Decimal::from(SIZE_DENOMINATOR))
        .ok_or(BuildError::SizeTooLarge(size))?
        .floor()
        .to_u64()
        .ok_or(BuildError::SizeTooLarge(size))?;
    if units == 0 {
        return Err(BuildError::SizeBelowMinimum(size));
    }
    Ok(units)
}

pub fn derive_amounts(side: Side, price: Decimal, size: Decimal) -> Result<Amounts, BuildError> {
    let price_ticks = price_to_ticks(price)?;
    let size_units = size_to_units(size)?;

    let tokens = u128::from(size_units) * u128::from(UNITS_PER_SIZE_STEP);
    let collateral = tokens * u128::from(price_ticks) / u128::from(TICK_DENOMINATOR);

    let (maker_amount, taker_amount) = match side {
        Side::Buy => (U256::from(collateral), U256::from(tokens)),
        Side::Sell => (U256::from(tokens), U256::from(collateral)),
    };
    Ok(Amounts {
        price_ticks,
        size_units,
        maker_amount,
        taker_amount,
    })
}

/// Signed order in the exchange's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub side: Side,
    pub signature_type: u8,
    pub signature: String,
}

impl SignedOrder {
    /// Rebuild the hashed struct from its wire form, e.g. to re-check a
    /// signature the exchange rejected.
    pub fn to_order(&self) -> Result<Order, BuildError> {
        let address = |s: &str| {
            Address::from_str(s).map_err(|_| BuildError::MalformedOrder(s.to_string()))
        };
        let int = |s: &str| {
            U256::from_str_radix(s, 10).map_err(|_| BuildError::MalformedOrder(s.to_string()))
        };
        Ok(Order {
            salt: U256::from(self.salt),
            maker: address(&self.maker)?,
            signer: address(&self.signer)?,
            taker: address(&self.taker)?,
            token_id: int(&self.token_id)?,
            maker_amount: int(&self.maker_amount)?,
            taker_amount: int(&self.taker_amount)?,
            expiration: int(&self.expiration)?,
            nonce: int(&self.nonce)?,
            fee_rate_bps: int(&self.fee_rate_bps)?,
            side: self.side.as_u8(),
            signature_type: self.signature_type,
        })
    }
}

/// `POST /order` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order: SignedOrder,
    /// API key of the account submitting the order.
    pub owner: String,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
}

/// Lowercase, `0x`-prefixed, unchecksummed.
fn lower_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Builds signed orders for one wallet. Both exchange domains are hashed once
/// at construction.
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    standard: OrderSigner,
    neg_risk: OrderSigner,
    maker: Address,
    signer: Address,
    signature_type: SignatureType,
    owner: String,
    nonce: U256,
}

impl OrderBuilder {
    pub fn new(wallet: Wallet, owner: impl Into<String>, custody: Custody, chain_id: u64) -> Self {
        Self::with_domains(
            wallet,
            owner,
            custody,
            ExchangeDomain::standard(chain_id),
            ExchangeDomain::neg_risk(chain_id),
        )
    }

    pub fn with_domains(
        wallet: Wallet,
        owner: impl Into<String>,
        custody: Custody,
        standard: ExchangeDomain,
        neg_risk: ExchangeDomain,
    ) -> Self {
        let wallet = Arc::new(wallet);
        let signer = wallet.address();
        let (maker, signature_type) = match custody {
            Custody::Direct => (signer, SignatureType::Eoa),
            Custody::Delegated {
                proxy_wallet,
                signature_type,
            } => (proxy_wallet, signature_type),
        };
        Self {
            standard: OrderSigner::new(wallet.clone(), standard),
            neg_risk: OrderSigner::new(wallet, neg_risk),
            maker,
            signer,
            signature_type,
            owner: owner.into(),
            nonce: U256::ZERO,
        }
    }

    /// Nonce groups orders for bulk on-chain cancellation.
    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn maker(&self) -> Address {
        self.maker
    }

    pub fn signer_address(&self) -> Address {
        self.signer
    }

    pub fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    pub fn signer_for(&self, neg_risk: bool) -> &OrderSigner {
        if neg_risk {
            &self.neg_risk
        } else {
            &self.standard
        }
    }

    pub fn build(&self, args: &OrderArgs) -> Result<OrderRequest, BuildError> {
        let salt = OsRng.gen_range(0..SALT_BOUND);
        self.build_with(args, salt, chrono::Utc::now().timestamp())
    }

    pub fn fok(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<OrderRequest, BuildError> {
        self.build(&OrderArgs::new(token_id, side, price, size, OrderType::Fok))
    }

    pub fn gtc(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        neg_risk: bool,
    ) -> Result<OrderRequest, BuildError> {
        self.build(&OrderArgs::new(token_id, side, price, size, OrderType::Gtc).neg_risk(neg_risk))
    }

    pub fn gtd(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        expiration: Option<i64>,
    ) -> Result<OrderRequest, BuildError> {
        let mut args = OrderArgs::new(token_id, side, price, size, OrderType::Gtd);
        args.expiration = expiration;
        self.build(&args)
    }

    fn expiration_for(&self, args: &OrderArgs, now: i64) -> Result<i64, BuildError> {
        match args.order_type {
            OrderType::Fok | OrderType::Gtc => Ok(0),
            OrderType::Gtd => match args.expiration {
                None | Some(0) => Ok(now + DEFAULT_GTD_EXPIRY_SECS),
                Some(ts) if ts > now => Ok(ts),
                Some(ts) => Err(BuildError::InvalidExpiration { expiration: ts, now }),
            },
        }
    }

    pub(crate) fn build_with(
        &self,
        args: &OrderArgs,
        salt: u64,
        now: i64,
    ) -> Result<OrderRequest, BuildError> {
        let amounts = derive_amounts(args.side, args.price, args.size)?;
        let token_id = U256::from_str_radix(args.token_id.trim(), 10)
            .map_err(|_| BuildError::InvalidTokenId(args.token_id.clone()))?;
        let expiration = self.expiration_for(args, now)?;
        let fee_rate_bps = args.fee_rate_bps.unwrap_or(DEFAULT_FEE_RATE_BPS);

        let order = Order {
            salt: U256::from(salt),
            maker: self.maker,
            signer: self.signer,
            taker: Address::ZERO,
            token_id,
            maker_amount: amounts.maker_amount,
            taker_amount: amounts.taker_amount,
            expiration: U256::from(expiration as u64),
            nonce: self.nonce,
            fee_rate_bps: U256::from(fee_rate_bps),
            side: args.side.as_u8(),
            signature_type: self.signature_type.as_u8(),
        };
        let signature = self.signer_for(args.neg_risk).sign(&order)?;

        debug!(
            token_id = %args.token_id,
            side = %args.side,
            ticks = amounts.price_ticks,
            units = amounts.size_units,
            maker_amount = %amounts.maker_amount,
            taker_amount = %amounts.taker_amount,
            order_type = args.order_type.as_str(),
            neg_risk = args.neg_risk,
            "built signed order"
        );

        Ok(OrderRequest {
            order: SignedOrder {
                salt,
                maker: lower_hex(&self.maker),
                signer: lower_hex(&self.signer),
                taker: lower_hex(&Address::ZERO),
                token_id: token_id.to_string(),
                maker_amount: amounts.maker_amount.to_string(),
                taker_amount: amounts.taker_amount.to_string(),
                expiration: expiration.to_string(),
                nonce: self.nonce.to_string(),
                fee_rate_bps: fee_rate_bps.to_string(),
                side: args.side,
                signature_type: self.signature_type.as_u8(),
                signature: signature.to_hex(),
            },
            owner: self.owner.clone(),
            order_type: args.order_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{recover_signer, OrderSignature, POLYGON_CHAIN_ID};
    use crate::wallet::tests::{test_wallet, TEST_ADDRESS};

    const TOKEN: &str =
        "71321045679252212594626385532706912750332728571942532289631379312455583992563";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn builder() -> OrderBuilder {
        OrderBuilder::new(test_wallet(), "api-key", Custody::Direct, POLYGON_CHAIN_ID)
    }

    #[test]
    fn test_worked_example_buy() {
        let a = derive_amounts(Side::Buy, dec("0.657"), dec("12.3")).unwrap();
        assert_eq!(a.price_ticks, 657);
        assert_eq!(a.size_units, 1230);
        // 1230 * 10^4 * 657 / 1000
        assert_eq!(a.maker_amount, U256::from(8_081_100u64));
        assert_eq!(a.taker_amount, U256::from(12_300_000u64));
    }

    #[test]
    fn test_sell_swaps_amounts() {
        let a = derive_amounts(Side::Sell, dec("0.657"), dec("12.3")).unwrap();
        assert_eq!(a.maker_amount, U256::from(12_300_000u64));
        assert_eq!(a.taker_amount, U256::from(8_081_100u64));
    }

    #[test]
    fn test_price_rounds_half_up_and_size_floors() {
        assert_eq!(price_to_ticks(dec("0.6575")).unwrap(), 658);
        assert_eq!(price_to_ticks(dec("0.65749")).unwrap(), 657);
        assert_eq!(size_to_units(dec("12.349")).unwrap(), 1234);
        assert_eq!(size_to_units(dec("0.019")).unwrap(), 1);
    }

    #[test]
    fn test_amounts_reconstruct_rounded_price() {
        let prices = ["0.001", "0.013", "0.25", "0.3333", "0.5", "0.657", "0.9994", "0.999"];
        let sizes = ["0.01", "1", "5.55", "12.3", "99.99", "1234.567"];
        for p in prices {
            for s in sizes {
                let a = derive_amounts(Side::Buy, dec(p), dec(s)).unwrap();
                let ticks = U256::from(a.price_ticks);
                let denom = U256::from(TICK_DENOMINATOR);
                assert_eq!(
                    a.maker_amount * denom,
                    a.taker_amount * ticks,
                    "price {} size {}",
                    p,
                    s
                );
            }
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(
            derive_amounts(Side::Buy, dec("0"), dec("1")),
            Err(BuildError::InvalidPrice(_))
        ));
        assert!(matches!(
            derive_amounts(Side::Buy, dec("1"), dec("1")),
            Err(BuildError::InvalidPrice(_))
        ));
        assert!(matches!(
            derive_amounts(Side::Buy, dec("0.0004"), dec("1")),
            Err(BuildError::PriceOutOfRange(_, 0))
        ));
        assert!(matches!(
            derive_amounts(Side::Buy, dec("0.9995"), dec("1")),
            Err(BuildError::PriceOutOfRange(_, 1000))
        ));
        assert!(matches!(
            derive_amounts(Side::Buy, dec("0.9996"), dec("1")),
            Err(BuildError::PriceOutOfRange(_, 1000))
        ));
        assert!(matches!(
            derive_amounts(Side::Buy, dec("0.5"), dec("-2")),
            Err(BuildError::InvalidSize(_))
        ));
        assert!(matches!(
            derive_amounts(Side::Buy, dec("0.5"), dec("0.009")),
            Err(BuildError::SizeBelowMinimum(_))
        ));

        let args = OrderArgs::new("0xabc", Side::Buy, dec("0.5"), dec("10"), OrderType::Gtc);
        assert!(matches!(
            builder().build(&args),
            Err(BuildError::InvalidTokenId(_))
        ));
    }

    #[test]
    fn test_immediate_and_open_orders_never_expire() {
        let b = builder();
        let args = OrderArgs::new(TOKEN, Side::Buy, dec("0.5"), dec("10"), OrderType::Fok)
            .expiring_at(4_000_000_000);
        let req = b.build_with(&args, 7, 1_700_000_000).unwrap();
        assert_eq!(req.order.expiration, "0");

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["order"]["expiration"], "0");
        assert_eq!(json["orderType"], "FOK");

        let mut gtc = args.clone();
        gtc.order_type = OrderType::Gtc;
        assert_eq!(b.build_with(&gtc, 7, 1_700_000_000).unwrap().order.expiration, "0");
    }

    #[test]
    fn test_gtd_expiration() {
        let b = builder();
        let now = 1_700_000_000;
        let args = OrderArgs::new(TOKEN, Side::Sell, dec("0.4"), dec("3"), OrderType::Gtd);
        let req = b.build_with(&args, 1, now).unwrap();
        assert_eq!(req.order.expiration, (now + DEFAULT_GTD_EXPIRY_SECS).to_string());

        let req = b.build_with(&args.clone().expiring_at(now + 60), 1, now).unwrap();
        assert_eq!(req.order.expiration, (now + 60).to_string());

        assert!(matches!(
            b.build_with(&args.expiring_at(now - 1), 1, now),
            Err(BuildError::InvalidExpiration { .. })
        ));
    }

    #[test]
    fn test_wire_order_verifies_against_chosen_domain() {
        let b = builder();
        for neg_risk in [false, true] {
            let args = OrderArgs::new(TOKEN, Side::Buy, dec("0.657"), dec("12.3"), OrderType::Gtc)
                .neg_risk(neg_risk);
            let req = b.build_with(&args, 12345, 1_700_000_000).unwrap();
            let order = req.order.to_order().unwrap();
            let sig = OrderSignature::from_hex(&req.order.signature).unwrap();
            assert!(sig.v() == 27 || sig.v() == 28);

            let digest = b.signer_for(neg_risk).order_hash(&order).unwrap();
            assert_eq!(recover_signer(&digest, &sig).unwrap(), TEST_ADDRESS);

            let other = b.signer_for(!neg_risk).order_hash(&order).unwrap();
            assert_ne!(digest, other);
        }
    }

    #[test]
    fn test_wire_shape() {
        let req = builder()
            .build_with(
                &OrderArgs::new(TOKEN, Side::Buy, dec("0.5"), dec("2"), OrderType::Gtc),
                42,
                1_700_000_000,
            )
            .unwrap();
        let json = serde_json::to_value(&req).unwrap();
        let order = &json["order"];
        assert_eq!(order["salt"], 42);
        assert_eq!(order["side"], "BUY");
        assert_eq!(order["tokenId"], TOKEN);
        assert_eq!(order["makerAmount"], "1000000");
        assert_eq!(order["takerAmount"], "2000000");
        assert_eq!(order["feeRateBps"], "0");
        assert_eq!(order["signatureType"], 0);
        assert_eq!(order["taker"], "0x0000000000000000000000000000000000000000");
        assert_eq!(
            order["maker"].as_str().unwrap(),
            order["maker"].as_str().unwrap().to_lowercase()
        );
        assert_eq!(json["owner"], "api-key");
    }

    #[test]
    fn test_delegated_custody() {
        let proxy = Address::repeat_byte(0xab);
        let b = OrderBuilder::new(
            test_wallet(),
            "api-key",
            Custody::delegated(proxy, 1),
            POLYGON_CHAIN_ID,
        );
        assert_eq!(b.maker(), proxy);
        assert_eq!(b.signer_address(), TEST_ADDRESS);
        assert_eq!(b.signature_type(), SignatureType::PolyProxy);

        let req = b.fok(TOKEN, Side::Buy, dec("0.9"), dec("1")).unwrap();
        assert_eq!(req.order.signature_type, 1);
        let order = req.order.to_order().unwrap();
        assert_eq!(order.maker, proxy);
        assert_eq!(order.signer, TEST_ADDRESS);

        assert_eq!(
            Custody::delegated(proxy, 9),
            Custody::Delegated {
                proxy_wallet: proxy,
                signature_type: SignatureType::PolyGnosisSafe
            }
        );
    }

    #[test]
    fn test_delegated_selector_in_range_is_kept() {
        let proxy = Address::repeat_byte(0xcd);
        let expected = [
            (0, SignatureType::Eoa),
            (1, SignatureType::PolyProxy),
            (2, SignatureType::PolyGnosisSafe),
            (3, SignatureType::PolyGnosisSafe),
        ];
        for (selector, signature_type) in expected {
            assert_eq!(
                Custody::delegated(proxy, selector),
                Custody::Delegated {
                    proxy_wallet: proxy,
                    signature_type
                },
                "selector {}",
                selector
            );
        }

        let b = OrderBuilder::new(test_wallet(), "api-key", Custody::delegated(proxy, 0), POLYGON_CHAIN_ID);
        assert_eq!(b.maker(), proxy);
        let req = b.gtc(TOKEN, Side::Buy, dec("0.4"), dec("2"), false).unwrap();
        assert_eq!(req.order.signature_type, 0);
    }

    #[test]
    fn test_salt_range() {
        let b = builder();
        for _ in 0..32 {
            let req = b.fok(TOKEN, Side::Sell, dec("0.2"), dec("1")).unwrap();
            assert!(req.order.salt < SALT_BOUND);
        }
    }
}
